use thiserror::Error;

pub const NS_PER_MS: i64 = 1_000_000;
const NS_PER_SEC_F64: f64 = 1_000_000_000.0;

/// Playback rate used when a caller hands in zero.
pub const NORMAL_RATE: u16 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BpmSegment {
    pub start_beat: f64,
    pub bpm: f64,
}

#[derive(Debug, Error, Clone, Copy, PartialEq)]
#[error("no BPM is defined at beat {beat}")]
pub struct TempoError {
    pub beat: f64,
}

/// Forward-only BPM table, sorted by starting beat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TempoMap {
    segments: Vec<BpmSegment>,
}

impl TempoMap {
    pub fn new(mut segments: Vec<BpmSegment>) -> Self {
        segments.sort_by(|a, b| a.start_beat.total_cmp(&b.start_beat));
        Self { segments }
    }

    #[inline(always)]
    pub fn segments(&self) -> &[BpmSegment] {
        &self.segments
    }

    /// BPM of the last segment starting at or before `beat`.
    pub fn bpm_at(&self, beat: f64) -> Option<f64> {
        let mut selected = None;
        for seg in &self.segments {
            if beat >= seg.start_beat {
                selected = Some(seg.bpm);
            } else {
                break;
            }
        }
        selected
    }

    /// Returns `(bpm, seconds)` where `seconds` is the length of `beat_length`
    /// beats played at the tempo in effect at `beat`.
    pub fn seconds_per_unit(&self, beat: f64, beat_length: f64) -> Result<(f64, f64), TempoError> {
        match self.bpm_at(beat) {
            Some(bpm) if bpm > 0.0 => Ok((bpm, beat_length * 60.0 / bpm)),
            _ => Err(TempoError { beat }),
        }
    }
}

#[inline(always)]
pub fn seconds_to_ns(seconds: f64) -> i64 {
    (seconds * NS_PER_SEC_F64).round() as i64
}

#[inline(always)]
pub fn ns_to_ms_f64(ns: f64) -> f64 {
    ns / NS_PER_MS as f64
}

#[inline(always)]
const fn sanitize_rate(rate: u16) -> u16 {
    if rate == 0 { NORMAL_RATE } else { rate }
}

/// Chart time scaled to wall-clock time at `rate` percent, rounded to the
/// nearest nanosecond.
#[inline(always)]
pub fn scaled_time_ns(rate: u16, time_ns: i64) -> i64 {
    let rate = sanitize_rate(rate);
    if rate == NORMAL_RATE {
        return time_ns;
    }
    (100.0 * time_ns as f64 / f64::from(rate)).round() as i64
}

/// Signed distance between where a note should be hit and when it was hit.
/// Positive means the input came early.
///
/// Rounding is applied to the scaled expected time only, never to the result.
#[inline(always)]
pub fn distance(rate: u16, note_time_ns: i64, actual_ns: i64) -> i64 {
    scaled_time_ns(rate, note_time_ns) - actual_ns
}

#[cfg(test)]
mod tests {
    use super::{BpmSegment, NS_PER_MS, TempoMap, distance, scaled_time_ns, seconds_to_ns};

    fn map(entries: &[(f64, f64)]) -> TempoMap {
        TempoMap::new(
            entries
                .iter()
                .map(|&(start_beat, bpm)| BpmSegment { start_beat, bpm })
                .collect(),
        )
    }

    #[test]
    fn selects_last_segment_not_after_beat() {
        let tempo = map(&[(0.0, 120.0), (8.0, 240.0), (16.0, 60.0)]);
        assert_eq!(tempo.bpm_at(0.0), Some(120.0));
        assert_eq!(tempo.bpm_at(7.99), Some(120.0));
        assert_eq!(tempo.bpm_at(8.0), Some(240.0));
        assert_eq!(tempo.bpm_at(100.0), Some(60.0));
    }

    #[test]
    fn segments_are_sorted_on_construction() {
        let tempo = map(&[(4.0, 200.0), (0.0, 100.0)]);
        assert_eq!(tempo.segments()[0].start_beat, 0.0);
        assert_eq!(tempo.bpm_at(2.0), Some(100.0));
    }

    #[test]
    fn seconds_per_unit_scales_with_bpm() {
        let tempo = map(&[(0.0, 120.0)]);
        let (bpm, secs) = tempo.seconds_per_unit(0.0, 1.0).unwrap();
        assert_eq!(bpm, 120.0);
        assert!((secs - 0.5).abs() < 1e-12, "secs={secs}");
        let (_, quarter) = tempo.seconds_per_unit(3.0, 0.25).unwrap();
        assert!((quarter - 0.125).abs() < 1e-12, "quarter={quarter}");
    }

    #[test]
    fn missing_bpm_at_beat_zero_is_an_error() {
        let tempo = map(&[(1.0, 120.0)]);
        let err = tempo.seconds_per_unit(0.0, 1.0).unwrap_err();
        assert_eq!(err.beat, 0.0);
        assert!(TempoMap::default().seconds_per_unit(0.0, 1.0).is_err());
    }

    #[test]
    fn distance_is_zero_for_exact_hit_at_normal_rate() {
        for t in [-5_000 * NS_PER_MS, 0, 1, 999_999_999, 123_456_789_012] {
            assert_eq!(distance(100, t, t), 0, "t={t}");
        }
    }

    #[test]
    fn distance_matches_scaled_expectation_across_rates() {
        for i in (-500i64..500).filter(|&i| i != 0) {
            let rate = i.unsigned_abs() as u16;
            let error = i * NS_PER_MS;
            let expected = (100 * i * NS_PER_MS).abs();
            let adjusted = (100.0 * expected as f64 / f64::from(rate)).round() as i64;
            let hit = adjusted - error;
            assert_eq!(distance(rate, expected, hit), error, "rate={rate}");
        }
    }

    #[test]
    fn distance_swaps_sign_but_not_magnitude_off_normal_rate() {
        let a = 3_000 * NS_PER_MS;
        let b = 1_000 * NS_PER_MS;
        assert_eq!(distance(100, a, b), -distance(100, b, a));
        let forward = distance(200, a, b);
        let backward = distance(200, b, a);
        assert_eq!(forward, 500 * NS_PER_MS);
        assert_eq!(backward, -2_500 * NS_PER_MS);
    }

    #[test]
    fn zero_rate_is_treated_as_normal() {
        assert_eq!(scaled_time_ns(0, 42), 42);
        assert_eq!(seconds_to_ns(-0.5), -500 * NS_PER_MS);
    }
}
