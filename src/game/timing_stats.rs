use crate::game::note::Note;
use crate::game::timing::distance;

/// Running accuracy figures for one play session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionStats {
    pub total_hits: u64,
    pub sum_signed_ns: i64,
    /// Accumulated absolute error of every hit.
    pub sum_abs_ns: i64,
    pub mean_ns: f64,
    pub stddev_ns: f64,
    /// Per-judgment counters; the last slot counts misses.
    pub counts: Vec<u32>,
}

impl SessionStats {
    pub fn new(judgment_count: usize) -> Self {
        Self {
            counts: vec![0; judgment_count],
            ..Self::default()
        }
    }

    /// Records a hit and recomputes mean and spread over every hit note.
    pub fn record_hit(&mut self, judgment: usize, signed_ns: i64, abs_ns: i64, notes: &[Note], rate: u16) {
        self.total_hits += 1;
        self.sum_signed_ns += signed_ns;
        self.sum_abs_ns += abs_ns;
        if let Some(c) = self.counts.get_mut(judgment) {
            *c += 1;
        }
        self.mean_ns = self.sum_signed_ns as f64 / self.total_hits as f64;
        if self.total_hits > 1 {
            self.stddev_ns = hit_stddev_ns(notes, rate, self.mean_ns, self.total_hits);
        }
    }

    pub fn record_miss(&mut self) {
        if let Some(c) = self.counts.last_mut() {
            *c += 1;
        }
    }

    #[inline(always)]
    pub fn misses(&self) -> u32 {
        self.counts.last().copied().unwrap_or(0)
    }
}

/// Sample standard deviation of the signed distances of every hit note.
pub fn hit_stddev_ns(notes: &[Note], rate: u16, mean_ns: f64, hits: u64) -> f64 {
    if hits < 2 {
        return 0.0;
    }
    let mut sum_diff_sq = 0.0_f64;
    for n in notes {
        let Some(hit) = n.hit_time_ns else { continue };
        let d = distance(rate, n.time_ns, hit) as f64 - mean_ns;
        sum_diff_sq += d * d;
    }
    (sum_diff_sq / (hits as f64 - 1.0)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::{SessionStats, hit_stddev_ns};
    use crate::game::note::Note;

    fn hit_note(time: i64, hit: i64) -> Note {
        let mut n = Note::new(0, time, 1, false);
        n.hit_time_ns = Some(hit);
        n
    }

    #[test]
    fn single_hit_has_mean_and_no_spread() {
        let notes = vec![hit_note(1_000, 990)];
        let mut stats = SessionStats::new(3);
        stats.record_hit(0, 10, 10, &notes, 100);
        assert_eq!(stats.total_hits, 1);
        assert_eq!(stats.mean_ns, 10.0);
        assert_eq!(stats.stddev_ns, 0.0);
        assert_eq!(stats.counts, vec![1, 0, 0]);
    }

    #[test]
    fn spread_is_sample_standard_deviation() {
        // Signed distances: +10, -10, +30
        let notes = vec![hit_note(100, 90), hit_note(200, 210), hit_note(300, 270)];
        let mut stats = SessionStats::new(2);
        stats.record_hit(0, 10, 10, &notes[..1], 100);
        stats.record_hit(0, -10, 10, &notes[..2], 100);
        stats.record_hit(0, 30, 30, &notes, 100);
        assert_eq!(stats.sum_abs_ns, 50);
        assert!((stats.mean_ns - 10.0).abs() < 1e-9);
        // deviations 0, -20, 20 => sqrt(800 / 2) = 20
        assert!((stats.stddev_ns - 20.0).abs() < 1e-9, "stddev={}", stats.stddev_ns);
    }

    #[test]
    fn unhit_notes_are_ignored() {
        let notes = vec![hit_note(100, 100), Note::new(1, 50, 1, false), hit_note(200, 202)];
        let s = hit_stddev_ns(&notes, 100, -1.0, 2);
        assert!((s - 2.0_f64.sqrt()).abs() < 1e-9, "s={s}");
    }

    #[test]
    fn misses_land_in_the_last_bucket() {
        let mut stats = SessionStats::new(4);
        stats.record_miss();
        stats.record_miss();
        assert_eq!(stats.misses(), 2);
        assert_eq!(stats.counts, vec![0, 0, 0, 2]);
    }
}
