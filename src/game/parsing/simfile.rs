use crate::game::chart::{Chart, ChartCounts, Difficulty, key_count_for_type};
use crate::game::note::{Measure, Note};
use crate::game::timing::{BpmSegment, TempoError, TempoMap, seconds_to_ns};
use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fs;
use std::path::Path;
use thiserror::Error;

const NOTES_TAG: &str = "#NOTES:";
const BEATS_PER_MEASURE: f64 = 4.0;
// Gridlines are laid down every half beat.
const MARKERS_PER_MEASURE: usize = 8;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read chart file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid OFFSET value {0:?}")]
    InvalidOffset(String),
    #[error("invalid BPMS value {0:?}")]
    InvalidBpm(String),
    #[error("malformed BPMS entry {0:?}, expected beat=bpm")]
    MalformedBpm(String),
    #[error("no playable charts found")]
    NoCharts,
}

/// Global timing metadata from the file preamble.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartMetadata {
    /// `OFFSET` as written in the file, in seconds.
    pub offset_s: f64,
    pub tempo: TempoMap,
}

impl ChartMetadata {
    /// Time of beat 0 relative to the start of the audio.
    #[inline(always)]
    pub fn beat_zero_s(&self) -> f64 {
        -self.offset_s
    }
}

pub fn parse_file(path: &Path) -> Result<Vec<Chart>, ParseError> {
    let raw = fs::read_to_string(path)?;
    info!("Parsing chart {}", path.display());
    parse(&raw)
}

/// Parses every playable difficulty of a `.sm` file.
///
/// Difficulties with an unknown chart type are skipped silently; a difficulty
/// whose tempo is undefined is skipped with a warning.
pub fn parse(raw: &str) -> Result<Vec<Chart>, ParseError> {
    let text = raw.replace('\r', "");
    let mut sections = text.split(NOTES_TAG);
    let preamble = sections.next().unwrap_or_default();
    let meta = parse_metadata(preamble)?;
    info!("Offset: {}s", meta.offset_s);
    info!("BPMs: {:?}", meta.tempo.segments());

    let mut charts = Vec::new();
    for section in sections {
        let Some(difficulty) = parse_difficulty_header(section) else {
            continue;
        };
        match parse_difficulty(difficulty, &meta) {
            Ok(chart) => {
                debug!(
                    "{}-key {} ({}): {} notes, {} holds, {} mines",
                    chart.key_count(),
                    chart.difficulty.name,
                    chart.difficulty.meter,
                    chart.counts.notes,
                    chart.counts.holds,
                    chart.counts.mines
                );
                charts.push(chart);
            }
            Err(e) => warn!("Skipping difficulty: {e}"),
        }
    }

    if charts.is_empty() {
        return Err(ParseError::NoCharts);
    }
    Ok(charts)
}

pub fn parse_metadata(preamble: &str) -> Result<ChartMetadata, ParseError> {
    let mut offset_s = 0.0;
    let mut segments = Vec::new();

    for chunk in preamble.split(';') {
        let Some(start) = chunk.find('#') else {
            continue;
        };
        let Some((tag, value)) = chunk[start + 1..].split_once(':') else {
            continue;
        };
        match tag.trim().to_ascii_uppercase().as_str() {
            "OFFSET" => {
                let value = value.trim();
                offset_s = value
                    .parse::<f64>()
                    .map_err(|_| ParseError::InvalidOffset(value.to_string()))?;
            }
            "BPMS" => segments = parse_bpms(value)?,
            _ => {}
        }
    }

    Ok(ChartMetadata {
        offset_s,
        tempo: TempoMap::new(segments),
    })
}

fn parse_bpms(value: &str) -> Result<Vec<BpmSegment>, ParseError> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    let mut segments = Vec::new();
    for entry in compact.split(',').filter(|e| !e.is_empty()) {
        let (beat, bpm) = entry
            .split_once('=')
            .ok_or_else(|| ParseError::MalformedBpm(entry.to_string()))?;
        let start_beat = beat
            .parse::<f64>()
            .map_err(|_| ParseError::InvalidBpm(beat.to_string()))?;
        let bpm = bpm
            .parse::<f64>()
            .map_err(|_| ParseError::InvalidBpm(bpm.to_string()))?;
        if !bpm.is_finite() || bpm <= 0.0 {
            warn!("Ignoring non-positive BPM {bpm} at beat {start_beat}");
            continue;
        }
        segments.push(BpmSegment { start_beat, bpm });
    }
    Ok(segments)
}

/// Reads the colon-terminated header of a notes section:
/// type, description, difficulty, meter, radar values, then note data up to `;`.
fn parse_difficulty_header(section: &str) -> Option<Difficulty> {
    let body = section.split(';').next().unwrap_or_default();
    let fields: Vec<&str> = body.splitn(6, ':').collect();
    let [chart_type, _description, name, meter, _radar, data] = fields.as_slice() else {
        warn!("Notes section has too few header fields; skipping");
        return None;
    };
    let chart_type = chart_type.trim();
    let Some(key_count) = key_count_for_type(chart_type) else {
        debug!("Skipping unsupported chart type {chart_type:?}");
        return None;
    };
    Some(Difficulty {
        name: name.trim().to_string(),
        meter: meter.trim().to_string(),
        key_count,
        section: (*data).to_string(),
    })
}

/// Drops `//` comments line by line, before any measure splitting.
fn strip_comments(section: &str) -> String {
    let mut out = String::with_capacity(section.len());
    for line in section.lines() {
        out.push_str(line.split("//").next().unwrap_or_default());
        out.push('\n');
    }
    out
}

/// Keeps the lines of a measure that look like note rows.
fn measure_rows(block: &str) -> SmallVec<[&str; 16]> {
    block
        .lines()
        .map(str::trim)
        .filter(|line| line.len() > 3 && line.bytes().all(|b| b.is_ascii_alphanumeric()))
        .collect()
}

#[inline(always)]
const fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Denominator of `row * 4 / rows` in lowest terms.
#[inline(always)]
pub fn subdivision_denom(row: usize, rows: usize) -> u32 {
    let g = gcd(row * 4, rows);
    if g == 0 { 1 } else { (rows / g) as u32 }
}

/// Walks one difficulty's measures and places every note on the timeline.
pub fn parse_difficulty(difficulty: Difficulty, meta: &ChartMetadata) -> Result<Chart, TempoError> {
    let key_count = usize::from(difficulty.key_count);
    let tempo = &meta.tempo;

    let mut seconds = meta.beat_zero_s();
    let mut beat = 0.0_f64;
    let mut notes: Vec<Note> = Vec::new();
    let mut measures: Vec<Measure> = Vec::new();
    let mut counts = ChartCounts {
        simultaneous: vec![0; key_count],
        ..ChartCounts::default()
    };
    let mut open_holds: FxHashMap<u8, usize> = FxHashMap::default();

    let section = strip_comments(&difficulty.section);
    for block in section.split(',') {
        let rows = measure_rows(block);
        if rows.is_empty() {
            continue;
        }
        let line_count = rows.len();
        let beats_per_row = BEATS_PER_MEASURE / line_count as f64;

        push_measure_markers(&mut measures, tempo, beat, seconds)?;

        for (i, row) in rows.iter().enumerate() {
            let denom = subdivision_denom(i, line_count);
            let (_, row_seconds) = tempo.seconds_per_unit(beat, beats_per_row)?;
            let time_ns = seconds_to_ns(seconds);
            let mut taps = 0usize;

            for (col, ch) in row.bytes().take(key_count).enumerate() {
                let column = col as u8;
                match ch {
                    b'1' => {
                        notes.push(Note::new(column, time_ns, denom, false));
                        counts.notes += 1;
                        taps += 1;
                    }
                    b'2' | b'4' => {
                        open_holds.insert(column, notes.len());
                        notes.push(Note::new(column, time_ns, denom, false));
                        counts.notes += 1;
                        counts.holds += 1;
                        taps += 1;
                    }
                    b'M' => {
                        notes.push(Note::new(column, time_ns, denom, true));
                        counts.mines += 1;
                    }
                    b'3' => match open_holds.remove(&column) {
                        Some(head) => notes[head].end_time_ns = Some(time_ns),
                        None => debug!("Tail without a hold head in column {column}"),
                    },
                    _ => {}
                }
            }

            if taps > 0 {
                counts.simultaneous[taps - 1] += 1;
            }
            seconds += row_seconds;
            beat += beats_per_row;
        }
    }

    if !open_holds.is_empty() {
        debug!("{} hold(s) in {} never closed", open_holds.len(), difficulty.name);
    }

    Ok(Chart::new(difficulty, notes, measures, counts))
}

fn push_measure_markers(
    measures: &mut Vec<Measure>,
    tempo: &TempoMap,
    start_beat: f64,
    start_seconds: f64,
) -> Result<(), TempoError> {
    let step = BEATS_PER_MEASURE / MARKERS_PER_MEASURE as f64;
    let mut seconds = start_seconds;
    for k in 0..MARKERS_PER_MEASURE {
        let denom = match k {
            0 => 1,
            k if k % 2 == 0 => 4,
            _ => 8,
        };
        measures.push(Measure {
            denom,
            time_ns: seconds_to_ns(seconds),
        });
        seconds += tempo.seconds_per_unit(start_beat + k as f64 * step, step)?.1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ParseError, parse, parse_metadata, subdivision_denom};
    use crate::game::timing::NS_PER_MS;

    fn chart_text(offset: &str, bpms: &str, notes: &str) -> String {
        format!(
            "#TITLE:Test;\n#OFFSET:{offset};\n#BPMS:{bpms};\n\n#NOTES:\n     dance-single:\n     Author:\n     Hard:\n     9:\n     0,0,0,0,0:\n{notes}\n;\n"
        )
    }

    #[test]
    fn first_tap_sits_at_zero_without_offset() {
        let charts = parse(&chart_text("0", "0=120", "1000\n0000\n0000\n0000\n")).unwrap();
        assert_eq!(charts.len(), 1);
        assert_eq!(charts[0].notes[0].time_ns, 0);
    }

    #[test]
    fn positive_offset_moves_notes_before_playback_zero() {
        let charts = parse(&chart_text("0.5", "0=120", "1000\n0000\n0000\n0000\n")).unwrap();
        assert_eq!(charts[0].notes[0].time_ns, -500 * NS_PER_MS);
    }

    #[test]
    fn rows_advance_time_even_when_empty() {
        let charts = parse(&chart_text("0", "0=120", "1000\n0000\n0100\n0000\n,\n0010\n")).unwrap();
        let times: Vec<i64> = charts[0].notes.iter().map(|n| n.time_ns / NS_PER_MS).collect();
        // 120 BPM, 4 rows per measure: one beat (500ms) per row.
        assert_eq!(times, vec![0, 1000, 2000]);
    }

    #[test]
    fn tempo_change_applies_from_its_beat() {
        let charts = parse(&chart_text("0", "0=120,4=240", "1000\n0000\n0000\n0000\n,\n1000\n0000\n1000\n0000\n")).unwrap();
        let times: Vec<i64> = charts[0].notes.iter().map(|n| n.time_ns / NS_PER_MS).collect();
        assert_eq!(times, vec![0, 2000, 2500]);
    }

    #[test]
    fn notes_are_time_ordered() {
        let data = "1001\n0110\n1M01\n0000\n,\n10000000\n01000000\n00100000\n00010000\n00001000\n00000100\n00000010\n00000001\n";
        let charts = parse(&chart_text("0.123", "0=150,2=90", data)).unwrap();
        let notes = &charts[0].notes;
        assert!(notes.windows(2).all(|w| w[0].time_ns <= w[1].time_ns));
    }

    #[test]
    fn holds_and_rolls_resolve_tails_per_column() {
        let data = "2004\n0000\n3000\n0003\n,\n0200\n0000\n0000\n0000\n";
        let charts = parse(&chart_text("0", "0=120", data)).unwrap();
        let notes = &charts[0].notes;
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[0].end_time_ns, Some(1000 * NS_PER_MS));
        assert_eq!(notes[1].end_time_ns, Some(1500 * NS_PER_MS));
        // No tail for the last hold in its column.
        assert_eq!(notes[2].end_time_ns, None);
        for n in notes.iter().filter(|n| n.is_hold()) {
            assert!(n.end_time_ns.unwrap() > n.time_ns, "{n:?}");
        }
        assert_eq!(charts[0].counts.holds, 3);
    }

    #[test]
    fn tails_without_heads_create_nothing() {
        let charts = parse(&chart_text("0", "0=120", "1000\n3000\n0000\n0000\n")).unwrap();
        assert_eq!(charts[0].notes.len(), 1);
        assert_eq!(charts[0].notes[0].end_time_ns, None);
    }

    #[test]
    fn counts_mines_and_simultaneous_rows() {
        let data = "1100\n0M00\n1111\n0010\n";
        let charts = parse(&chart_text("0", "0=120", data)).unwrap();
        let counts = &charts[0].counts;
        assert_eq!(counts.mines, 1);
        assert_eq!(counts.notes, 7);
        assert_eq!(counts.simultaneous, vec![1, 1, 0, 1]);
        assert!(charts[0].notes.iter().any(|n| n.is_mine));
    }

    #[test]
    fn subdivision_denominators() {
        assert_eq!(subdivision_denom(0, 4), 1);
        assert_eq!(subdivision_denom(1, 4), 1);
        assert_eq!(subdivision_denom(1, 8), 2);
        assert_eq!(subdivision_denom(1, 12), 3);
        assert_eq!(subdivision_denom(3, 16), 4);
        assert_eq!(subdivision_denom(6, 12), 1);
    }

    #[test]
    fn comments_and_blank_measures_are_ignored() {
        let data = "// measure 1\n1000\n0000\n0000\n0000\n,\n\n,\n0100\n0000\n0000\n0000\n";
        let charts = parse(&chart_text("0", "0=120", data)).unwrap();
        let times: Vec<i64> = charts[0].notes.iter().map(|n| n.time_ns / NS_PER_MS).collect();
        assert_eq!(times, vec![0, 2000]);
    }

    #[test]
    fn commas_inside_comments_do_not_split_measures() {
        let data = "1000\n0000 // intro, part 2\n0100\n0000\n,\n0010\n0000\n0000\n0000\n";
        let charts = parse(&chart_text("0", "0=120", data)).unwrap();
        let times: Vec<i64> = charts[0].notes.iter().map(|n| n.time_ns / NS_PER_MS).collect();
        assert_eq!(times, vec![0, 1000, 2000]);
        assert_eq!(charts[0].measures.len(), 16);
    }

    #[test]
    fn measure_markers_cover_each_half_beat() {
        let charts = parse(&chart_text("0", "0=120", "1000\n0000\n0000\n0000\n")).unwrap();
        let m = &charts[0].measures;
        assert_eq!(m.len(), 8);
        assert_eq!(m[0].denom, 1);
        assert_eq!(m[1].denom, 8);
        assert_eq!(m[2].denom, 4);
        assert_eq!(m[1].time_ns, 250 * NS_PER_MS);
        assert!(m.windows(2).all(|w| w[0].time_ns <= w[1].time_ns));
    }

    #[test]
    fn unknown_chart_types_are_skipped() {
        let text = format!(
            "{}#NOTES:\n     pump-single:\n     :\n     Easy:\n     2:\n     0:\n00000\n;\n",
            chart_text("0", "0=120", "1000\n")
        );
        let charts = parse(&text).unwrap();
        assert_eq!(charts.len(), 1);
        assert_eq!(charts[0].difficulty.name, "Hard");
        assert_eq!(charts[0].difficulty.meter, "9");
        assert_eq!(charts[0].key_count(), 4);
    }

    #[test]
    fn malformed_metadata_fails_the_parse() {
        assert!(matches!(
            parse(&chart_text("abc", "0=120", "1000\n")),
            Err(ParseError::InvalidOffset(_))
        ));
        assert!(matches!(
            parse(&chart_text("0", "0=fast", "1000\n")),
            Err(ParseError::InvalidBpm(_))
        ));
        assert!(matches!(
            parse(&chart_text("0", "0:120", "1000\n")),
            Err(ParseError::MalformedBpm(_))
        ));
    }

    #[test]
    fn undefined_tempo_skips_the_difficulty() {
        // The only difficulty starts before any BPM is defined.
        let result = parse(&chart_text("0", "4=120", "1000\n"));
        assert!(matches!(result, Err(ParseError::NoCharts)));
    }

    #[test]
    fn metadata_handles_multiline_bpms_and_crlf() {
        let meta = parse_metadata("#OFFSET:-0.25;\r\n#BPMS:0.000=120.000\r\n,8.000=60.000;\r\n").unwrap();
        assert_eq!(meta.offset_s, -0.25);
        assert_eq!(meta.beat_zero_s(), 0.25);
        assert_eq!(meta.tempo.segments().len(), 2);
        assert_eq!(meta.tempo.bpm_at(9.0), Some(60.0));
    }
}
