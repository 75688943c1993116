use crate::game::chart::Chart;
use crate::game::gameplay::{Input, apply_input};
use crate::game::judgment::Judgments;
use crate::game::timing::distance;
use bincode::{Decode, Encode};
use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("score store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode score: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode score {path:?}: {source}")]
    Decode {
        path: PathBuf,
        source: bincode::error::DecodeError,
    },
}

/// Press times of one column, in recorded order.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize)]
pub struct InputsCompact {
    pub column: u8,
    pub times_ns: Vec<i64>,
}

/// Groups inputs by column. The result has one entry per column up to the
/// highest column pressed, including empty ones.
pub fn compact_inputs(inputs: &[Input]) -> Vec<InputsCompact> {
    let columns = inputs.iter().map(|i| usize::from(i.column) + 1).max().unwrap_or(0);
    let mut out: Vec<InputsCompact> = (0..columns)
        .map(|c| InputsCompact {
            column: c as u8,
            times_ns: Vec::new(),
        })
        .collect();
    for input in inputs {
        out[usize::from(input.column)].times_ns.push(input.time_ns);
    }
    out
}

/// Flattens column groups back into inputs, column by column.
pub fn uncompact_inputs(compact: &[InputsCompact]) -> Vec<Input> {
    compact
        .iter()
        .flat_map(|c| {
            c.times_ns.iter().map(|&time_ns| Input {
                column: c.column,
                time_ns,
            })
        })
        .collect()
}

/// One stored performance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct History {
    pub chart_hash: String,
    pub rate: u16,
    pub played_at_ms: i64,
    pub inputs: Vec<Input>,
}

#[derive(Debug, Clone, Encode, Decode)]
struct HistoryEntry {
    chart_hash: String,
    rate: u16,
    played_at_ms: i64,
    inputs: Vec<InputsCompact>,
}

impl From<HistoryEntry> for History {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            chart_hash: entry.chart_hash,
            rate: entry.rate,
            played_at_ms: entry.played_at_ms,
            inputs: uncompact_inputs(&entry.inputs),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Score {
    pub miss_count: u64,
    pub total_abs_error_ns: i64,
}

/// Replays `history` against a fresh copy of `chart`. The chart passed in is
/// never modified.
pub fn score(chart: &Chart, history: &History, judgments: &Judgments) -> Score {
    let mut replay = chart.clone();
    replay.reset_session();
    for input in &history.inputs {
        apply_input(&mut replay, input, history.rate, judgments);
    }

    let mut out = Score::default();
    for note in replay.notes.iter().filter(|n| !n.is_mine) {
        match note.hit_time_ns {
            Some(hit) => out.total_abs_error_ns += distance(history.rate, note.time_ns, hit).abs(),
            None => out.miss_count += 1,
        }
    }
    out
}

pub trait ScoreStore {
    fn save(&self, chart_hash: &str, rate: u16, inputs: &[Input]) -> Result<(), PersistenceError>;
    fn load(&self, chart_hash: &str) -> Result<Vec<History>, PersistenceError>;
}

/// One bincode file per performance, named `{hash}-{unix_ms}.bin`.
#[derive(Debug, Clone)]
pub struct DiskScoreStore {
    dir: PathBuf,
}

impl DiskScoreStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl ScoreStore for DiskScoreStore {
    fn save(&self, chart_hash: &str, rate: u16, inputs: &[Input]) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)?;

        let mut played_at_ms = now_ms();
        let mut path = self.dir.join(format!("{chart_hash}-{played_at_ms}.bin"));
        // Two saves in the same millisecond must not overwrite each other.
        while path.exists() {
            played_at_ms += 1;
            path = self.dir.join(format!("{chart_hash}-{played_at_ms}.bin"));
        }

        let entry = HistoryEntry {
            chart_hash: chart_hash.to_string(),
            rate,
            played_at_ms,
            inputs: compact_inputs(inputs),
        };
        let buf = bincode::encode_to_vec(&entry, bincode::config::standard())?;
        fs::write(&path, buf)?;
        info!("Stored score for chart {chart_hash} at {path:?}");
        Ok(())
    }

    fn load(&self, chart_hash: &str) -> Result<Vec<History>, PersistenceError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let prefix = format!("{chart_hash}-");
        let mut out = Vec::new();
        for item in fs::read_dir(&self.dir)?.flatten() {
            let path = item.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&prefix) || !name.ends_with(".bin") || !path.is_file() {
                continue;
            }
            let bytes = fs::read(&path)?;
            match bincode::decode_from_slice::<HistoryEntry, _>(&bytes, bincode::config::standard()) {
                Ok((entry, _)) if entry.chart_hash == chart_hash => out.push(History::from(entry)),
                Ok(_) => warn!("Score file {path:?} belongs to another chart; skipping"),
                Err(source) => warn!("{}", PersistenceError::Decode { path, source }),
            }
        }
        out.sort_by_key(|h| h.played_at_ms);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DiskScoreStore, History, InputsCompact, ScoreStore, compact_inputs, score, uncompact_inputs,
    };
    use crate::game::gameplay::Input;
    use crate::game::judgment::Judgments;
    use crate::game::parsing::simfile::parse;
    use crate::game::timing::NS_PER_MS;

    const CHART: &str = "#OFFSET:0;\n#BPMS:0=120;\n#NOTES:\n dance-single:\n :\n Hard:\n 5:\n 0:\n1000\n0100\n00M0\n0001\n;\n";

    fn input(column: u8, time_ns: i64) -> Input {
        Input { column, time_ns }
    }

    #[test]
    fn compacts_by_column_including_gaps() {
        let compact = compact_inputs(&[input(0, 100), input(3, 200)]);
        assert_eq!(compact.len(), 4);
        assert_eq!(compact[0], InputsCompact { column: 0, times_ns: vec![100] });
        assert!(compact[1].times_ns.is_empty() && compact[2].times_ns.is_empty());
        assert_eq!(compact[3], InputsCompact { column: 3, times_ns: vec![200] });
        assert!(compact_inputs(&[]).is_empty());
    }

    #[test]
    fn compaction_keeps_recorded_order_within_a_column() {
        let inputs = [input(1, 2), input(1, 1)];
        let compact = compact_inputs(&inputs);
        assert_eq!(compact.len(), 2);
        assert_eq!(compact[1].times_ns, vec![2, 1]);
        assert_eq!(uncompact_inputs(&compact), inputs.to_vec());
    }

    #[test]
    fn empty_replay_misses_every_non_mine_note() {
        let chart = parse(CHART).unwrap().remove(0);
        let history = History {
            chart_hash: chart.hash(),
            rate: 100,
            played_at_ms: 0,
            inputs: Vec::new(),
        };
        let s = score(&chart, &history, &Judgments::default());
        assert_eq!(s.miss_count, chart.non_mine_count() as u64);
        assert_eq!(s.miss_count, 3);
        assert_eq!(s.total_abs_error_ns, 0);
    }

    #[test]
    fn replay_sums_absolute_error_without_touching_the_chart() {
        let chart = parse(CHART).unwrap().remove(0);
        let history = History {
            chart_hash: chart.hash(),
            rate: 100,
            played_at_ms: 0,
            inputs: vec![input(0, 10 * NS_PER_MS), input(1, 490 * NS_PER_MS), input(2, 1_000 * NS_PER_MS)],
        };
        let s = score(&chart, &history, &Judgments::default());
        assert_eq!(s.miss_count, 1);
        assert_eq!(s.total_abs_error_ns, 20 * NS_PER_MS);
        assert!(chart.notes.iter().all(|n| !n.is_hit()));
    }

    #[test]
    fn disk_store_round_trips_histories() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskScoreStore::new(dir.path().join("scores"));
        assert!(store.load("abc").unwrap().is_empty());

        store.save("abc", 150, &[input(0, 5), input(2, 9), input(0, 7)]).unwrap();
        store.save("abc", 100, &[]).unwrap();
        store.save("other", 100, &[input(1, 1)]).unwrap();

        let histories = store.load("abc").unwrap();
        assert_eq!(histories.len(), 2);
        assert_eq!(histories[0].rate, 150);
        assert_eq!(histories[0].inputs, vec![input(0, 5), input(0, 7), input(2, 9)]);
        assert!(histories[1].inputs.is_empty());
        assert!(histories[0].played_at_ms < histories[1].played_at_ms);
    }

    #[test]
    fn undecodable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc-1.bin"), b"\xff\xff\xff").unwrap();
        let store = DiskScoreStore::new(dir.path());
        assert!(store.load("abc").unwrap().is_empty());
    }
}
