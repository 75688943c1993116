use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to walk song directory {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no .sm chart found in {0:?}")]
    MissingChart(PathBuf),
    #[error("no audio file (.ogg/.mp3/.wav/.xm/.mod) found in {0:?}")]
    MissingAudio(PathBuf),
    #[error("difficulty {index} does not exist, the song has {count}")]
    UnknownDifficulty { index: usize, count: usize },
    #[error("no key mapping for {0}-key charts")]
    NoKeymap(u8),
}

/// Audio extensions, best first.
const AUDIO_EXTENSIONS: [&str; 5] = ["ogg", "mp3", "wav", "xm", "mod"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SongFiles {
    pub chart_path: PathBuf,
    pub audio_path: PathBuf,
}

fn audio_rank(path: &Path) -> Option<usize> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    AUDIO_EXTENSIONS.iter().position(|e| *e == ext)
}

fn is_chart(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("sm"))
}

/// Recursively finds the chart and audio file of a song directory.
pub fn scan(dir: &Path) -> Result<SongFiles, ConfigError> {
    let mut chart: Option<PathBuf> = None;
    let mut audio: Option<(usize, PathBuf)> = None;
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let read_dir = fs::read_dir(&current).map_err(|source| ConfigError::Unreadable {
            path: current.clone(),
            source,
        })?;
        let mut entries: Vec<PathBuf> = read_dir.flatten().map(|e| e.path()).collect();
        entries.sort();
        for path in entries {
            if path.is_dir() {
                pending.push(path);
            } else if is_chart(&path) {
                debug!("Found chart {path:?}");
                chart = Some(path);
            } else if let Some(rank) = audio_rank(&path)
                && audio.as_ref().is_none_or(|(best, _)| rank < *best)
            {
                debug!("Found audio {path:?}");
                audio = Some((rank, path));
            }
        }
    }

    let chart_path = chart.ok_or_else(|| ConfigError::MissingChart(dir.to_path_buf()))?;
    let (_, audio_path) = audio.ok_or_else(|| ConfigError::MissingAudio(dir.to_path_buf()))?;
    info!("Opening {audio_path:?} ({chart_path:?})");
    Ok(SongFiles {
        chart_path,
        audio_path,
    })
}
