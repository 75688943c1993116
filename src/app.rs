use crate::cli::Args;
use crate::config::Config;
use crate::core::audio::{Clock, Playback, PlaybackSource, PlaybackWorker, player_args};
use crate::core::input::{self, KEY_ESC, Keymap, RawKeyEvent};
use crate::core::render::{Renderer, TerminalRenderer, terminal_size};
use crate::game::chart::Chart;
use crate::game::gameplay::Session;
use crate::game::judgment::Judgments;
use crate::game::parsing::simfile;
use crate::game::scores::{DiskScoreStore, ScoreStore, score};
use crate::game::song::{self, ConfigError};
use crate::game::timing::{NS_PER_MS, scaled_time_ns};
use crate::screens::gameplay::{GameplayScreen, Layout};
use chrono::{DateTime, Local};
use log::{info, warn};
use serde::Serialize;
use std::fmt::Write as _;
use std::io;
use std::path::Path;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

/// Fallback terminal size when stdout is not a terminal.
const DEFAULT_SCREEN: (u16, u16) = (48, 160);

/// Silence appended after the last note when no player is configured.
const SILENT_TAIL: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The track played to the end.
    Finished,
    /// The player pressed Escape.
    Aborted,
}

// --- Difficulty listing ---

#[derive(Debug, Serialize)]
pub struct ScoreListing {
    pub rate: u16,
    pub played_at: String,
    pub miss_count: u64,
    pub total_error_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct DifficultyListing {
    pub index: usize,
    pub key_count: u8,
    pub meter: String,
    pub name: String,
    pub notes: usize,
    pub hash: String,
    pub scores: Vec<ScoreListing>,
}

fn format_played_at(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

pub fn build_listing(charts: &[Chart], store: &impl ScoreStore, judgments: &Judgments) -> Vec<DifficultyListing> {
    charts
        .iter()
        .enumerate()
        .map(|(index, chart)| {
            let hash = chart.hash();
            let histories = store.load(&hash).unwrap_or_else(|e| {
                warn!("Unable to load scores for {}: {e}", chart.difficulty.name);
                Vec::new()
            });
            let scores = histories
                .iter()
                .map(|history| {
                    let s = score(chart, history, judgments);
                    ScoreListing {
                        rate: history.rate,
                        played_at: format_played_at(history.played_at_ms),
                        miss_count: s.miss_count,
                        total_error_ms: s.total_abs_error_ns / NS_PER_MS,
                    }
                })
                .collect();
            DifficultyListing {
                index,
                key_count: chart.key_count(),
                meter: chart.difficulty.meter.clone(),
                name: chart.difficulty.name.clone(),
                notes: chart.notes.len(),
                hash,
                scores,
            }
        })
        .collect()
}

pub fn format_listing(listing: &[DifficultyListing]) -> String {
    let mut out = String::new();
    for d in listing {
        let _ = writeln!(out, "{:2}) {}-key    {:>3} {}", d.index, d.key_count, d.meter, d.name);
        let _ = writeln!(out, "\tNotes: {:5}", d.notes);
        for (i, s) in d.scores.iter().enumerate() {
            let _ = writeln!(
                out,
                "\t\t{i}: {}%  {}  Misses: {:4}   Total Error: {}ms",
                s.rate, s.played_at, s.miss_count, s.total_error_ms
            );
        }
        out.push('\n');
    }
    out
}

// --- Session ---

fn playback_source(config: &Config, audio: &Path, chart: &Chart) -> PlaybackSource {
    let last_ns = chart.last_time_ns().unwrap_or(0).max(0);
    let length = Duration::from_nanos(scaled_time_ns(config.rate, last_ns) as u64) + SILENT_TAIL;
    if config.player.is_empty() {
        PlaybackSource::Silent { length }
    } else {
        PlaybackSource::Player {
            command: player_args(&config.player, audio, config.rate),
            fallback: length,
        }
    }
}

/// Per-frame collaborators of a running session.
pub struct FrameLoop<'a, R: Renderer, P: Playback> {
    pub renderer: &'a mut R,
    pub playback: &'a P,
    pub input: &'a Receiver<RawKeyEvent>,
    pub keymap: &'a Keymap,
    pub clock: Clock,
    pub frame_period: Duration,
}

impl<R: Renderer, P: Playback> FrameLoop<'_, R, P> {
    /// Feeds every queued key edge to the session. Returns true when Escape
    /// was pressed.
    fn drain_input(&mut self, session: &mut Session) -> bool {
        let mut quit = false;
        loop {
            let ev = match self.input.try_recv() {
                Ok(ev) => ev,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            };
            if ev.code == KEY_ESC {
                quit |= ev.pressed;
                continue;
            }
            let Some(column) = self.keymap.column_of(ev.code) else {
                continue;
            };
            let time_ns = self.clock.ns_at(ev.timestamp);
            if ev.pressed {
                session.press(column, time_ns);
            } else {
                session.release(column, time_ns);
            }
        }
        quit
    }

    /// Runs frames until playback finishes or Escape is pressed; both are
    /// observed at the top of a frame.
    pub fn run(mut self, session: &mut Session, screen: &mut GameplayScreen) -> io::Result<SessionEnd> {
        screen.draw_static(self.renderer, session);
        self.renderer.flush()?;
        let mut quit = false;

        loop {
            let frame_start = Instant::now();
            if quit {
                return Ok(SessionEnd::Aborted);
            }
            if self.playback.is_finished() {
                return Ok(SessionEnd::Finished);
            }

            quit = self.drain_input(session);
            let now_ns = self.clock.now_ns();
            session.update(now_ns);
            screen.apply_events(self.renderer, session);
            screen.draw_frame(self.renderer, session, now_ns);
            self.renderer.flush()?;

            let elapsed = frame_start.elapsed();
            screen.record_frame(self.renderer, session, elapsed);
            if let Some(rest) = self.frame_period.checked_sub(elapsed) {
                thread::sleep(rest);
            }
        }
    }
}

pub fn run(args: &Args, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let files = song::scan(&args.directory)?;
    let mut charts = simfile::parse_file(&files.chart_path)?;
    let store = DiskScoreStore::new(&config.score_dir);

    if args.wants_listing() {
        let listing = build_listing(&charts, &store, &config.judgments);
        if args.json {
            println!("{}", serde_json::to_string_pretty(&listing)?);
        } else {
            print!("{}", format_listing(&listing));
        }
        return Ok(());
    }

    let count = charts.len();
    if args.difficulty >= count {
        return Err(ConfigError::UnknownDifficulty {
            index: args.difficulty,
            count,
        }
        .into());
    }
    let chart = charts.swap_remove(args.difficulty);
    let key_count = chart.key_count();
    let keymap = config.keymap(key_count).ok_or(ConfigError::NoKeymap(key_count))?;

    let (rows, cols) = terminal_size().unwrap_or(DEFAULT_SCREEN);
    let layout = Layout::new(rows, cols, config.bar_row, config.column_spacing, key_count, config.ns_to_row());
    let hash = chart.hash();
    let source = playback_source(config, &files.audio_path, &chart);
    let mut session = Session::new(chart, config.rate, config.judgments.clone(), config.look_ahead_ns(layout.hit_row));
    let mut screen = GameplayScreen::new(layout, config.debug_update_rate);

    let (tx, rx) = input::channel();
    // The reader blocks on the device; it is left to die with the process.
    let _reader = input::spawn_device_reader(&config.input_device, tx)?;

    let mut renderer = TerminalRenderer::new(io::stdout().lock());
    renderer.init()?;

    let mut playback = PlaybackWorker::new(source);
    let clock = Clock::starting_in(config.start_delay());
    playback.start(config.start_delay(), config.global_offset_ns());
    info!(
        "Playing {} ({}) at {}%",
        session.chart.difficulty.name, session.chart.difficulty.meter, config.rate
    );

    let outcome = FrameLoop {
        renderer: &mut renderer,
        playback: &playback,
        input: &rx,
        keymap,
        clock,
        frame_period: config.frame_period(),
    }
    .run(&mut session, &mut screen);
    let restored = renderer.deinit();
    playback.stop();
    let outcome = outcome?;
    restored?;

    session.log_summary();
    match outcome {
        SessionEnd::Finished => match store.save(&hash, session.rate, &session.inputs) {
            Ok(()) => info!("Saved {} inputs", session.inputs.len()),
            Err(e) => warn!("Failed to save score: {e}"),
        },
        SessionEnd::Aborted => info!("Session aborted, score not saved"),
    }
    Ok(())
}
