use log::{error, info, warn};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Monotonic session clock. Time zero is the moment the chart's timeline
/// starts; inputs before it have negative timestamps.
#[derive(Clone, Copy, Debug)]
pub struct Clock {
    zero: Instant,
}

impl Clock {
    pub fn starting_in(delay: Duration) -> Self {
        Self {
            zero: Instant::now() + delay,
        }
    }

    #[cfg(test)]
    pub const fn at(zero: Instant) -> Self {
        Self { zero }
    }

    /// Signed nanoseconds from time zero to `t`.
    pub fn ns_at(&self, t: Instant) -> i64 {
        match t.checked_duration_since(self.zero) {
            Some(d) => d.as_nanos() as i64,
            None => -(self.zero.duration_since(t).as_nanos() as i64),
        }
    }

    #[inline(always)]
    pub fn now_ns(&self) -> i64 {
        self.ns_at(Instant::now())
    }
}

/// Start delay adjusted by the global offset, clamped at zero.
pub fn offset_delay(delay: Duration, offset_ns: i64) -> Duration {
    let total = delay.as_nanos() as i64 + offset_ns;
    Duration::from_nanos(total.max(0) as u64)
}

pub trait Playback {
    /// Begins playback after `delay` shifted by `offset_ns`.
    fn start(&mut self, delay: Duration, offset_ns: i64);
    fn is_finished(&self) -> bool;
    fn stop(&mut self);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaybackSource {
    /// External player, already expanded with [`player_args`]. If it cannot
    /// be launched the worker times `fallback` instead.
    Player { command: Vec<String>, fallback: Duration },
    /// No audio output; the track "ends" after `length`.
    Silent { length: Duration },
}

/// Expands a player command line for one track: `{audio}` and `{rate}` are
/// substituted, and the audio path is appended when `{audio}` is absent.
pub fn player_args(command: &[String], audio: &Path, rate: u16) -> Vec<String> {
    let audio = audio.display().to_string();
    let rate = format!("{:.2}", f64::from(rate) / 100.0);
    let mut has_audio = false;
    let mut out: Vec<String> = command
        .iter()
        .map(|arg| {
            if arg.contains("{audio}") {
                has_audio = true;
            }
            arg.replace("{audio}", &audio).replace("{rate}", &rate)
        })
        .collect();
    if !has_audio {
        out.push(audio);
    }
    out
}

/// Runs playback on its own thread and raises a flag when the track ends.
pub struct PlaybackWorker {
    source: PlaybackSource,
    finished: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackWorker {
    pub fn new(source: PlaybackSource) -> Self {
        Self {
            source,
            finished: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }
}

/// Sleeps in short steps; returns false if asked to stop first.
fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) -> bool {
    let until = Instant::now() + total;
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= until {
            return true;
        }
        thread::sleep((until - now).min(POLL_INTERVAL));
    }
}

fn spawn_player(command: &[String]) -> Option<Child> {
    let (program, args) = command.split_first()?;
    match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => Some(child),
        Err(e) => {
            warn!("Failed to launch player {program:?}: {e}");
            None
        }
    }
}

fn wait_for_player(mut child: Child, stop: &AtomicBool) {
    loop {
        if stop.load(Ordering::Relaxed) {
            let _ = child.kill();
            let _ = child.wait();
            return;
        }
        match child.try_wait() {
            Ok(Some(status)) => {
                info!("Player exited with {status}");
                return;
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                error!("Lost track of player process: {e}");
                return;
            }
        }
    }
}

impl Playback for PlaybackWorker {
    fn start(&mut self, delay: Duration, offset_ns: i64) {
        if self.handle.is_some() {
            return;
        }
        let wait = offset_delay(delay, offset_ns);
        let source = self.source.clone();
        let finished = Arc::clone(&self.finished);
        let stop = Arc::clone(&self.stop);
        self.handle = Some(thread::spawn(move || {
            if !sleep_unless_stopped(wait, &stop) {
                return;
            }
            match source {
                PlaybackSource::Player { command, fallback } => match spawn_player(&command) {
                    Some(child) => wait_for_player(child, &stop),
                    None => {
                        if !sleep_unless_stopped(fallback, &stop) {
                            return;
                        }
                    }
                },
                PlaybackSource::Silent { length } => {
                    if !sleep_unless_stopped(length, &stop) {
                        return;
                    }
                }
            }
            if !stop.load(Ordering::Relaxed) {
                finished.store(true, Ordering::Release);
            }
        }));
    }

    #[inline(always)]
    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PlaybackWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, Playback, PlaybackSource, PlaybackWorker, offset_delay, player_args};
    use std::path::Path;
    use std::time::{Duration, Instant};

    #[test]
    fn clock_is_signed_around_zero() {
        let zero = Instant::now();
        let clock = Clock::at(zero);
        assert_eq!(clock.ns_at(zero), 0);
        assert_eq!(clock.ns_at(zero + Duration::from_millis(5)), 5_000_000);
        let future = Clock::starting_in(Duration::from_secs(60));
        assert!(future.now_ns() < 0);
    }

    #[test]
    fn offset_shifts_and_clamps_delay() {
        let d = Duration::from_millis(1_500);
        assert_eq!(offset_delay(d, 20_000_000), Duration::from_millis(1_520));
        assert_eq!(offset_delay(d, -500_000_000), Duration::from_millis(1_000));
        assert_eq!(offset_delay(d, -5_000_000_000), Duration::ZERO);
    }

    #[test]
    fn player_arguments_are_expanded() {
        let cmd: Vec<String> = ["mpv", "--speed={rate}"].iter().map(|s| s.to_string()).collect();
        let args = player_args(&cmd, Path::new("/s/a.ogg"), 150);
        assert_eq!(args, vec!["mpv", "--speed=1.50", "/s/a.ogg"]);

        let cmd: Vec<String> = ["play", "{audio}", "tempo", "{rate}"].iter().map(|s| s.to_string()).collect();
        let args = player_args(&cmd, Path::new("x.mp3"), 100);
        assert_eq!(args, vec!["play", "x.mp3", "tempo", "1.00"]);
    }

    #[test]
    fn silent_playback_finishes_after_its_length() {
        let mut worker = PlaybackWorker::new(PlaybackSource::Silent {
            length: Duration::from_millis(10),
        });
        assert!(!worker.is_finished());
        worker.start(Duration::from_millis(5), 0);
        let deadline = Instant::now() + Duration::from_secs(5);
        while !worker.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(worker.is_finished());
    }

    #[test]
    fn unlaunchable_player_falls_back_to_timer() {
        let mut worker = PlaybackWorker::new(PlaybackSource::Player {
            command: vec!["/nonexistent/notesync-player".to_string()],
            fallback: Duration::from_millis(10),
        });
        worker.start(Duration::ZERO, 0);
        let deadline = Instant::now() + Duration::from_secs(5);
        while !worker.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(worker.is_finished());
    }

    #[test]
    fn stopping_early_never_reports_finished() {
        let mut worker = PlaybackWorker::new(PlaybackSource::Silent {
            length: Duration::from_secs(30),
        });
        worker.start(Duration::ZERO, 0);
        worker.stop();
        assert!(!worker.is_finished());
    }
}
