use crate::core::input::Keymap;
use crate::game::judgment::{DEFAULT_MISS_LABEL, DEFAULT_WINDOWS_MS, Judgment, Judgments};
use crate::game::timing::NS_PER_MS;
use ini::Ini;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const CONFIG_PATH: &str = "notesync.ini";

const DEFAULT_KEYS_SINGLE: &str = "12,40,17,50";
const DEFAULT_KEYS_SOLO: &str = "23,18,24,20,31,46";
const DEFAULT_KEYS_DOUBLE: &str = "23,18,24,49,35,20,31,46";
const DEFAULT_INPUT_DEVICE: &str = "/dev/input/by-id/usb-OLKB_Planck-event-kbd";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Off => log::LevelFilter::Off,
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log_level: LogLevel,
    /// Playback rate in percent.
    pub rate: u16,
    pub global_offset_ms: i64,
    pub start_delay_ms: u64,
    pub frame_period_us: u64,
    /// Lower is faster.
    pub scroll_speed: u32,
    pub refresh_rate: f64,
    /// Terminal rows between the hit bar and the bottom of the screen.
    pub bar_row: u16,
    pub column_spacing: u16,
    pub debug_update_rate: u32,
    pub input_device: PathBuf,
    pub score_dir: PathBuf,
    /// External player command line; empty plays silently.
    pub player: Vec<String>,
    pub judgments: Judgments,
    pub keys_single: Keymap,
    pub keys_solo: Keymap,
    pub keys_double: Keymap,
}

fn default_keymap(list: &str) -> Keymap {
    Keymap::parse(list).unwrap_or_else(|| Keymap::new(Vec::new()))
}

fn default_score_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "notesync")
        .map(|dirs| dirs.data_dir().join("scores"))
        .unwrap_or_else(|| PathBuf::from("scores"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Warn,
            rate: 100,
            global_offset_ms: 0,
            start_delay_ms: 1_500,
            frame_period_us: 1_000,
            scroll_speed: 3,
            refresh_rate: 240.0,
            bar_row: 8,
            column_spacing: 12,
            debug_update_rate: 240,
            input_device: PathBuf::from(DEFAULT_INPUT_DEVICE),
            score_dir: default_score_dir(),
            player: Vec::new(),
            judgments: Judgments::default(),
            keys_single: default_keymap(DEFAULT_KEYS_SINGLE),
            keys_solo: default_keymap(DEFAULT_KEYS_SOLO),
            keys_double: default_keymap(DEFAULT_KEYS_DOUBLE),
        }
    }
}

impl Config {
    pub fn keymap(&self, key_count: u8) -> Option<&Keymap> {
        let map = match key_count {
            4 => &self.keys_single,
            6 => &self.keys_solo,
            8 => &self.keys_double,
            _ => return None,
        };
        (map.len() == usize::from(key_count)).then_some(map)
    }

    #[inline(always)]
    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    #[inline(always)]
    pub fn frame_period(&self) -> Duration {
        Duration::from_micros(self.frame_period_us.max(1))
    }

    #[inline(always)]
    pub fn global_offset_ns(&self) -> i64 {
        self.global_offset_ms * NS_PER_MS
    }

    /// Terminal rows travelled per nanosecond of scroll.
    pub fn ns_to_row(&self) -> f64 {
        let speed = f64::from(self.scroll_speed.max(1));
        let refresh = if self.refresh_rate.is_finite() && self.refresh_rate > 0.0 {
            self.refresh_rate
        } else {
            240.0
        };
        1.0 / (speed * 1000.0 / refresh * 1_000_000.0)
    }

    /// Wall-clock time a note spends between entering the screen at the top
    /// and reaching a hit bar `hit_row` rows below it.
    pub fn look_ahead_ns(&self, hit_row: u16) -> i64 {
        (f64::from(hit_row) / self.ns_to_row()) as i64
    }
}

// --- File I/O ---

fn judgment_windows_string(j: &Judgments) -> (String, String, String) {
    let mut windows = Vec::new();
    let mut labels = Vec::new();
    let mut miss = DEFAULT_MISS_LABEL.to_string();
    for (i, entry) in j.iter().enumerate() {
        if i == j.miss_index() {
            miss.clone_from(&entry.label);
        } else {
            windows.push((entry.threshold_ns / NS_PER_MS).to_string());
            labels.push(entry.label.clone());
        }
    }
    (windows.join(","), labels.join(","), miss)
}

fn to_ini(cfg: &Config) -> Ini {
    let (windows, labels, miss) = judgment_windows_string(&cfg.judgments);
    let mut conf = Ini::new();
    // Keys in alphabetical order.
    conf.with_section(Some("Options"))
        .set("BarRow", cfg.bar_row.to_string())
        .set("ColumnSpacing", cfg.column_spacing.to_string())
        .set("DebugUpdateRate", cfg.debug_update_rate.to_string())
        .set("FramePeriodMicros", cfg.frame_period_us.to_string())
        .set("GlobalOffsetMs", cfg.global_offset_ms.to_string())
        .set("InputDevice", cfg.input_device.display().to_string())
        .set("LogLevel", cfg.log_level.as_str())
        .set("Player", cfg.player.join(" "))
        .set("Rate", cfg.rate.to_string())
        .set("RefreshRate", cfg.refresh_rate.to_string())
        .set("ScoreDir", cfg.score_dir.display().to_string())
        .set("ScrollSpeed", cfg.scroll_speed.to_string())
        .set("StartDelayMs", cfg.start_delay_ms.to_string());
    conf.with_section(Some("Judgments"))
        .set("Labels", labels)
        .set("MissLabel", miss)
        .set("WindowsMs", windows);
    conf.with_section(Some("Keymaps"))
        .set("Double", cfg.keys_double.to_list())
        .set("Single", cfg.keys_single.to_list())
        .set("Solo", cfg.keys_solo.to_list());
    conf
}

fn create_default_config_file(path: &Path) -> Result<(), std::io::Error> {
    info!("'{}' not found, creating with default values.", path.display());
    to_ini(&Config::default()).write_to_file(path)
}

fn parse_judgments(conf: &Ini) -> Option<Judgments> {
    let windows = conf.get_from(Some("Judgments"), "WindowsMs")?;
    let labels: Vec<&str> = conf
        .get_from(Some("Judgments"), "Labels")
        .map(|l| l.split(',').map(str::trim).collect())
        .unwrap_or_default();
    let miss = conf
        .get_from(Some("Judgments"), "MissLabel")
        .unwrap_or(DEFAULT_MISS_LABEL);

    let mut entries = Vec::new();
    for (i, w) in windows.split(',').enumerate() {
        let ms = w.trim().parse::<i64>().ok()?;
        let label = labels
            .get(i)
            .filter(|l| !l.is_empty())
            .map_or_else(|| default_label(i), |l| (*l).to_string());
        entries.push(Judgment {
            threshold_ns: ms * NS_PER_MS,
            label,
        });
    }
    Some(Judgments::new(entries, miss.trim()))
}

fn default_label(i: usize) -> String {
    DEFAULT_WINDOWS_MS
        .get(i)
        .map_or_else(|| format!("W{}", i + 1), |(_, l)| (*l).to_string())
}

fn from_ini(conf: &Ini) -> Config {
    let default = Config::default();
    let opt = |key: &str| conf.get_from(Some("Options"), key).map(str::trim);
    let keys = |key: &str| conf.get_from(Some("Keymaps"), key).and_then(Keymap::parse);

    Config {
        log_level: opt("LogLevel")
            .and_then(|v| LogLevel::from_str(v).ok())
            .unwrap_or(default.log_level),
        rate: opt("Rate")
            .and_then(|v| v.parse::<u16>().ok())
            .filter(|&r| r > 0)
            .unwrap_or(default.rate),
        global_offset_ms: opt("GlobalOffsetMs")
            .and_then(|v| v.parse().ok())
            .unwrap_or(default.global_offset_ms),
        start_delay_ms: opt("StartDelayMs")
            .and_then(|v| v.parse().ok())
            .unwrap_or(default.start_delay_ms),
        frame_period_us: opt("FramePeriodMicros")
            .and_then(|v| v.parse().ok())
            .filter(|&p| p > 0)
            .unwrap_or(default.frame_period_us),
        scroll_speed: opt("ScrollSpeed")
            .and_then(|v| v.parse().ok())
            .filter(|&s| s > 0)
            .unwrap_or(default.scroll_speed),
        refresh_rate: opt("RefreshRate")
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|r| r.is_finite() && *r > 0.0)
            .unwrap_or(default.refresh_rate),
        bar_row: opt("BarRow")
            .and_then(|v| v.parse().ok())
            .unwrap_or(default.bar_row),
        column_spacing: opt("ColumnSpacing")
            .and_then(|v| v.parse().ok())
            .unwrap_or(default.column_spacing),
        debug_update_rate: opt("DebugUpdateRate")
            .and_then(|v| v.parse().ok())
            .filter(|&r| r > 0)
            .unwrap_or(default.debug_update_rate),
        input_device: opt("InputDevice")
            .filter(|v| !v.is_empty())
            .map_or(default.input_device, PathBuf::from),
        score_dir: opt("ScoreDir")
            .filter(|v| !v.is_empty())
            .map_or(default.score_dir, PathBuf::from),
        player: opt("Player")
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or(default.player),
        judgments: parse_judgments(conf).unwrap_or(default.judgments),
        keys_single: keys("Single").unwrap_or(default.keys_single),
        keys_solo: keys("Solo").unwrap_or(default.keys_solo),
        keys_double: keys("Double").unwrap_or(default.keys_double),
    }
}

/// Reads the configuration at `path`, creating it with defaults when
/// missing. Unreadable files and malformed keys fall back to defaults.
pub fn load(path: &Path) -> Config {
    if !path.exists()
        && let Err(e) = create_default_config_file(path)
    {
        warn!("Failed to create default config file: {e}");
    }

    match Ini::load_from_file(path) {
        Ok(conf) => {
            let cfg = from_ini(&conf);
            info!("Configuration loaded from '{}'.", path.display());
            cfg
        }
        Err(e) => {
            warn!("Failed to load '{}': {e}. Using default values.", path.display());
            Config::default()
        }
    }
}
