use crate::config::{CONFIG_PATH, Config};
use clap::Parser;
use std::path::PathBuf;

fn existing_dir(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    if path.is_dir() {
        Ok(path)
    } else {
        Err(format!("'{value}' is not a directory"))
    }
}

#[derive(Parser, Debug)]
#[command(name = "notesync", about = "Play a stepchart in the terminal against an evdev keyboard")]
pub struct Args {
    /// Song directory holding the .sm chart and its audio
    #[arg(value_parser = existing_dir)]
    pub directory: PathBuf,

    /// Playback rate in percent
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    pub rate: Option<u16>,

    /// Global offset in milliseconds
    #[arg(short, long, allow_negative_numbers = true)]
    pub offset: Option<i64>,

    /// Delay before the chart starts, in milliseconds
    #[arg(short, long)]
    pub delay: Option<u64>,

    /// evdev device to read key presses from
    #[arg(short, long, env = "NOTESYNC_INPUT")]
    pub input: Option<PathBuf>,

    /// Difficulty index, as printed by --list
    #[arg(short = 'D', long, default_value_t = 0)]
    pub difficulty: usize,

    /// Print the difficulties with their past scores and exit
    #[arg(short, long)]
    pub list: bool,

    /// Print the listing as JSON
    #[arg(long)]
    pub json: bool,

    /// Configuration file
    #[arg(short, long, default_value = CONFIG_PATH)]
    pub config: PathBuf,
}

impl Args {
    /// Layers command-line overrides on top of the loaded configuration.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(rate) = self.rate {
            config.rate = rate;
        }
        if let Some(offset) = self.offset {
            config.global_offset_ms = offset;
        }
        if let Some(delay) = self.delay {
            config.start_delay_ms = delay;
        }
        if let Some(input) = &self.input {
            config.input_device.clone_from(input);
        }
        config
    }

    #[inline(always)]
    pub const fn wants_listing(&self) -> bool {
        self.list || self.json
    }
}

#[cfg(test)]
mod tests {
    use super::Args;
    use crate::config::Config;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let song = dir.path().to_str().unwrap();
        let args = Args::try_parse_from(["notesync", song, "-r", "150", "-o", "-20", "-d", "500", "-D", "2"]).unwrap();
        assert_eq!(args.difficulty, 2);
        assert!(!args.wants_listing());

        let cfg = args.apply(Config::default());
        assert_eq!(cfg.rate, 150);
        assert_eq!(cfg.global_offset_ms, -20);
        assert_eq!(cfg.start_delay_ms, 500);
        assert_eq!(cfg.input_device, Config::default().input_device);
    }

    #[test]
    fn defaults_leave_config_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args::try_parse_from(["notesync", dir.path().to_str().unwrap(), "--json"]).unwrap();
        assert!(args.wants_listing());
        assert_eq!(args.config, PathBuf::from("notesync.ini"));
        assert_eq!(args.apply(Config::default()), Config::default());
    }

    #[test]
    fn rejects_missing_directory_and_zero_rate() {
        assert!(Args::try_parse_from(["notesync", "/nonexistent/song/dir"]).is_err());
        let dir = tempfile::tempdir().unwrap();
        assert!(Args::try_parse_from(["notesync", dir.path().to_str().unwrap(), "-r", "0"]).is_err());
    }
}
