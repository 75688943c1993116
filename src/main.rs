mod app;
mod cli;
mod config;
mod core;
mod game;
mod screens;

use clap::Parser;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install logger immediately, then set runtime max level from config after loading it.
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .try_init();
    // Startup default when config is missing or malformed.
    log::set_max_level(log::LevelFilter::Warn);

    let args = cli::Args::parse();
    let config = args.apply(config::load(&args.config));
    log::set_max_level(config.log_level.as_level_filter());
    app::run(&args, &config)
}
