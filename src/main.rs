//! # Tide Panel Entry Point
//!
//! Loads configuration, picks a display driver and runs the fetch → render →
//! publish pipeline every refresh interval until interrupted.
//!
//! ```text
//! tide-panel [--config <path>] [--once] [--stdout | --png <path>] [--write-config]
//! ```
//!
//! `--stdout` previews frames as ASCII and `--png` writes them to a file, both
//! handy on machines without a panel. `--once` runs a single iteration and
//! exits non-zero if it fails.

use anyhow::{bail, Context};
use std::env;
use std::path::PathBuf;
use tide_panel::clock::SystemClock;
use tide_panel::config::{Config, DriverKind, DEFAULT_CONFIG_PATH};
use tide_panel::display::auto_detect;
use tide_panel::pipeline::{Cycle, Pipeline};
use tide_panel::publisher::DisplayPublisher;
use tide_panel::scheduler::Scheduler;
use tide_panel::tide_data::NoaaClient;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: tide-panel [--config <path>] [--once] [--stdout | --png <path>] [--write-config]";

/// Command line options.
#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    once: bool,
    stdout: bool,
    png: Option<PathBuf>,
    write_config: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--once" => parsed.once = true,
            "--stdout" => parsed.stdout = true,
            "--write-config" => parsed.write_config = true,
            "--config" => {
                parsed.config = Some(args.next().context("--config needs a path")?.into());
            }
            "--png" => {
                parsed.png = Some(args.next().context("--png needs a path")?.into());
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => bail!("unknown argument {other:?}\n{USAGE}"),
        }
    }
    if parsed.stdout && parsed.png.is_some() {
        bail!("--stdout and --png are mutually exclusive");
    }
    Ok(parsed)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tide_panel=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    init_logging();
    let args = parse_args(env::args().skip(1))?;

    let config_path = args.config.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    if args.write_config {
        Config::default()
            .save(&config_path)
            .with_context(|| format!("writing {}", config_path.display()))?;
        return Ok(());
    }

    let mut config = Config::load_from_path(&config_path);
    if args.stdout {
        config.display.driver = DriverKind::Terminal;
    }
    if let Some(path) = args.png {
        config.display.driver = DriverKind::Png;
        config.display.output_path = path;
    }

    let source = NoaaClient::new(&config.station, &config.api).context("building HTTP client")?;
    let clock = SystemClock::new(config.time.time_reference_mode);
    let driver = auto_detect(&config.display).context("opening display")?;
    let publisher = DisplayPublisher::new(driver, config.display.border);
    let mut pipeline = Pipeline::from_config(source, clock, publisher, &config);

    tracing::info!(
        station = %config.station.id,
        time_reference = %config.time.time_reference_mode,
        dst = SystemClock::dst_in_effect(),
        "🌊 Tide panel starting"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let scheduler = Scheduler::new(config.schedule.refresh_interval());
    runtime.block_on(serve(&mut pipeline, scheduler, args.once))
}

/// Run one iteration, or the scheduler until Ctrl-C.
async fn serve<C: Cycle>(cycle: &mut C, scheduler: Scheduler, once: bool) -> anyhow::Result<()> {
    if once {
        cycle.run_once().await?;
        return Ok(());
    }

    tokio::select! {
        _ = scheduler.run(cycle) => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            tracing::info!("👋 Interrupted, shutting down");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> anyhow::Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_flags_and_paths() {
        let parsed = args(&["--once", "--config", "my.toml", "--png", "out/frame.png"]).unwrap();
        assert!(parsed.once);
        assert!(!parsed.stdout);
        assert_eq!(parsed.config, Some(PathBuf::from("my.toml")));
        assert_eq!(parsed.png, Some(PathBuf::from("out/frame.png")));
    }

    #[test]
    fn rejects_unknown_and_incomplete_arguments() {
        assert!(args(&["--bogus"]).is_err());
        assert!(args(&["--config"]).is_err());
        assert!(args(&["--stdout", "--png", "x.png"]).is_err());
    }
}
