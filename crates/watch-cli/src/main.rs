mod config;
mod events;
mod runner;
mod stop;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use watch_alarm::{AlarmDispatcher, SoundPlayer};
use watch_media::SystemBackend;
use watch_vision::Detector;

#[cfg(feature = "vision-tflite")]
use watch_vision::tflite::TfliteDetector;

use crate::config::{load_config, Config};
use crate::events::EventLog;
use crate::runner::{Outcome, Pipeline};

#[derive(Debug, Parser)]
#[command(
    name = "poolwatch",
    version,
    about = "poolwatch - drowning detection on images and video",
    subcommand_negates_reqs = true
)]
struct Cli {
    /// TOML config; built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to an image or video file, e.g. 'video.mp4' or 'image.jpg'.
    #[arg(long, required = true)]
    source: Option<PathBuf>,

    /// Append JSON-lines frame/alarm events to this file.
    #[arg(long)]
    events: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate config, model, sound file and external tools.
    Doctor,
    Vision { #[command(subcommand)] cmd: VisionCmd },
}

#[derive(Debug, Subcommand)]
enum VisionCmd {
    /// Print model tensor shapes.
    Inspect,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    match (cli.cmd, cli.source) {
        (Some(Command::Doctor), _) => doctor(&cfg).await,
        (Some(Command::Vision { cmd }), _) => vision_cmd(&cfg, cmd),
        (None, Some(source)) => run(&cfg, &source, cli.events.as_deref()).await,
        (None, None) => anyhow::bail!("--source is required"),
    }
}

async fn run(cfg: &Config, source: &Path, events: Option<&Path>) -> Result<()> {
    // Route before loading the model so a bad extension costs nothing.
    let Some(kind) = runner::route(source) else {
        return Ok(());
    };

    info!(source = %source.display(), "run: starting");
    let detector = init_detector(cfg)?;
    let cooldown = cfg.alarm.cooldown()?;
    let dispatcher = AlarmDispatcher::new(cooldown, SoundPlayer::new(&cfg.alarm)?);
    let events = match events {
        Some(p) => EventLog::open(p)?,
        None => EventLog::disabled(),
    };
    let mut pipeline = Pipeline::new(detector, dispatcher, events);
    let backend = SystemBackend::new(cfg.display.clone())?;
    let stop = stop::spawn_stop_listeners();

    match runner::run_source(&backend, &mut pipeline, kind, source, &stop).await? {
        Outcome::InputFailed(e) => warn!("run: input error: {}", e),
        Outcome::Image { drowning } => info!(drowning, "run: image done"),
        Outcome::Video { frames, stopped } => info!(frames, stopped, "run: video done"),
    }
    Ok(())
}

async fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    watch_vision::doctor::check_model(&cfg.vision)?;
    watch_alarm::doctor::check_cooldown(&cfg.alarm)?;
    watch_alarm::doctor::check_sound(&cfg.alarm).or_else(|e| {
        warn!("alarm will be silent: {:#}", e);
        Ok::<(), anyhow::Error>(())
    })?;

    SystemBackend::new(cfg.display.clone())?;
    if cfg.display.mode == "files" {
        watch_media::doctor::check_output_dir(&cfg.display.output_dir)?;
    }
    for tool in watch_media::doctor::TOOLS {
        if let Err(e) = watch_media::doctor::check_tool(tool).await {
            warn!("doctor: {:#}", e);
        }
    }

    #[cfg(not(feature = "vision-tflite"))]
    warn!("doctor: binary built without --features vision-tflite; detection is unavailable");

    info!("doctor: OK");
    Ok(())
}

fn vision_cmd(cfg: &Config, cmd: VisionCmd) -> Result<()> {
    match cmd {
        VisionCmd::Inspect => {
            #[cfg(feature = "vision-tflite")]
            {
                let mut det = TfliteDetector::new(cfg.vision.clone())?;
                print!("{}", det.inspect()?);
                Ok(())
            }
            #[cfg(not(feature = "vision-tflite"))]
            {
                let _ = cfg;
                anyhow::bail!("vision backend not available; build with --features vision-tflite");
            }
        }
    }
}

fn init_detector(cfg: &Config) -> Result<Box<dyn Detector>> {
    #[cfg(not(feature = "vision-tflite"))]
    {
        let _ = cfg;
        anyhow::bail!("no vision backend compiled in; build with --features vision-tflite");
    }

    #[cfg(feature = "vision-tflite")]
    {
        match cfg.vision.backend.as_str() {
            "tflite" => Ok(Box::new(TfliteDetector::new(cfg.vision.clone())?)),
            other => anyhow::bail!("unknown vision.backend: {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn source_required_unless_subcommand() {
        assert!(Cli::try_parse_from(["poolwatch"]).is_err());
        let cli = Cli::try_parse_from(["poolwatch", "--source", "pool.mp4"]).unwrap();
        assert_eq!(cli.source.as_deref(), Some(Path::new("pool.mp4")));
        let cli = Cli::try_parse_from(["poolwatch", "doctor", "--config", "pw.toml"]).unwrap();
        assert!(matches!(cli.cmd, Some(Command::Doctor)));
        assert_eq!(cli.config.as_deref(), Some(Path::new("pw.toml")));
    }

    #[tokio::test]
    async fn unsupported_source_skips_model_loading() {
        // would fail on the missing model if it got that far
        run(&Config::default(), Path::new("notes.txt"), None).await.unwrap();
    }
}
