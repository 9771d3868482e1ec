use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{AlarmConfig, AlertSink};

#[cfg(target_os = "macos")]
const DEFAULT_PLAYER: &str = "afplay";
#[cfg(not(target_os = "macos"))]
const DEFAULT_PLAYER: &str = "aplay";

#[derive(Debug)]
struct PlayCommand {
    program: String,
    args: Vec<String>,
    sound: PathBuf,
}

/// Plays the alert sound through an external player program.
///
/// Each trigger spawns a detached tokio task; the `JoinHandle` is dropped, so
/// the caller never observes completion. Failures are logged and swallowed.
#[derive(Debug, Clone)]
pub struct SoundPlayer {
    cmd: Arc<PlayCommand>,
    runtime: tokio::runtime::Handle,
}

impl SoundPlayer {
    /// Must be called from inside a tokio runtime.
    pub fn new(cfg: &AlarmConfig) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().context("sound player needs a tokio runtime")?;
        let program = cfg.player.clone().unwrap_or_else(|| DEFAULT_PLAYER.to_string());
        Ok(Self {
            cmd: Arc::new(PlayCommand {
                program,
                args: cfg.player_args.clone(),
                sound: PathBuf::from(&cfg.sound_path),
            }),
            runtime,
        })
    }

    pub fn program(&self) -> &str {
        &self.cmd.program
    }
}

impl AlertSink for SoundPlayer {
    fn trigger(&self) {
        let cmd = self.cmd.clone();
        self.runtime.spawn(async move {
            if let Err(e) = play(&cmd).await {
                warn!("alarm: playback failed: {:#}", e);
            }
        });
    }
}

async fn play(cmd: &PlayCommand) -> Result<()> {
    anyhow::ensure!(cmd.sound.is_file(), "sound file missing: {}", cmd.sound.display());

    debug!(program = %cmd.program, sound = %cmd.sound.display(), "alarm: play");
    let status = Command::new(&cmd.program)
        .args(&cmd.args)
        .arg(&cmd.sound)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .with_context(|| format!("run {}", cmd.program))?;
    anyhow::ensure!(status.success(), "{} exited with {}", cmd.program, status);
    Ok(())
}
