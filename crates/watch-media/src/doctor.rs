use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::process::Command;

/// External programs the media layer shells out to.
pub const TOOLS: &[&str] = &["ffmpeg", "ffprobe", "ffplay"];

pub async fn check_tool(name: &str) -> Result<()> {
    let status = Command::new(name)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .with_context(|| format!("{} not found on PATH", name))?;
    anyhow::ensure!(status.success(), "{} -version failed", name);
    Ok(())
}

pub fn check_output_dir(dir: &str) -> Result<()> {
    let p = std::path::Path::new(dir);
    if p.exists() {
        anyhow::ensure!(p.is_dir(), "display.output_dir is not a dir: {}", dir);
    }
    Ok(())
}
