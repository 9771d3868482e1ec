use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use image::RgbImage;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info};

use crate::{Display, DisplayEvent, MediaKind};

/// Window backed by an `ffplay` child reading raw RGB24 on stdin.
/// ffplay's own `q`/Esc or closing the window ends the child, which we report as `Quit`.
pub struct FfplayDisplay {
    title: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    size: Option<(u32, u32)>,
}

impl FfplayDisplay {
    pub fn new(title: &str) -> Self {
        Self { title: title.to_string(), child: None, stdin: None, size: None }
    }

    fn spawn(&mut self, w: u32, h: u32) -> Result<()> {
        // ffplay -f rawvideo -pixel_format rgb24 -video_size WxH -window_title <t> -i -
        let mut cmd = Command::new("ffplay");
        cmd.args(["-hide_banner", "-loglevel", "error", "-f", "rawvideo", "-pixel_format", "rgb24"])
            .args(["-video_size", &format!("{w}x{h}")])
            .args(["-window_title", &self.title])
            .args(["-i", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        debug!(title = %self.title, w, h, "display: spawn ffplay");
        let mut child = cmd.spawn().context("run ffplay")?;
        self.stdin = child.stdin.take();
        self.child = Some(child);
        self.size = Some((w, h));
        Ok(())
    }

    fn window_gone(&mut self) -> bool {
        match self.child.as_mut() {
            Some(c) => !matches!(c.try_wait(), Ok(None)),
            None => true,
        }
    }
}

impl Display for FfplayDisplay {
    async fn show(&mut self, frame: &RgbImage) -> Result<DisplayEvent> {
        let dims = frame.dimensions();
        match self.size {
            None => self.spawn(dims.0, dims.1)?,
            Some(size) => anyhow::ensure!(size == dims, "frame size changed from {:?} to {:?}", size, dims),
        }
        if self.window_gone() {
            return Ok(DisplayEvent::Quit);
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Ok(DisplayEvent::Quit);
        };
        match stdin.write_all(frame.as_raw()).await {
            Ok(()) => Ok(DisplayEvent::Continue),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(DisplayEvent::Quit),
            Err(e) => Err(e).context("write frame to ffplay"),
        }
    }

    async fn wait_dismissed(&mut self) -> Result<()> {
        // EOF on stdin leaves the last frame on screen until the operator closes it.
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.flush().await;
        }
        if let Some(child) = self.child.as_mut() {
            info!("display: close the window or press q to continue");
            child.wait().await.context("wait for ffplay")?;
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
            debug!(title = %self.title, "display: closed");
        }
    }
}

/// Headless sink writing annotated PNGs; never asks for dismissal.
pub struct FileDisplay {
    dir: PathBuf,
    stem: String,
    kind: MediaKind,
    frames: u64,
}

impl FileDisplay {
    pub fn new(dir: &str, kind: MediaKind, source: &Path) -> Result<Self> {
        let dir = PathBuf::from(dir);
        std::fs::create_dir_all(&dir).with_context(|| format!("create output dir {}", dir.display()))?;
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("frame")
            .to_string();
        Ok(Self { dir, stem, kind, frames: 0 })
    }

    pub fn next_path(&self) -> PathBuf {
        match self.kind {
            MediaKind::Image => self.dir.join(format!("{}_annotated.png", self.stem)),
            MediaKind::Video => self.dir.join(format!("{}_{:06}.png", self.stem, self.frames)),
        }
    }
}

impl Display for FileDisplay {
    async fn show(&mut self, frame: &RgbImage) -> Result<DisplayEvent> {
        let path = self.next_path();
        let owned = frame.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || owned.save(&target))
            .await
            .context("join png writer")?
            .with_context(|| format!("write {}", path.display()))?;
        self.frames += 1;
        debug!(path = %path.display(), "display: wrote frame");
        Ok(DisplayEvent::Continue)
    }

    async fn wait_dismissed(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) {
        if self.frames > 0 {
            info!(dir = %self.dir.display(), frames = self.frames, "display: annotated output written");
        }
    }
}

/// Display selected by `display.mode`.
pub enum DisplaySink {
    Window(FfplayDisplay),
    Files(FileDisplay),
}

impl Display for DisplaySink {
    async fn show(&mut self, frame: &RgbImage) -> Result<DisplayEvent> {
        match self {
            DisplaySink::Window(d) => d.show(frame).await,
            DisplaySink::Files(d) => d.show(frame).await,
        }
    }

    async fn wait_dismissed(&mut self) -> Result<()> {
        match self {
            DisplaySink::Window(d) => d.wait_dismissed().await,
            DisplaySink::Files(d) => d.wait_dismissed().await,
        }
    }

    async fn close(&mut self) {
        match self {
            DisplaySink::Window(d) => d.close().await,
            DisplaySink::Files(d) => d.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn image_mode_writes_one_annotated_file() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let mut d = FileDisplay::new(out.to_str().unwrap(), MediaKind::Image, Path::new("pics/shot.PNG")).unwrap();

        let ev = d.show(&RgbImage::new(3, 2)).await.unwrap();
        assert_eq!(ev, DisplayEvent::Continue);
        d.wait_dismissed().await.unwrap();
        d.close().await;

        assert!(out.join("shot_annotated.png").is_file());
    }

    #[tokio::test]
    async fn video_mode_numbers_frames() {
        let dir = TempDir::new().unwrap();
        let mut d = FileDisplay::new(dir.path().to_str().unwrap(), MediaKind::Video, Path::new("clip.mp4")).unwrap();
        for _ in 0..3 {
            d.show(&RgbImage::new(2, 2)).await.unwrap();
        }
        assert!(dir.path().join("clip_000000.png").is_file());
        assert!(dir.path().join("clip_000002.png").is_file());
        assert_eq!(d.next_path(), dir.path().join("clip_000003.png"));
    }

    #[tokio::test]
    async fn window_close_without_show_is_noop() {
        let mut d = FfplayDisplay::new("Detection Result");
        d.close().await;
        d.wait_dismissed().await.unwrap();
    }
}
