//! Frame sources and display sinks for poolwatch.
//!
//! Decoding and rendering are delegated: stills go through the `image` crate,
//! video is piped out of an `ffmpeg` child as raw RGB24, and the window is an
//! `ffplay` child fed the same way. The run loop only sees the traits below.
#![allow(async_fn_in_trait)]

pub mod display;
pub mod doctor;
pub mod still;
pub mod video;

use std::path::{Path, PathBuf};

use anyhow::Result;
use image::RgbImage;
use serde::Deserialize;
use thiserror::Error;

pub use display::{DisplaySink, FfplayDisplay, FileDisplay};
pub use video::FfmpegVideo;

const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "bmp"];
const VIDEO_EXTS: &[&str] = &["mp4", "avi", "mov", "mkv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Routes by file extension, case-insensitive.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if IMAGE_EXTS.contains(&ext.as_str()) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    pub fn window_title(self) -> &'static str {
        match self {
            MediaKind::Image => "Detection Result",
            MediaKind::Video => "Video Detection",
        }
    }
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("unable to load image {}: {source}", .path.display())]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("unable to open video {}: {reason}", .path.display())]
    VideoOpen { path: PathBuf, reason: String },
    #[error("video read failed after {frames} frames: {reason}")]
    VideoRead { frames: u64, reason: String },
}

/// Sequential frames from one opened source.
pub trait FrameSource {
    /// `Ok(None)` once the source is exhausted.
    async fn next_frame(&mut self) -> Result<Option<RgbImage>, InputError>;
    /// Idempotent; called on every exit path of the run loop.
    async fn release(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    Continue,
    Quit,
}

pub trait Display {
    async fn show(&mut self, frame: &RgbImage) -> Result<DisplayEvent>;
    /// Blocks until the operator dismisses a still image.
    async fn wait_dismissed(&mut self) -> Result<()>;
    /// Idempotent; called on every exit path of the run loop.
    async fn close(&mut self);
}

/// Everything the run loop acquires from the outside world.
pub trait MediaBackend {
    type Video: FrameSource;
    type Display: Display;

    async fn load_image(&self, path: &Path) -> Result<RgbImage, InputError>;
    async fn open_video(&self, path: &Path) -> Result<Self::Video, InputError>;
    async fn open_display(&self, kind: MediaKind, source: &Path) -> Result<Self::Display>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub mode: String, // "window" | "files"
    pub output_dir: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { mode: "window".into(), output_dir: "annotated".into() }
    }
}

/// Production backend: `image` for stills, ffmpeg for video, ffplay or PNG files for display.
#[derive(Debug, Clone)]
pub struct SystemBackend {
    display: DisplayConfig,
}

impl SystemBackend {
    pub fn new(display: DisplayConfig) -> Result<Self> {
        anyhow::ensure!(
            matches!(display.mode.as_str(), "window" | "files"),
            "unknown display.mode: {}",
            display.mode
        );
        Ok(Self { display })
    }
}

impl MediaBackend for SystemBackend {
    type Video = FfmpegVideo;
    type Display = DisplaySink;

    async fn load_image(&self, path: &Path) -> Result<RgbImage, InputError> {
        still::load(path).await
    }

    async fn open_video(&self, path: &Path) -> Result<Self::Video, InputError> {
        FfmpegVideo::open(path).await
    }

    async fn open_display(&self, kind: MediaKind, source: &Path) -> Result<Self::Display> {
        Ok(match self.display.mode.as_str() {
            "files" => DisplaySink::Files(FileDisplay::new(&self.display.output_dir, kind, source)?),
            _ => DisplaySink::Window(FfplayDisplay::new(kind.window_title())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_by_extension_case_insensitive() {
        assert_eq!(MediaKind::from_path(Path::new("clip.mp4")), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_path(Path::new("dir/CLIP.MKV")), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_path(Path::new("shot.PNG")), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_path(Path::new("a.b/shot.jpeg")), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_path(Path::new("x.Bmp")), Some(MediaKind::Image));
    }

    #[test]
    fn rejects_other_extensions() {
        assert_eq!(MediaKind::from_path(Path::new("clip.txt")), None);
        assert_eq!(MediaKind::from_path(Path::new("noext")), None);
        assert_eq!(MediaKind::from_path(Path::new("mp4")), None);
        assert_eq!(MediaKind::from_path(Path::new("clip.mp4.txt")), None);
    }

    #[test]
    fn unknown_display_mode_is_rejected() {
        let cfg = DisplayConfig { mode: "hologram".into(), ..Default::default() };
        assert!(SystemBackend::new(cfg).is_err());
        assert!(SystemBackend::new(DisplayConfig::default()).is_ok());
    }

    #[test]
    fn input_error_messages_name_the_path() {
        let e = InputError::VideoOpen { path: "pool.mp4".into(), reason: "no such file".into() };
        assert_eq!(e.to_string(), "unable to open video pool.mp4: no such file");
    }
}
