use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use image::RgbImage;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::{FrameSource, InputError};

/// Program plus leading arguments used to launch `ffmpeg` or `ffprobe`.
#[derive(Debug, Clone)]
pub struct Tool {
    program: String,
    lead: Vec<String>,
}

impl Tool {
    pub fn new(program: &str) -> Self {
        Self { program: program.to_string(), lead: Vec::new() }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.lead);
        cmd
    }
}

/// Video decoded by an `ffmpeg` child into raw RGB24 frames on stdout.
///
/// Frame size comes from `ffprobe` on stream `v:0`. The decoder is pinned to
/// that stream, with autorotation off and an explicit scale, so every frame
/// on the pipe has exactly the probed geometry.
pub struct FfmpegVideo {
    path: PathBuf,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    width: u32,
    height: u32,
    frames: u64,
}

impl FfmpegVideo {
    pub async fn open(path: &Path) -> Result<Self, InputError> {
        Self::open_with(&Tool::new("ffprobe"), &Tool::new("ffmpeg"), path).await
    }

    pub async fn open_with(ffprobe: &Tool, ffmpeg: &Tool, path: &Path) -> Result<Self, InputError> {
        let open_err = |reason: String| InputError::VideoOpen { path: path.to_path_buf(), reason };

        if !path.is_file() {
            return Err(open_err("no such file".into()));
        }
        let (width, height) = probe_dims(ffprobe, path).await.map_err(open_err)?;

        let mut cmd = ffmpeg.command();
        cmd.args(decoder_args(path, width, height))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        debug!(path = %path.display(), width, height, "video: spawn ffmpeg decoder");
        let mut child = cmd.spawn().map_err(|e| open_err(format!("run ffmpeg: {e}")))?;
        let stdout = child.stdout.take().ok_or_else(|| open_err("ffmpeg stdout not captured".into()))?;

        info!(path = %path.display(), width, height, "video: opened");
        Ok(Self { path: path.to_path_buf(), child: Some(child), stdout: Some(stdout), width, height, frames: 0 })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    async fn decoder_failed(&mut self) -> Option<String> {
        let child = self.child.as_mut()?;
        match child.wait().await {
            Ok(status) if !status.success() => Some(format!("ffmpeg exited with {status}")),
            Ok(_) => None,
            Err(e) => Some(format!("wait ffmpeg: {e}")),
        }
    }
}

impl FrameSource for FfmpegVideo {
    async fn next_frame(&mut self) -> Result<Option<RgbImage>, InputError> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let frame_bytes = self.width as usize * self.height as usize * 3;
        let mut buf = vec![0u8; frame_bytes];
        let mut filled = 0;
        while filled < frame_bytes {
            let n = stdout
                .read(&mut buf[filled..])
                .await
                .map_err(|e| InputError::VideoRead { frames: self.frames, reason: e.to_string() })?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled < frame_bytes {
            self.stdout = None;
            if filled > 0 {
                warn!(path = %self.path.display(), filled, frame_bytes, "video: truncated final frame dropped");
            }
            if let Some(reason) = self.decoder_failed().await {
                if self.frames == 0 {
                    return Err(InputError::VideoRead { frames: 0, reason });
                }
                warn!(path = %self.path.display(), %reason, "video: decoder stopped early");
            }
            debug!(frames = self.frames, "video: exhausted");
            return Ok(None);
        }

        self.frames += 1;
        let img = RgbImage::from_raw(self.width, self.height, buf)
            .ok_or_else(|| InputError::VideoRead { frames: self.frames, reason: "frame buffer size mismatch".into() })?;
        Ok(Some(img))
    }

    async fn release(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
            debug!(path = %self.path.display(), frames = self.frames, "video: released");
        }
    }
}

/// ffmpeg arguments that emit `v:0` as unrotated `w x h` RGB24 frames on stdout.
fn decoder_args(path: &Path, w: u32, h: u32) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-nostdin", "-noautorotate", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_owned());
    args.extend(
        ["-map", "0:v:0", "-an", "-vf", &format!("scale={w}:{h}"), "-pix_fmt", "rgb24", "-f", "rawvideo", "-"]
            .into_iter()
            .map(OsString::from),
    );
    args
}

async fn probe_dims(ffprobe: &Tool, path: &Path) -> Result<(u32, u32), String> {
    // ffprobe -v error -select_streams v:0 -show_entries stream=width,height -of csv=p=0:s=x <path>
    let mut cmd = ffprobe.command();
    cmd.args([
        "-v", "error",
        "-select_streams", "v:0",
        "-show_entries", "stream=width,height",
        "-of", "csv=p=0:s=x",
    ])
    .arg(path)
    .stdin(Stdio::null());

    debug!("video: ffprobe {}", path.display());
    let out = cmd.output().await.map_err(|e| format!("run ffprobe: {e}"))?;
    if !out.status.success() {
        return Err(format!("ffprobe failed: {}", String::from_utf8_lossy(&out.stderr).trim()));
    }
    parse_probe_dims(&String::from_utf8_lossy(&out.stdout))
        .ok_or_else(|| "no video stream found".to_string())
}

/// Parses ffprobe's `WxH` csv line.
fn parse_probe_dims(s: &str) -> Option<(u32, u32)> {
    let line = s.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (w, h) = line.split_once('x')?;
    let w: u32 = w.trim().parse().ok()?;
    let h: u32 = h.trim().trim_end_matches('x').parse().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_output_parsing() {
        assert_eq!(parse_probe_dims("1920x1080\n"), Some((1920, 1080)));
        assert_eq!(parse_probe_dims("\n640x480x\n"), Some((640, 480)));
        assert_eq!(parse_probe_dims(""), None);
        assert_eq!(parse_probe_dims("0x480"), None);
        assert_eq!(parse_probe_dims("N/AxN/A"), None);
    }

    #[test]
    fn decoder_is_pinned_to_probed_geometry() {
        let args: Vec<String> = decoder_args(Path::new("pool.mp4"), 1280, 720)
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let at = |flag: &str| args.iter().position(|a| a == flag).unwrap();

        // input option, must precede -i
        assert!(at("-noautorotate") < at("-i"));
        assert_eq!(args[at("-i") + 1], "pool.mp4");
        assert_eq!(args[at("-map") + 1], "0:v:0");
        assert_eq!(args[at("-vf") + 1], "scale=1280:720");
        assert_eq!(args[at("-pix_fmt") + 1], "rgb24");
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[tokio::test]
    async fn missing_file_fails_to_open() {
        let err = FfmpegVideo::open(Path::new("/nonexistent/clip.mp4")).await.err().unwrap();
        assert!(matches!(err, InputError::VideoOpen { .. }));
    }

    #[cfg(unix)]
    mod stand_in {
        use super::*;
        use tempfile::TempDir;

        /// `sh -c <script>`; the real tool arguments arrive as `$1..`.
        fn sh(script: &str) -> Tool {
            Tool { program: "sh".into(), lead: vec!["-c".into(), script.into(), "sh".into()] }
        }

        fn clip() -> (TempDir, PathBuf) {
            let dir = TempDir::new().unwrap();
            let p = dir.path().join("clip.mp4");
            std::fs::write(&p, b"not really a video").unwrap();
            (dir, p)
        }

        async fn open(probe: &str, decode: &str, path: &Path) -> Result<FfmpegVideo, InputError> {
            FfmpegVideo::open_with(&sh(probe), &sh(decode), path).await
        }

        #[tokio::test]
        async fn frames_keep_probed_layout() {
            let (_dir, p) = clip();
            // emits one 4x2 frame with bytes 0..24, only when the output geometry is pinned
            let bytes: String = (0..24u8).map(|b| format!("\\{b:03o}")).collect();
            let decode = format!(
                r#"case "$*" in *"-noautorotate -i "*"-map 0:v:0"*"-vf scale=4:2"*) printf '{bytes}' ;; *) exit 1 ;; esac"#
            );
            let mut v = open("echo 4x2", &decode, &p).await.unwrap();
            assert_eq!(v.dimensions(), (4, 2));

            let frame = v.next_frame().await.unwrap().unwrap();
            assert_eq!(frame.dimensions(), (4, 2));
            assert_eq!(frame.get_pixel(0, 0).0, [0, 1, 2]);
            assert_eq!(frame.get_pixel(3, 0).0, [9, 10, 11]);
            assert_eq!(frame.get_pixel(0, 1).0, [12, 13, 14]);
            assert!(v.next_frame().await.unwrap().is_none());
            v.release().await;
        }

        #[tokio::test]
        async fn truncated_final_frame_is_dropped() {
            let (_dir, p) = clip();
            // 2x2 frames are 12 bytes: two whole frames then 5 stray bytes
            let mut v = open("echo 2x2", "head -c 29 /dev/zero", &p).await.unwrap();
            assert!(v.next_frame().await.unwrap().is_some());
            assert!(v.next_frame().await.unwrap().is_some());
            assert!(v.next_frame().await.unwrap().is_none());
            // exhausted stays exhausted
            assert!(v.next_frame().await.unwrap().is_none());
            v.release().await;
        }

        #[tokio::test]
        async fn decoder_failure_before_first_frame_is_a_read_error() {
            let (_dir, p) = clip();
            let mut v = open("echo 2x2", "exit 1", &p).await.unwrap();
            let err = v.next_frame().await.unwrap_err();
            assert!(matches!(err, InputError::VideoRead { frames: 0, .. }));
            v.release().await;
        }

        #[tokio::test]
        async fn decoder_failure_after_frames_ends_the_stream() {
            let (_dir, p) = clip();
            let mut v = open("echo 2x2", "head -c 12 /dev/zero; exit 1", &p).await.unwrap();
            assert!(v.next_frame().await.unwrap().is_some());
            assert!(v.next_frame().await.unwrap().is_none());
            v.release().await;
        }

        #[tokio::test]
        async fn probe_failure_fails_to_open() {
            let (_dir, p) = clip();
            let err = open("echo boom >&2; exit 1", "exit 0", &p).await.err().unwrap();
            match err {
                InputError::VideoOpen { reason, .. } => assert!(reason.contains("boom")),
                other => panic!("unexpected {other:?}"),
            }
        }
    }
}
