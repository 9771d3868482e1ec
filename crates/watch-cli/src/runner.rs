use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use image::RgbImage;
use tokio::sync::watch;
use tracing::{info, warn};

use watch_alarm::{AlarmDispatcher, AlertSink};
use watch_media::{Display, DisplayEvent, FrameSource, InputError, MediaBackend, MediaKind};
use watch_proto::{ClassCounts, EventKind, WatchEvent};
use watch_vision::{annotate, Classification, Detection, Detector};

use crate::events::EventLog;

pub const UNSUPPORTED_MSG: &str = "Unsupported file format. Please provide an image or video file.";

/// How one invocation ended. Input errors end the run gracefully, they are not `Err`.
#[derive(Debug)]
pub enum Outcome {
    InputFailed(InputError),
    Image { drowning: bool },
    Video { frames: u64, stopped: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Running,
    Stopping,
    Done,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameResult {
    pub counts: ClassCounts,
    pub has_drowning: bool,
    pub alarm_fired: bool,
}

/// Detector → classifier → annotator → alarm, one frame at a time.
pub struct Pipeline<S: AlertSink> {
    detector: Box<dyn Detector>,
    alarm: AlarmDispatcher<S>,
    events: EventLog,
    source: String,
}

impl<S: AlertSink> Pipeline<S> {
    pub fn new(detector: Box<dyn Detector>, alarm: AlarmDispatcher<S>, events: EventLog) -> Self {
        Self { detector, alarm, events, source: String::new() }
    }

    pub fn alarms_fired(&self) -> u64 {
        self.alarm.fired()
    }

    /// Annotates `frame` in place and runs the alarm gate with `now`.
    pub fn process(&mut self, frame: &mut RgbImage, frame_index: u64, now: Instant) -> FrameResult {
        let dets = self.detector.detect(frame).unwrap_or_else(|e| {
            warn!(frame = frame_index, "detector failed, treating frame as empty: {:#}", e);
            Vec::new()
        });

        let items: Vec<(Detection, Classification)> = dets
            .into_iter()
            .map(|d| {
                let c = d.classify();
                (d, c)
            })
            .collect();

        let mut counts = ClassCounts::default();
        for (_, c) in &items {
            match c {
                Classification::Drowning => counts.drowning += 1,
                Classification::Swimming => counts.swimming += 1,
                Classification::OutOfWater => counts.out_of_water += 1,
                Classification::Unknown => counts.unknown += 1,
            }
        }

        annotate(frame, &items);

        let has_drowning = counts.drowning > 0;
        let alarm_fired = self.alarm.observe(has_drowning, now);

        if counts.drowning + counts.swimming + counts.out_of_water > 0 {
            self.events.record(&WatchEvent::now(EventKind::Frame, &self.source, frame_index, counts, ""));
        }
        if alarm_fired {
            self.events.record(&WatchEvent::now(EventKind::Alarm, &self.source, frame_index, counts, "alarm dispatched"));
        }

        FrameResult { counts, has_drowning, alarm_fired }
    }
}

/// Picks image or video mode by extension. Unsupported inputs are reported here,
/// before any model, source or display exists.
pub fn route(path: &Path) -> Option<MediaKind> {
    let kind = MediaKind::from_path(path);
    if kind.is_none() {
        println!("{UNSUPPORTED_MSG}");
    }
    kind
}

/// Runs the loop for an already routed source.
pub async fn run_source<B, S>(
    backend: &B,
    pipeline: &mut Pipeline<S>,
    kind: MediaKind,
    path: &Path,
    stop: &watch::Receiver<bool>,
) -> Result<Outcome>
where
    B: MediaBackend,
    S: AlertSink,
{
    pipeline.source = path.display().to_string();

    match kind {
        MediaKind::Image => run_image(backend, pipeline, path, stop).await,
        MediaKind::Video => run_video(backend, pipeline, path, stop).await,
    }
}

async fn run_image<B: MediaBackend, S: AlertSink>(
    backend: &B,
    pipeline: &mut Pipeline<S>,
    path: &Path,
    stop: &watch::Receiver<bool>,
) -> Result<Outcome> {
    let mut frame = match backend.load_image(path).await {
        Ok(f) => f,
        Err(e) => {
            println!("Error: Unable to load image. ({e})");
            return Ok(Outcome::InputFailed(e));
        }
    };

    let res = pipeline.process(&mut frame, 0, Instant::now());
    if res.has_drowning {
        println!("Drowning detected in the image!");
    } else {
        println!("No drowning detected in the image.");
    }
    pipeline.events.record(&WatchEvent::now(
        EventKind::Summary,
        &pipeline.source,
        1,
        res.counts,
        if res.has_drowning { "drowning detected" } else { "no drowning detected" },
    ));

    let mut display = backend.open_display(MediaKind::Image, path).await?;
    let shown = show_still(&mut display, &frame, stop).await;
    display.close().await;
    shown?;

    Ok(Outcome::Image { drowning: res.has_drowning })
}

/// Shows the still until the operator dismisses it or asks to stop.
async fn show_still<D: Display>(display: &mut D, frame: &RgbImage, stop: &watch::Receiver<bool>) -> Result<()> {
    display.show(frame).await?;
    let mut stop = stop.clone();
    tokio::select! {
        res = display.wait_dismissed() => res,
        _ = stop_requested(&mut stop) => {
            info!("image: stop requested");
            Ok(())
        }
    }
}

/// Resolves once stop is signalled; never, if every sender is gone first.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn run_video<B: MediaBackend, S: AlertSink>(
    backend: &B,
    pipeline: &mut Pipeline<S>,
    path: &Path,
    stop: &watch::Receiver<bool>,
) -> Result<Outcome> {
    let mut source = match backend.open_video(path).await {
        Ok(s) => s,
        Err(e) => {
            println!("Error: Unable to open video. ({e})");
            return Ok(Outcome::InputFailed(e));
        }
    };
    let mut display = match backend.open_display(MediaKind::Video, path).await {
        Ok(d) => d,
        Err(e) => {
            source.release().await;
            return Err(e);
        }
    };

    let result = video_loop(&mut source, &mut display, pipeline, stop).await;

    source.release().await;
    display.close().await;
    result
}

async fn video_loop<V, D, S>(
    source: &mut V,
    display: &mut D,
    pipeline: &mut Pipeline<S>,
    stop: &watch::Receiver<bool>,
) -> Result<Outcome>
where
    V: FrameSource,
    D: Display,
    S: AlertSink,
{
    let mut state = LoopState::Running;
    let mut frames = 0u64;
    let mut stopped = false;
    let mut totals = ClassCounts::default();

    while state != LoopState::Done {
        if state == LoopState::Stopping {
            info!(frames, "video: stop requested");
            stopped = true;
            state = LoopState::Done;
            continue;
        }

        let mut frame = match source.next_frame().await {
            Ok(Some(f)) => f,
            Ok(None) => {
                state = LoopState::Done;
                continue;
            }
            Err(e) => {
                println!("Error: {e}");
                return Ok(Outcome::InputFailed(e));
            }
        };

        let res = pipeline.process(&mut frame, frames, Instant::now());
        frames += 1;
        totals.add(&res.counts);
        if res.has_drowning {
            println!("Drowning detected in current frame.");
        }

        let ev = display.show(&frame).await?;
        if ev == DisplayEvent::Quit || *stop.borrow() {
            state = LoopState::Stopping;
        }
    }

    let alarms = pipeline.alarms_fired();
    info!(frames, alarms, stopped, "video: done");
    pipeline.events.record(&WatchEvent::now(
        EventKind::Summary,
        &pipeline.source,
        frames,
        totals,
        format!("alarms={alarms} stopped={stopped}"),
    ));
    Ok(Outcome::Video { frames, stopped })
}
