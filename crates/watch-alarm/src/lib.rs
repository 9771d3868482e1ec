pub mod cooldown;
pub mod doctor;
pub mod player;

use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::info;

pub use cooldown::{maybe_alarm, AlarmState, DEFAULT_COOLDOWN};
pub use player::SoundPlayer;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    pub cooldown_s: f64,
    pub sound_path: String,
    /// Player program; `None` picks a platform default (aplay / afplay).
    pub player: Option<String>,
    /// Extra arguments placed before the sound path.
    pub player_args: Vec<String>,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            cooldown_s: DEFAULT_COOLDOWN.as_secs_f64(),
            sound_path: "sound/alarm.wav".into(),
            player: None,
            player_args: Vec::new(),
        }
    }
}

impl AlarmConfig {
    pub fn cooldown(&self) -> anyhow::Result<Duration> {
        Duration::try_from_secs_f64(self.cooldown_s)
            .map_err(|_| anyhow::anyhow!("alarm.cooldown_s must be a finite value >= 0, got {}", self.cooldown_s))
    }
}

/// Something that raises an audible alert. `trigger` must return immediately;
/// any work it starts is detached and its failure is never reported back.
pub trait AlertSink {
    fn trigger(&self);
}

/// Owns the single live `AlarmState` and forwards fires to the sink.
pub struct AlarmDispatcher<S: AlertSink> {
    state: AlarmState,
    sink: S,
    fired: u64,
}

impl<S: AlertSink> AlarmDispatcher<S> {
    pub fn new(cooldown: Duration, sink: S) -> Self {
        Self { state: AlarmState::new(cooldown), sink, fired: 0 }
    }

    /// Applies the cooldown gate for one frame; returns whether the alert was dispatched.
    pub fn observe(&mut self, has_drowning: bool, now: Instant) -> bool {
        let (fires, next) = maybe_alarm(has_drowning, now, self.state);
        self.state = next;
        if fires {
            self.fired += 1;
            info!(count = self.fired, "alarm: drowning alert dispatched");
            self.sink.trigger();
        }
        fires
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    pub fn fired(&self) -> u64 {
        self.fired
    }
}
