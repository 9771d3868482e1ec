use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Frame,
    Alarm,
    Summary,
}

/// Per-class detection counts for one frame (or a whole run in a summary).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub drowning: u32,
    pub swimming: u32,
    pub out_of_water: u32,
    pub unknown: u32,
}

impl ClassCounts {
    pub fn add(&mut self, other: &ClassCounts) {
        self.drowning += other.drowning;
        self.swimming += other.swimming;
        self.out_of_water += other.out_of_water;
        self.unknown += other.unknown;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    pub ts_unix_ms: i64,
    pub kind: EventKind,
    pub source: String,
    pub frame_index: u64,
    pub counts: ClassCounts,
    pub msg: String,
}

impl WatchEvent {
    pub fn now(kind: EventKind, source: &str, frame_index: u64, counts: ClassCounts, msg: impl Into<String>) -> Self {
        Self {
            ts_unix_ms: (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64,
            kind,
            source: source.to_string(),
            frame_index,
            counts,
            msg: msg.into(),
        }
    }

    /// One JSON object terminated by `\n`.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        let mut s = serde_json::to_string(self)?;
        s.push('\n');
        Ok(s)
    }
}
