use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use watch_proto::WatchEvent;

/// Optional JSON-lines trace of frames and alarms. Write failures never stop the loop.
#[derive(Default)]
pub struct EventLog {
    file: Option<File>,
}

impl EventLog {
    pub fn disabled() -> Self {
        Self { file: None }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open event log {}", path.display()))?;
        Ok(Self { file: Some(file) })
    }

    pub fn record(&mut self, ev: &WatchEvent) {
        let Some(f) = self.file.as_mut() else { return };
        let res = ev
            .to_json_line()
            .map_err(anyhow::Error::from)
            .and_then(|line| f.write_all(line.as_bytes()).map_err(anyhow::Error::from));
        if let Err(e) = res {
            warn!("event log write failed: {:#}", e);
        }
    }
}
