//! Sink journal - appends every sink event to a JSONL file
//!
//! The session never touches the file. It talks to a `ChannelSink`; a
//! writer task drains the channel and appends one JSON object per line.

use crate::io::sink::{create_sink_channel, ChannelSink, SinkEvent};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

pub struct Journal {
    file_path: String,
}

impl Journal {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "journal_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Append one event. Returns false when serialization or the write failed.
    pub fn write_event(&self, event: &SinkEvent) -> bool {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                error!(event = %event.as_str(), error = %e, "journal_serialize_failed");
                return false;
            }
        };

        match self.append_line(&json) {
            Ok(()) => true,
            Err(e) => {
                error!(event = %event.as_str(), error = %e, "journal_write_failed");
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "journal_written");
        Ok(())
    }

    /// Drain events until every sender is gone
    pub async fn run(self, mut rx: mpsc::Receiver<SinkEvent>) {
        let mut written = 0u64;
        while let Some(event) = rx.recv().await {
            if self.write_event(&event) {
                written += 1;
            }
        }
        info!(file = %self.file_path, written = %written, "journal_closed");
    }
}

/// Spawn a journal writer and return the sink that feeds it
pub fn spawn_journal_sink(file_path: &str, buffer_size: usize) -> ChannelSink {
    let (sink, rx) = create_sink_channel(buffer_size);
    let journal = Journal::new(file_path);
    tokio::spawn(journal.run(rx));
    sink
}
