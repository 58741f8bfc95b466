//! Position sources and the GeoClock subscription front-end
//!
//! A `LocationSource` is the raw sensor: it yields fixes or errors at
//! whatever pace the provider chooses. `GeoClock` turns a source into a
//! subscription stream, in one-shot or continuous mode, and releases the
//! source when the subscription ends or is unsubscribed.

use crate::domain::error::LocationError;
use crate::domain::types::Position;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub type Fix = Result<Position, LocationError>;

/// Raw position provider. `None` means the provider is exhausted.
#[async_trait]
pub trait LocationSource: Send {
    async fn next_fix(&mut self) -> Option<Fix>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeMode {
    /// Single fix (or error), then the subscription ends
    OneShot,
    /// Fixes until unsubscribed or the source runs dry
    Continuous,
}

/// Receiving end of a subscription
pub struct FixStream {
    rx: mpsc::Receiver<Fix>,
}

impl FixStream {
    pub async fn recv(&mut self) -> Option<Fix> {
        self.rx.recv().await
    }
}

/// Subscription front-end over a single location source
pub struct GeoClock {
    source: Option<Box<dyn LocationSource>>,
    one_shot_timeout: Duration,
    stop_tx: Option<watch::Sender<bool>>,
}

impl GeoClock {
    pub fn new(source: Box<dyn LocationSource>, one_shot_timeout: Duration) -> Self {
        Self { source: Some(source), one_shot_timeout, stop_tx: None }
    }

    /// Start delivering fixes. The source moves into a pump task, so a clock
    /// supports one subscription; later calls get an `Unavailable` stream.
    pub fn subscribe(&mut self, mode: SubscribeMode) -> FixStream {
        let (tx, rx) = mpsc::channel(64);

        let Some(mut source) = self.source.take() else {
            warn!("geoclock_already_subscribed");
            let _ = tx.try_send(Err(LocationError::Unavailable));
            return FixStream { rx };
        };

        let (stop_tx, mut stop_rx) = watch::channel(false);
        self.stop_tx = Some(stop_tx);
        let timeout = self.one_shot_timeout;

        tokio::spawn(async move {
            info!(mode = ?mode, "geoclock_subscribed");
            match mode {
                SubscribeMode::OneShot => {
                    let fix = tokio::select! {
                        result = tokio::time::timeout(timeout, source.next_fix()) => match result {
                            Ok(Some(fix)) => fix,
                            Ok(None) => Err(LocationError::Unavailable),
                            Err(_) => Err(LocationError::Timeout),
                        },
                        _ = stop_rx.changed() => {
                            debug!("geoclock_one_shot_cancelled");
                            return;
                        }
                    };
                    let _ = tx.send(fix).await;
                }
                SubscribeMode::Continuous => loop {
                    tokio::select! {
                        fix = source.next_fix() => match fix {
                            Some(fix) => {
                                if tx.send(fix).await.is_err() {
                                    break;
                                }
                            }
                            None => {
                                debug!("geoclock_source_exhausted");
                                break;
                            }
                        },
                        _ = stop_rx.changed() => break,
                    }
                },
            }
            // Source dropped here, releasing the sensor
            info!("geoclock_released");
        });

        FixStream { rx }
    }

    /// Stop delivery and release the source. Idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        self.source = None;
    }
}

impl Drop for GeoClock {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// One line of a replay file
#[derive(Debug, Deserialize)]
struct ReplayLine {
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lng: Option<f64>,
    /// Wait before delivering this line
    #[serde(default)]
    delay_ms: u64,
    #[serde(default)]
    error: Option<String>,
}

/// Replays fixes from a JSONL file, pacing by each line's `delay_ms`
pub struct ReplaySource {
    lines: Lines<BufReader<tokio::fs::File>>,
    path: String,
}

impl ReplaySource {
    pub async fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        use anyhow::Context;
        let path = path.as_ref();
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open replay file {}", path.display()))?;
        Ok(Self { lines: BufReader::new(file).lines(), path: path.display().to_string() })
    }

    fn parse_line(line: &str) -> Option<(u64, Fix)> {
        let parsed: ReplayLine = serde_json::from_str(line).ok()?;
        if let Some(error) = parsed.error {
            let error = error.parse::<LocationError>().unwrap_or(LocationError::Unavailable);
            return Some((parsed.delay_ms, Err(error)));
        }
        let (lat, lng) = (parsed.lat?, parsed.lng?);
        Some((parsed.delay_ms, Ok(Position::new(lat, lng))))
    }
}

#[async_trait]
impl LocationSource for ReplaySource {
    async fn next_fix(&mut self) -> Option<Fix> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    warn!(file = %self.path, error = %e, "replay_read_error");
                    return None;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match Self::parse_line(&line) {
                Some((delay_ms, fix)) => {
                    if delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                    // Stamp at delivery, not at parse
                    return Some(fix.map(|p| Position::new(p.latitude, p.longitude)));
                }
                None => warn!(file = %self.path, line = %line, "replay_line_skipped"),
            }
        }
    }
}

/// Source fed by an mpsc sender, for embedding UIs and tests
pub struct ChannelSource {
    rx: mpsc::Receiver<Fix>,
}

impl ChannelSource {
    pub fn new(buffer: usize) -> (mpsc::Sender<Fix>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }
}

#[async_trait]
impl LocationSource for ChannelSource {
    async fn next_fix(&mut self) -> Option<Fix> {
        self.rx.recv().await
    }
}
