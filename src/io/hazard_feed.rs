//! Hazard feed client
//!
//! The backend serves a JSON array of `{lat, lng, type, message}` objects.
//! Optional `id` and `radius` (metres) fields are honoured when present.
//! Entries that fail to parse or carry impossible coordinates are skipped;
//! only a body that is not a JSON array at all is treated as malformed.

use crate::domain::error::HazardFeedError;
use crate::domain::types::{Hazard, HazardId, HazardKind, Position};
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One hazard entry in feed shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardRecord {
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
}

impl HazardRecord {
    /// Convert to a hazard, None if the entry is unusable
    pub fn to_hazard(&self, loaded_at: Instant) -> Option<Hazard> {
        let location = Position::at(self.lat, self.lng, loaded_at);
        if !location.is_valid() {
            return None;
        }

        let radius_m = self.radius.unwrap_or(0.0);
        if !radius_m.is_finite() || radius_m < 0.0 {
            return None;
        }

        if self.kind.trim().is_empty() {
            return None;
        }
        let kind = HazardKind::from_label(&self.kind);

        // Stable across reloads so cooldown state carries over
        let id = match self.explicit_id() {
            Some(id) => HazardId(id.to_string()),
            None => HazardId(format!("{}@{:.5},{:.5}", kind.as_str(), self.lat, self.lng)),
        };

        Some(Hazard { id, kind, location, radius_m, message: self.message.clone() })
    }

    fn explicit_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Result of parsing one feed body
#[derive(Debug, Clone, Default)]
pub struct FeedBatch {
    pub hazards: Vec<Hazard>,
    pub skipped: usize,
}

impl FeedBatch {
    /// Build from already-typed records (static config entries)
    pub fn from_records(records: &[HazardRecord]) -> Self {
        Self::collect(records.iter().cloned().map(Some))
    }

    /// Convert records in order. `None` marks an entry that failed to parse.
    ///
    /// Derived ids that collide within the batch get an ordinal suffix
    /// (`kind@lat,lng#2`), so co-located entries of the same kind all stay
    /// indexed. A repeated explicit id is a real duplicate and is skipped.
    fn collect(records: impl IntoIterator<Item = Option<HazardRecord>>) -> Self {
        let loaded_at = Instant::now();
        let mut batch = FeedBatch::default();
        let mut seen: FxHashMap<HazardId, u32> = FxHashMap::default();

        for (idx, record) in records.into_iter().enumerate() {
            let Some((record, mut hazard)) =
                record.and_then(|r| r.to_hazard(loaded_at).map(|h| (r, h)))
            else {
                debug!(index = %idx, "hazard_entry_skipped");
                batch.skipped += 1;
                continue;
            };

            let occurrences = seen.entry(hazard.id.clone()).or_insert(0);
            *occurrences += 1;
            if *occurrences > 1 {
                if record.explicit_id().is_some() {
                    debug!(index = %idx, hazard_id = %hazard.id, "hazard_entry_duplicate_id");
                    batch.skipped += 1;
                    continue;
                }
                hazard.id = HazardId(format!("{}#{}", hazard.id, occurrences));
            }
            batch.hazards.push(hazard);
        }

        batch
    }
}

/// Parse a feed body, skipping malformed entries
pub fn parse_feed(body: &str) -> Result<FeedBatch, HazardFeedError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| HazardFeedError::Malformed(e.to_string()))?;

    let serde_json::Value::Array(entries) = value else {
        return Err(HazardFeedError::Malformed("expected a JSON array".to_string()));
    };

    Ok(FeedBatch::collect(
        entries.into_iter().map(|entry| serde_json::from_value::<HazardRecord>(entry).ok()),
    ))
}

/// Anything that can produce a batch of hazards
#[async_trait]
pub trait HazardSource: Send + Sync {
    async fn fetch(&self) -> Result<FeedBatch, HazardFeedError>;
}

/// HTTP hazard feed
pub struct HazardFeedClient {
    url: String,
    http: reqwest::Client,
}

impl HazardFeedClient {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url: url.to_string(), http })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HazardSource for HazardFeedClient {
    async fn fetch(&self) -> Result<FeedBatch, HazardFeedError> {
        let start = Instant::now();

        let response = self
            .http
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| HazardFeedError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HazardFeedError::Unreachable(format!("HTTP {}", status.as_u16())));
        }

        let body = response.text().await.map_err(|e| HazardFeedError::Unreachable(e.to_string()))?;
        let batch = parse_feed(&body)?;

        if batch.skipped > 0 {
            warn!(url = %self.url, skipped = %batch.skipped, "hazard_feed_entries_skipped");
        }
        info!(
            url = %self.url,
            hazards = %batch.hazards.len(),
            latency_ms = %start.elapsed().as_millis(),
            "hazard_feed_fetched"
        );

        Ok(batch)
    }
}

/// Fixed hazard list, used for config-only setups and tests
pub struct StaticHazardSource {
    records: Vec<HazardRecord>,
}

impl StaticHazardSource {
    pub fn new(records: Vec<HazardRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl HazardSource for StaticHazardSource {
    async fn fetch(&self) -> Result<FeedBatch, HazardFeedError> {
        Ok(FeedBatch::from_records(&self.records))
    }
}
