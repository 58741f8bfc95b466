//! Free-text destination search (Nominatim-compatible)

use crate::domain::error::GeocodeError;
use crate::domain::types::Position;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

/// A resolved search hit
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub name: String,
    pub position: Position,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// First match for `query`
    async fn search(&self, query: &str) -> Result<Place, GeocodeError>;
}

/// Nominatim returns coordinates as strings
#[derive(Debug, Deserialize)]
struct NominatimHit {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

/// Pick the first usable hit from a `/search?format=json` body
pub fn parse_nominatim(body: &str) -> Result<Place, GeocodeError> {
    let hits: Vec<NominatimHit> = serde_json::from_str(body)
        .map_err(|e| GeocodeError::ProviderUnavailable(format!("bad response: {e}")))?;

    hits.into_iter()
        .find_map(|hit| {
            let lat = hit.lat.parse::<f64>().ok()?;
            let lng = hit.lon.parse::<f64>().ok()?;
            let position = Position::new(lat, lng);
            position.is_valid().then_some(Place { name: hit.display_name, position })
        })
        .ok_or(GeocodeError::NotFound)
}

pub struct NominatimGeocoder {
    base_url: String,
    http: reqwest::Client,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        // Nominatim's usage policy requires an identifying user agent
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hazard-nav/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), http })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn search(&self, query: &str) -> Result<Place, GeocodeError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(GeocodeError::NotFound);
        }

        let response = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| GeocodeError::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::ProviderUnavailable(format!("HTTP {}", status.as_u16())));
        }

        let body = response.text().await.map_err(|e| GeocodeError::ProviderUnavailable(e.to_string()))?;
        let place = parse_nominatim(&body)?;
        info!(query = %query, name = %place.name, position = %place.position, "geocode_resolved");
        Ok(place)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_first_hit() {
        let body = r#"[
            {"lat": "13.0604", "lon": "80.2496", "display_name": "Chennai Central"},
            {"lat": "12.9", "lon": "80.1", "display_name": "Elsewhere"}
        ]"#;
        let place = parse_nominatim(body).unwrap();
        assert_eq!(place.name, "Chennai Central");
        assert_eq!(place.position.latitude, 13.0604);
        assert_eq!(place.position.longitude, 80.2496);
    }

    #[test]
    fn test_skips_unparseable_hits() {
        let body = r#"[{"lat": "north", "lon": "80.1"}, {"lat": "13.0", "lon": "80.0"}]"#;
        assert_eq!(parse_nominatim(body).unwrap().position.latitude, 13.0);
    }

    #[test]
    fn test_empty_result_is_not_found() {
        assert_eq!(parse_nominatim("[]"), Err(GeocodeError::NotFound));
        assert!(matches!(parse_nominatim("{}"), Err(GeocodeError::ProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn test_blank_query_is_not_found() {
        let geocoder = NominatimGeocoder::new("http://127.0.0.1:9", Duration::from_millis(50)).unwrap();
        assert_eq!(geocoder.search("   ").await, Err(GeocodeError::NotFound));
    }
}
