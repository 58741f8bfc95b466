//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::io::hazard_feed::HazardRecord;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct MapConfig {
    /// Initial map center [lat, lng] before the first fix arrives
    #[serde(default = "default_center")]
    pub default_center: [f64; 2],
}

impl Default for MapConfig {
    fn default() -> Self {
        Self { default_center: default_center() }
    }
}

fn default_center() -> [f64; 2] {
    [13.0827, 80.2707]
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    /// JSONL file of fixes to replay (empty disables)
    #[serde(default)]
    pub replay_file: String,
    #[serde(default = "default_one_shot_timeout_ms")]
    pub one_shot_timeout_ms: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self { replay_file: String::new(), one_shot_timeout_ms: default_one_shot_timeout_ms() }
    }
}

fn default_one_shot_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct HazardsConfig {
    /// HTTP feed returning `[{lat, lng, type, message}]` (empty disables)
    #[serde(default = "default_feed_url")]
    pub feed_url: String,
    #[serde(default = "default_feed_timeout_ms")]
    pub feed_timeout_ms: u64,
    /// Periodic feed reload (0 disables)
    #[serde(default)]
    pub refresh_secs: u64,
    #[serde(default = "default_point_trigger_radius_m")]
    pub point_trigger_radius_m: f64,
    #[serde(default = "default_jitter_margin_m")]
    pub jitter_margin_m: f64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Hazards loaded at startup, same shape as feed entries
    #[serde(default, rename = "static")]
    pub static_hazards: Vec<HazardRecord>,
}

impl Default for HazardsConfig {
    fn default() -> Self {
        Self {
            feed_url: default_feed_url(),
            feed_timeout_ms: default_feed_timeout_ms(),
            refresh_secs: 0,
            point_trigger_radius_m: default_point_trigger_radius_m(),
            jitter_margin_m: default_jitter_margin_m(),
            cooldown_secs: default_cooldown_secs(),
            static_hazards: Vec::new(),
        }
    }
}

fn default_feed_url() -> String {
    "http://localhost:5000/alerts".to_string()
}

fn default_feed_timeout_ms() -> u64 {
    3000
}

fn default_point_trigger_radius_m() -> f64 {
    50.0
}

fn default_jitter_margin_m() -> f64 {
    25.0
}

fn default_cooldown_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// OSRM-compatible base URL
    #[serde(default = "default_routing_url")]
    pub provider_url: String,
    #[serde(default = "default_routing_profile")]
    pub profile: String,
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            provider_url: default_routing_url(),
            profile: default_routing_profile(),
            timeout_ms: default_provider_timeout_ms(),
        }
    }
}

fn default_routing_url() -> String {
    "https://router.project-osrm.org".to_string()
}

fn default_routing_profile() -> String {
    "driving".to_string()
}

fn default_provider_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingConfig {
    /// Nominatim-compatible base URL
    #[serde(default = "default_geocoding_url")]
    pub url: String,
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self { url: default_geocoding_url(), timeout_ms: default_provider_timeout_ms() }
    }
}

fn default_geocoding_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuidanceConfig {
    /// Spacing between consecutive narrated instructions
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_voice_enabled")]
    pub voice_enabled: bool,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self { interval_ms: default_interval_ms(), voice_enabled: default_voice_enabled() }
    }
}

fn default_interval_ms() -> u64 {
    4000
}

fn default_voice_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
    /// Metrics HTTP port (0 to disable)
    #[serde(default)]
    pub http_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs(), http_port: 0 }
    }
}

fn default_metrics_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct JournalConfig {
    /// JSONL journal of sink events (empty disables)
    #[serde(default)]
    pub file: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub hazards: HazardsConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    #[serde(default)]
    pub guidance: GuidanceConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub journal: JournalConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    default_center: [f64; 2],
    replay_file: String,
    one_shot_timeout_ms: u64,
    hazard_feed_url: String,
    hazard_feed_timeout_ms: u64,
    hazard_refresh_secs: u64,
    point_trigger_radius_m: f64,
    jitter_margin_m: f64,
    cooldown_secs: u64,
    static_hazards: Vec<HazardRecord>,
    routing_url: String,
    routing_profile: String,
    routing_timeout_ms: u64,
    geocoding_url: String,
    geocoding_timeout_ms: u64,
    guidance_interval_ms: u64,
    voice_enabled: bool,
    metrics_interval_secs: u64,
    metrics_http_port: u16,
    journal_file: String,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            default_center: toml_config.map.default_center,
            replay_file: toml_config.location.replay_file,
            one_shot_timeout_ms: toml_config.location.one_shot_timeout_ms,
            hazard_feed_url: toml_config.hazards.feed_url,
            hazard_feed_timeout_ms: toml_config.hazards.feed_timeout_ms,
            hazard_refresh_secs: toml_config.hazards.refresh_secs,
            point_trigger_radius_m: toml_config.hazards.point_trigger_radius_m,
            jitter_margin_m: toml_config.hazards.jitter_margin_m,
            cooldown_secs: toml_config.hazards.cooldown_secs,
            static_hazards: toml_config.hazards.static_hazards,
            routing_url: toml_config.routing.provider_url,
            routing_profile: toml_config.routing.profile,
            routing_timeout_ms: toml_config.routing.timeout_ms,
            geocoding_url: toml_config.geocoding.url,
            geocoding_timeout_ms: toml_config.geocoding.timeout_ms,
            guidance_interval_ms: toml_config.guidance.interval_ms,
            voice_enabled: toml_config.guidance.voice_enabled,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            metrics_http_port: toml_config.metrics.http_port,
            journal_file: toml_config.journal.file,
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let config = Self::from_toml(toml_config, path.display().to_string());
        config.validate().with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.guidance_interval_ms > 0, "guidance.interval_ms must be > 0");
        anyhow::ensure!(
            self.point_trigger_radius_m > 0.0,
            "hazards.point_trigger_radius_m must be > 0"
        );
        anyhow::ensure!(self.jitter_margin_m >= 0.0, "hazards.jitter_margin_m must be >= 0");
        anyhow::ensure!(self.metrics_interval_secs > 0, "metrics.interval_secs must be > 0");
        Ok(())
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    /// Load from an explicit path, falling back to defaults on any error
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "config_fallback_to_defaults");
                Self::default()
            }
        }
    }

    pub fn default_center(&self) -> [f64; 2] {
        self.default_center
    }

    /// Replay file path, None when unset
    pub fn replay_file(&self) -> Option<&str> {
        (!self.replay_file.is_empty()).then_some(self.replay_file.as_str())
    }

    pub fn one_shot_timeout(&self) -> Duration {
        Duration::from_millis(self.one_shot_timeout_ms)
    }

    /// Hazard feed URL, None when unset
    pub fn hazard_feed_url(&self) -> Option<&str> {
        (!self.hazard_feed_url.is_empty()).then_some(self.hazard_feed_url.as_str())
    }

    pub fn hazard_feed_timeout(&self) -> Duration {
        Duration::from_millis(self.hazard_feed_timeout_ms)
    }

    pub fn hazard_refresh_secs(&self) -> u64 {
        self.hazard_refresh_secs
    }

    pub fn point_trigger_radius_m(&self) -> f64 {
        self.point_trigger_radius_m
    }

    pub fn jitter_margin_m(&self) -> f64 {
        self.jitter_margin_m
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn static_hazards(&self) -> &[HazardRecord] {
        &self.static_hazards
    }

    pub fn routing_url(&self) -> &str {
        &self.routing_url
    }

    pub fn routing_profile(&self) -> &str {
        &self.routing_profile
    }

    pub fn routing_timeout(&self) -> Duration {
        Duration::from_millis(self.routing_timeout_ms)
    }

    pub fn geocoding_url(&self) -> &str {
        &self.geocoding_url
    }

    pub fn geocoding_timeout(&self) -> Duration {
        Duration::from_millis(self.geocoding_timeout_ms)
    }

    pub fn guidance_interval(&self) -> Duration {
        Duration::from_millis(self.guidance_interval_ms)
    }

    pub fn voice_enabled(&self) -> bool {
        self.voice_enabled
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn metrics_http_port(&self) -> u16 {
        self.metrics_http_port
    }

    /// Journal file path, None when unset
    pub fn journal_file(&self) -> Option<&str> {
        (!self.journal_file.is_empty()).then_some(self.journal_file.as_str())
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set cooldown
    pub fn with_cooldown_secs(mut self, secs: u64) -> Self {
        self.cooldown_secs = secs;
        self
    }

    /// Builder method for tests to set guidance spacing
    pub fn with_guidance_interval_ms(mut self, ms: u64) -> Self {
        self.guidance_interval_ms = ms;
        self
    }

    /// Builder method for tests to disable the hazard feed
    pub fn without_hazard_feed(mut self) -> Self {
        self.hazard_feed_url.clear();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_center(), [13.0827, 80.2707]);
        assert_eq!(config.point_trigger_radius_m(), 50.0);
        assert_eq!(config.cooldown(), Duration::from_secs(60));
        assert_eq!(config.guidance_interval(), Duration::from_millis(4000));
        assert!(config.voice_enabled());
        assert_eq!(config.hazard_feed_url(), Some("http://localhost:5000/alerts"));
        assert_eq!(config.replay_file(), None);
        assert_eq!(config.journal_file(), None);
        assert_eq!(config.metrics_http_port(), 0);
    }

    #[test]
    fn test_resolve_config_path_default() {
        let args: Vec<String> = vec!["hazard-nav".to_string()];
        if env::var("CONFIG_FILE").is_err() {
            assert_eq!(Config::resolve_config_path(&args), "config/dev.toml");
        }
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> =
            vec!["hazard-nav".to_string(), "--config".to_string(), "config/chennai.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/chennai.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> = vec!["hazard-nav".to_string(), "--config=config/demo.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/demo.toml");
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let toml_config: TomlConfig = toml::from_str("").unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.cooldown(), Duration::from_secs(60));
        assert_eq!(config.routing_profile(), "driving");
        assert_eq!(config.config_file(), "inline");
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = Config::default().with_guidance_interval_ms(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builders() {
        let config = Config::default().with_cooldown_secs(5).without_hazard_feed();
        assert_eq!(config.cooldown(), Duration::from_secs(5));
        assert_eq!(config.hazard_feed_url(), None);
    }
}
