//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `location` - position sources and the GeoClock subscription
//! - `hazard_feed` - HTTP hazard feed client and feed parsing
//! - `routing` - OSRM-compatible routing provider
//! - `geocoding` - Nominatim-compatible destination search
//! - `sink` - alert/narration/status sinks
//! - `journal` - JSONL journal of sink events
//! - `prometheus` - metrics and status HTTP endpoint

pub mod geocoding;
pub mod hazard_feed;
pub mod journal;
pub mod location;
pub mod prometheus;
pub mod routing;
pub mod sink;

// Re-export commonly used types
pub use geocoding::{Geocoder, NominatimGeocoder};
pub use hazard_feed::{HazardFeedClient, HazardSource, StaticHazardSource};
pub use location::{ChannelSource, GeoClock, ReplaySource, SubscribeMode};
pub use routing::OsrmProvider;
pub use sink::{create_sink_channel, AlertSink, ChannelSink, FanoutSink, LogSink, SinkEvent};
