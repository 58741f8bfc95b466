//! Services - engine logic and state
//!
//! - `hazard_index` - spatial hazard set with atomic reloads
//! - `proximity_monitor` - per-hazard alert state machine
//! - `route_service` - route requests with supersession
//! - `guidance` - time-paced instruction narration
//! - `session` - the event loop tying them together

pub mod guidance;
pub mod hazard_index;
pub mod proximity_monitor;
pub mod route_service;
pub mod session;

pub use guidance::GuidanceSequencer;
pub use hazard_index::HazardIndex;
pub use proximity_monitor::ProximityMonitor;
pub use route_service::{RouteService, RoutingProvider};
pub use session::{MapSession, SessionCommand};
