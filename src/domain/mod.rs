//! Domain models - core engine types
//!
//! This module contains the canonical data types used throughout the engine:
//! - `Position` - a single location fix
//! - `Hazard` / `HazardKind` - point and zone hazards
//! - `AlertEvent` - a fired hazard alert
//! - `RouteResult` / `Instruction` - a normalized route
//! - `EngineStatus` - degradations surfaced to the UI layer
//! - `geo` - great-circle distance helpers
//! - `error` - error taxonomy

pub mod error;
pub mod geo;
pub mod types;

// Re-export commonly used types at module level
pub use error::{GeocodeError, HazardFeedError, LocationError, RouteError};
pub use types::{
    AlertEvent, EngineStatus, GuidanceState, Hazard, HazardId, HazardKind, Instruction, Position,
    RouteRequest, RouteResult, SessionId,
};
