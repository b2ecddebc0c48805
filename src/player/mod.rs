pub mod controller;
pub mod engine;
pub mod queue;
pub mod station;
pub mod traits;

pub use controller::QueueHandle;
pub use engine::RodioEngine;
pub use queue::{Advance, Notice, PlayQueue, PlayTarget, RefillRequest, Snapshot};
pub use station::{Seed, StationPolicy};
pub use traits::{EngineEvent, PlayerState, PlayerTrait, Track, TrackId};
