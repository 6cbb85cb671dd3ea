pub mod calendar;
pub mod config;
pub mod crop;
pub mod error;
pub mod serialize;
pub mod transition;

pub use calendar::{Calendar, DayState, PlantBatch};
pub use config::{EngineConfig, RunParams};
pub use crop::{Crop, CropBook, Tiles};
pub use error::PlannerError;
pub use serialize::{cache_key, from_wire, round_sig, to_wire};
pub use transition::plant;
