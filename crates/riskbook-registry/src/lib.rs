//! Position registry.
//!
//! The registry is the single owner of position state. Every mutation of an
//! open position goes through [`PositionRegistry::mutate`], which serializes
//! access per position while leaving other positions free to update.

pub mod daily_stats;
pub mod handle;
pub mod registry;

pub use daily_stats::{DailyStats, PerformanceMetrics};
pub use handle::{PartialCloseOutcome, PositionMut, Realization};
pub use registry::PositionRegistry;
