//! Forecast orchestration: readiness gating plus the two model pipelines.

pub mod gate;
pub mod sequence;
pub mod tabular;

pub use tabular::TabularOutcome;
