pub mod cycle;
pub mod service;

pub use cycle::{CycleConfig, CycleState, Phase};
pub use service::{SamplingHandle, SamplingService, TickOutcome};
