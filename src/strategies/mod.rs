pub mod curve;
pub mod metrics;
pub mod overrides;
pub mod sparse;
pub mod traits;
