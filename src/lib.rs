// src/lib.rs
//! Bid and placement decision engine for advertising accounts.
//!
//! Per target: market-curve or sparse-data bid estimate, then business
//! overrides. Per campaign: placement scoring and cooldown-gated adjustment
//! planning, then a coordinator that blends every proposal into one base-bid
//! change behind a circuit breaker.

pub mod config;
pub mod connectors;
pub mod core;
pub mod error;
pub mod placement;
pub mod reasons;
pub mod strategies;
pub mod types;
pub mod utils;

pub use crate::config::EngineConfig;
pub use crate::core::engine::{CampaignEvaluation, CampaignSnapshot, DecisionEngine};
pub use crate::error::{EngineError, EngineResult};
