pub mod cooldown;
pub mod coordinator;
pub mod engine;
pub mod runner;
