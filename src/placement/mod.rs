pub mod planner;
pub mod scorer;
