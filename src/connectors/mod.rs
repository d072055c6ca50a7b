pub mod journal;
pub mod messages;
pub mod snapshot;
pub mod traits;
