//! Port traits: the boundaries between domain logic and the outside world.

pub mod config_port;
pub mod source_port;
pub mod series_port;
