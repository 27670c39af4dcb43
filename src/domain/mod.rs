//! Core domain types and logic. No I/O.

pub mod error;
pub mod series;
pub mod asset;
pub mod return_mode;
pub mod refresh_policy;
pub mod metrics;
pub mod simulation;
pub mod request;
pub mod config_validation;
