//! dcalab: dollar-cost averaging backtests over locally cached index history.
//!
//! Hexagonal layout: pure logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`], and the refresh/comparison
//! workflows that compose them in [`services`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod services;
pub mod cli;
pub mod logging;
