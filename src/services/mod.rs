//! Application services composing the domain with the ports.

pub mod fetcher;
pub mod store;
pub mod refresh;
pub mod comparison;
