//! Scheduler configuration.
//!
//! Split into focused submodules:
//! - `types`: config structs and their defaults
//! - `loading`: TOML parsing, file loading, and `DOCBATCH_*` env overrides
//! - `validation`: sanity checks run on load and on live reconfiguration

mod loading;
mod types;
mod validation;


pub use types::{BatchConfig, CostConfig, StatsConfig, TypeProfile, WaitConfig};
