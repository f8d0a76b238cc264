//! Shared utilities for revolver
//!
//! This crate provides:
//! - ID types (ResourceId, AccountId, RunId)
//! - Wall-clock and weekday helpers used by availability schedules
//! - Error types
//! - Default paths for the configuration file

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
