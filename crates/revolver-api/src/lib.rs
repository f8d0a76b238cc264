//! Shared model for revolver
//!
//! This crate defines what drivers and policy plugins exchange:
//! - Resources (a per-run snapshot of one cloud resource)
//! - Actions (intended changes, with dedup and merge rules)

mod action;
mod resource;

pub use action::*;
pub use resource::*;
