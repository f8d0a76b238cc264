//! Policy evaluation and action reconciliation engine for revolver
//!
//! This crate is the heart of revolver, containing:
//! - The availability schedule evaluator (windows, barriers, literals, overrides)
//! - The filter engine used to match resources against central policy
//! - Matcher resolution by priority
//! - Policy plugins that turn schedules into actions
//! - Reconciliation: one driver execution per group of alike actions
//! - The run orchestrator that ties accounts, drivers and plugins together

mod filter;
mod matcher;
mod plugin;
mod reconcile;
mod run;
mod schedule;

pub use filter::*;
pub use matcher::*;
pub use plugin::*;
pub use reconcile::*;
pub use run::*;
pub use schedule::*;
