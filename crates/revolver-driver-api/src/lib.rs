//! Driver trait interfaces for revolver
//!
//! This crate defines the boundary between the reconciliation core and the
//! code that talks to a cloud API for one resource kind. It contains no
//! cloud code itself.

mod capabilities;
mod mock;
mod traits;

pub use capabilities::*;
pub use mock::*;
pub use traits::*;
