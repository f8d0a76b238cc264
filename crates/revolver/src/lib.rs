//! revolver - power-cycle cloud resources on a schedule
//!
//! The binary runs one pass over a JSON resource inventory. This library
//! half holds the inventory-backed driver so the pass can be tested.

mod inventory;

pub use inventory::*;
