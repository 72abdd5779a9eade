//! Serialized data structures.

pub mod ledger;
pub mod settings;
