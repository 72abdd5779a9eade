//! Filesystem helpers for the keyring root.

pub mod fs;
