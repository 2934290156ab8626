//! Helpers for testing.

pub mod generators;
