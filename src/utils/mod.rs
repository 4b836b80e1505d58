//! Utilities
pub mod numeric;
pub mod stats;
