//! Utility modules: usage tracking, timeout.

pub mod timeout;
pub mod usage;
