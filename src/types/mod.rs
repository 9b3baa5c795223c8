//! Core types for tabletalk.

pub mod stream;
pub mod usage;

pub use stream::*;
pub use usage::*;
