//! tabletalk: streaming chat over hosted models with tool-data charts.
//!
//! A [`Session`](session::Session) relays each user turn to a model
//! connection, forwards the streamed events to a transcript in arrival
//! order, pulls JSON tables out of tool results as they stream in, and
//! appends one chart plus a metrics footer once the stream closes.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tabletalk::prelude::*;
//!
//! # async fn example() -> tabletalk::error::Result<()> {
//! let config = ChatConfig::load()?;
//! let factory = OpenRouterFactory::from_config(&config, ModelCatalog::default());
//! let mut session = Session::new(factory.connect(&config.model)?).with_config(&config);
//! session.start_registration();
//!
//! let report = session.submit("Sales by region for last month").await?;
//! println!("{}", report.metrics);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod extract;
pub mod gate;
pub mod metrics;
pub mod models;
pub mod prelude;
pub mod provider;
pub mod render;
pub mod session;
pub mod tools;
pub mod transcript;
pub mod types;
pub mod util;

#[cfg(feature = "mcp")]
pub mod mcp;

#[cfg(feature = "cli")]
pub mod cli;
