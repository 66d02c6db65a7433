//! # Redial Client
//!
//! Auto-reconnecting framed client.
//!
//! This crate provides:
//! - Engine driver that polls an event engine on a background thread
//! - Client builder with configuration options
//! - Automatic reconnection with bounded exponential backoff
//! - Length-prefixed frame reads and writes

pub mod builder;
pub mod client;
pub mod driver;
pub mod error;
pub mod reconnect;

#[cfg(test)]
mod testing;

pub use builder::{ClientBuilder, ClientConfig};
pub use client::{ConnectionPhase, ReconnectingClient};
pub use driver::{DriverConfig, EngineDriver, EngineHandle};
pub use error::ClientError;
pub use reconnect::{Backoff, ReconnectConfig};
