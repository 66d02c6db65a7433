//! # Redial Transport
//!
//! Byte-stream transport layer for redial clients.
//!
//! This crate provides:
//! - [`engine`] - The event engine contract and a tokio-backed TCP engine
//! - [`framing`] - Length-prefixed framing codec and inbound accumulator

pub mod engine;
pub mod error;
pub mod framing;

pub use engine::{
    Dispatch, EventEngine, PanicHandler, StreamEvent, StreamId, StreamListener, TcpEngine,
    TcpEngineConfig,
};
pub use error::{StreamError, TransportError};
pub use framing::{FrameAccumulator, SizedFrameCodec};
