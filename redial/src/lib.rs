//! # Redial
//!
//! Auto-reconnecting, length-prefixed TCP client for Rust.
//!
//! A [`ReconnectingClient`](client::ReconnectingClient) keeps one logical
//! connection to `host:port` alive for as long as it exists. When the stream
//! drops it waits out a backoff delay (5 ms, doubling up to 500 ms, reset as
//! soon as data arrives) and dials again. Messages travel as
//! `[u32 little-endian length][payload]` frames.
//!
//! ## Features
//!
//! - **One polling thread** - an [`EngineDriver`](client::EngineDriver) drives
//!   every client built on it
//! - **Thread-safe clients** - reads and writes from any thread
//! - **Pluggable engines** - anything implementing
//!   [`EventEngine`](transport::EventEngine); a tokio-backed TCP engine ships
//!   by default
//! - **Codec reuse** - [`SizedFrameCodec`](transport::SizedFrameCodec) plugs
//!   into `tokio_util::codec::Framed` for peers written with tokio
//!
//! ## Quick Start
//!
//! ```ignore
//! use redial::prelude::*;
//!
//! let driver = EngineDriver::tcp(TcpEngineConfig::default(), DriverConfig::default())?;
//! let client = ReconnectingClient::connect(driver.handle(), "127.0.0.1", 9000);
//!
//! client.write_sized_frame(b"hello")?;
//! while let Some(frame) = client.try_read_sized_frame()? {
//!     println!("{} bytes", frame.len());
//! }
//! ```
//!
//! ## Crate Organization
//!
//! - [`transport`] - Event engine contract, TCP engine, framing codec
//! - [`client`] - Engine driver, backoff, reconnecting client

pub mod prelude;

/// Event engines and length-prefixed framing.
pub mod transport {
    pub use redial_transport::*;
}

/// Engine driver and reconnecting client.
pub mod client {
    pub use redial_client::*;
}
