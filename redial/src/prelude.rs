//! Prelude module for convenient imports.
//!
//! ```ignore
//! use redial::prelude::*;
//! ```

// Transport types
pub use redial_transport::{
    EventEngine, FrameAccumulator, SizedFrameCodec, StreamError, StreamEvent, StreamId,
    StreamListener, TcpEngine, TcpEngineConfig, TransportError,
};

// Client types
pub use redial_client::{
    Backoff, ClientBuilder, ClientConfig, ClientError, ConnectionPhase, DriverConfig,
    EngineDriver, EngineHandle, ReconnectConfig, ReconnectingClient,
};
