//! Event engine contract.
//!
//! An [`EventEngine`] owns non-blocking streams and turns their I/O into
//! [`StreamEvent`]s. Nothing is delivered until [`EventEngine::update`] is
//! called; the caller then hands every returned [`Dispatch`] to its listener.
//! Collecting first and delivering second lets listeners call back into the
//! engine (to open a replacement stream, for example) while an update is being
//! processed.

pub mod tcp;

use crate::error::{StreamError, TransportError};
use bytes::Bytes;
use std::fmt;
use std::sync::{Arc, Weak};

pub use tcp::{TcpEngine, TcpEngineConfig};

/// Callback invoked on unrecoverable engine failures.
pub type PanicHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Identifier of one physical stream owned by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    /// Creates a stream id from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle and data notifications for a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The connection was established.
    Connected,
    /// Bytes arrived, in network order.
    DataReceived(Bytes),
    /// The stream failed. A `Disconnected` event always follows.
    ErrorOccurred(StreamError),
    /// The stream is gone and will deliver nothing else.
    Disconnected,
}

/// Receiver of stream events.
///
/// Every method has an empty default so implementors only handle what they
/// care about.
pub trait StreamListener: Send + Sync {
    /// Called when `stream` finishes connecting.
    fn on_connected(&self, _stream: StreamId) {}

    /// Called with each chunk of bytes received on `stream`.
    fn on_data(&self, _stream: StreamId, _data: &[u8]) {}

    /// Called when `stream` reports an error.
    fn on_error(&self, _stream: StreamId, _error: &StreamError) {}

    /// Called once `stream` has been destroyed.
    fn on_disconnected(&self, _stream: StreamId) {}
}

/// One event waiting to be delivered to one listener.
pub struct Dispatch {
    stream: StreamId,
    listener: Weak<dyn StreamListener>,
    event: StreamEvent,
}

impl Dispatch {
    /// Creates a pending delivery.
    #[must_use]
    pub fn new(stream: StreamId, listener: Weak<dyn StreamListener>, event: StreamEvent) -> Self {
        Self {
            stream,
            listener,
            event,
        }
    }

    /// Stream the event belongs to.
    #[must_use]
    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// The event itself.
    #[must_use]
    pub fn event(&self) -> &StreamEvent {
        &self.event
    }

    /// Delivers the event. Returns false if the listener has been dropped.
    pub fn deliver(self) -> bool {
        let Some(listener) = self.listener.upgrade() else {
            tracing::trace!(stream = %self.stream, "listener dropped, event discarded");
            return false;
        };

        match &self.event {
            StreamEvent::Connected => listener.on_connected(self.stream),
            StreamEvent::DataReceived(data) => listener.on_data(self.stream, data),
            StreamEvent::ErrorOccurred(error) => listener.on_error(self.stream, error),
            StreamEvent::Disconnected => listener.on_disconnected(self.stream),
        }
        true
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("stream", &self.stream)
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

/// Non-blocking stream engine driven by periodic [`update`](Self::update) calls.
pub trait EventEngine: Send + 'static {
    /// Installs the callback invoked on unrecoverable engine failures.
    fn set_panic_handler(&mut self, handler: PanicHandler);

    /// Creates a new, unconnected stream.
    fn new_stream(&mut self) -> StreamId;

    /// Registers a listener for every event `stream` produces.
    ///
    /// # Errors
    /// Returns `TransportError::UnknownStream` if the stream does not exist.
    fn add_listener(
        &mut self,
        stream: StreamId,
        listener: Weak<dyn StreamListener>,
    ) -> Result<(), TransportError>;

    /// Starts connecting `stream` to `host:port`.
    ///
    /// Completion is reported through `Connected`, failure through
    /// `ErrorOccurred` followed by `Disconnected`.
    ///
    /// # Errors
    /// Returns an error if the stream does not exist or is already connecting.
    fn connect(&mut self, stream: StreamId, host: &str, port: u16) -> Result<(), TransportError>;

    /// Queues bytes for transmission on `stream`.
    ///
    /// Bytes written before the connection is established are sent once it
    /// is, and dropped if the attempt fails.
    ///
    /// # Errors
    /// Returns `TransportError::UnknownStream` if the stream does not exist.
    fn write(&mut self, stream: StreamId, bytes: &[u8]) -> Result<(), TransportError>;

    /// Tears `stream` down without delivering any further events for it.
    fn close(&mut self, stream: StreamId);

    /// Runs one non-blocking polling pass and returns the due events.
    ///
    /// A stream is retired as soon as its `Disconnected` event is collected.
    fn update(&mut self) -> Vec<Dispatch>;

    /// Number of live streams.
    fn stream_count(&self) -> usize;
}
