//! Auto-reconnecting, length-prefixed framed client.

use crate::builder::{ClientBuilder, ClientConfig};
use crate::driver::EngineHandle;
use crate::error::ClientError;
use crate::reconnect::Backoff;
use bytes::Bytes;
use parking_lot::Mutex;
use redial_transport::{
    EventEngine, FrameAccumulator, SizedFrameCodec, StreamError, StreamId, StreamListener,
};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

/// Where a client is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// A stream exists and is trying to connect.
    Connecting,
    /// The current stream is connected.
    Connected,
    /// The last stream was destroyed; waiting out the backoff delay.
    Backoff,
}

struct ConnectionState {
    stream: Option<StreamId>,
    phase: ConnectionPhase,
    times_connected: u64,
    times_disconnected: u64,
    backoff: Backoff,
    inbound: FrameAccumulator,
}

impl ConnectionState {
    fn new(config: &ClientConfig) -> Self {
        Self {
            stream: None,
            phase: ConnectionPhase::Connecting,
            times_connected: 0,
            times_disconnected: 0,
            backoff: Backoff::new(config.reconnect.clone()),
            inbound: FrameAccumulator::with_max_frame_size(config.max_frame_size),
        }
    }

    fn is_current(&self, stream: StreamId) -> bool {
        self.stream == Some(stream)
    }
}

/// One logical connection; outlives the physical streams backing it.
///
/// Lock order is always the engine lock first, then `state`.
struct Connection<E: EventEngine> {
    host: String,
    port: u16,
    config: ClientConfig,
    engine: EngineHandle<E>,
    state: Mutex<ConnectionState>,
    this: Weak<Connection<E>>,
}

impl<E: EventEngine> Connection<E> {
    /// Replaces the retired stream with a fresh one and starts connecting it.
    fn open_stream(&self, state: &mut ConnectionState) {
        let listener: Weak<dyn StreamListener> = self.this.clone();

        let opened = self.engine.with_engine(|engine| {
            let stream = engine.new_stream();
            let started = engine
                .add_listener(stream, listener)
                .and_then(|()| engine.connect(stream, &self.host, self.port));
            match started {
                Ok(()) => Ok(stream),
                Err(e) => {
                    engine.close(stream);
                    Err(e)
                }
            }
        });

        match opened {
            Ok(stream) => {
                state.stream = Some(stream);
                state.phase = ConnectionPhase::Connecting;
                tracing::debug!(host = %self.host, port = self.port, %stream, "connecting");
            }
            Err(e) => {
                tracing::error!(host = %self.host, port = self.port, error = %e, "failed to open stream");
            }
        }
    }

    /// Extracts the next frame. Must be called under the engine lock.
    fn next_frame(&self) -> Result<Option<Bytes>, ClientError> {
        let next = self.state.lock().inbound.try_next_frame();
        if let Err(e) = &next {
            tracing::warn!(host = %self.host, port = self.port, error = %e, "undecodable inbound frame");
            self.discard_stream();
        }
        next.map_err(ClientError::from)
    }

    /// Drops buffered input and the current stream, then reconnects through
    /// the usual backoff path. The closed stream delivers no further events.
    fn discard_stream(&self) {
        let delay = {
            let mut state = self.state.lock();
            state.inbound.clear();
            let Some(stream) = state.stream.take() else {
                return;
            };
            self.engine.with_engine(|engine| engine.close(stream));
            state.phase = ConnectionPhase::Backoff;
            state.backoff.on_disconnect()
        };

        self.reconnect_after(delay);
    }

    /// Starts over after the current stream was destroyed.
    fn reconnect_after(&self, delay: Duration) {
        tracing::debug!(host = %self.host, port = self.port, ?delay, "reconnecting after backoff");
        thread::sleep(delay);

        let mut state = self.state.lock();
        // Repeated destroy notifications must not count twice.
        if state.times_connected > state.times_disconnected {
            state.times_disconnected += 1;
            tracing::info!(
                host = %self.host,
                port = self.port,
                disconnects = state.times_disconnected,
                "disconnected"
            );
        }
        self.open_stream(&mut state);
    }
}

impl<E: EventEngine> StreamListener for Connection<E> {
    fn on_connected(&self, stream: StreamId) {
        let mut state = self.state.lock();
        if !state.is_current(stream) {
            return;
        }

        state.times_connected += 1;
        state.phase = ConnectionPhase::Connected;
        tracing::info!(
            host = %self.host,
            port = self.port,
            %stream,
            connects = state.times_connected,
            "connected"
        );
    }

    fn on_data(&self, stream: StreamId, data: &[u8]) {
        let mut state = self.state.lock();
        if !state.is_current(stream) {
            return;
        }

        state.backoff.reset();
        state.inbound.extend(data);
    }

    fn on_error(&self, stream: StreamId, error: &StreamError) {
        if error.is_connect_failure() {
            tracing::debug!(host = %self.host, port = self.port, %stream, %error, "connect attempt failed");
        } else {
            tracing::warn!(host = %self.host, port = self.port, %stream, %error, "transport error");
        }
    }

    fn on_disconnected(&self, stream: StreamId) {
        let delay = {
            let mut state = self.state.lock();
            if !state.is_current(stream) {
                return;
            }

            state.stream = None;
            state.phase = ConnectionPhase::Backoff;
            if self.config.clear_on_disconnect {
                state.inbound.clear();
            }
            state.backoff.on_disconnect()
        };

        // The engine lock stays held, so no other thread sees the gap.
        self.reconnect_after(delay);
    }
}

/// Client that keeps one connection to `host:port` alive forever and frames
/// messages as `[u32 LE length][payload]`.
///
/// Connection failures never surface as errors: the client backs off and
/// reconnects on its own. Watch [`times_connected`](Self::times_connected) and
/// [`times_disconnected`](Self::times_disconnected) to observe outages.
///
/// The client is `Sync`; share it across threads behind an `Arc`.
pub struct ReconnectingClient<E: EventEngine> {
    inner: Arc<Connection<E>>,
}

impl<E: EventEngine> ReconnectingClient<E> {
    /// Creates a client with default settings and starts connecting.
    ///
    /// Use [`ClientBuilder`] to change the settings.
    #[must_use]
    pub fn connect(engine: &EngineHandle<E>, host: impl Into<String>, port: u16) -> Self {
        ClientBuilder::new(host, port).build(engine)
    }

    pub(crate) fn open(
        host: String,
        port: u16,
        config: ClientConfig,
        engine: EngineHandle<E>,
    ) -> Self {
        let inner = Arc::new_cyclic(|this| Connection {
            host,
            port,
            state: Mutex::new(ConnectionState::new(&config)),
            config,
            engine,
            this: this.clone(),
        });

        inner.engine.with_lock(|| {
            let mut state = inner.state.lock();
            inner.open_stream(&mut state);
        });

        Self { inner }
    }

    /// Sends raw bytes on the current stream.
    ///
    /// Delivery is best-effort while disconnected: bytes are handed to the
    /// engine, which may drop them if the pending attempt fails.
    ///
    /// # Errors
    /// Returns an error if the engine rejects the write.
    pub fn write(&self, bytes: &[u8]) -> Result<(), ClientError> {
        self.inner.engine.with_engine(|engine| -> Result<(), ClientError> {
            let Some(stream) = self.inner.state.lock().stream else {
                tracing::trace!(len = bytes.len(), "no stream, write dropped");
                return Ok(());
            };
            engine.write(stream, bytes)?;
            Ok(())
        })
    }

    /// Sends `payload` as one length-prefixed frame.
    ///
    /// Empty payloads are dropped unless the client was built with
    /// `skip_empty_frames(false)`.
    ///
    /// # Errors
    /// Returns `TransportError::FrameTooLarge` if the payload exceeds the
    /// configured maximum, or any error from [`write`](Self::write).
    pub fn write_sized_frame(&self, payload: &[u8]) -> Result<(), ClientError> {
        if payload.is_empty() && self.inner.config.skip_empty_frames {
            return Ok(());
        }

        let frame = SizedFrameCodec::new(self.inner.config.max_frame_size).encode_frame(payload)?;
        self.write(&frame)
    }

    /// Removes and returns the next complete inbound frame, or `None` if no
    /// complete frame is buffered yet.
    ///
    /// # Errors
    /// Returns `TransportError::FrameTooLarge` if the peer announced a payload
    /// above the configured maximum. The inbound buffer is then discarded and
    /// the stream is replaced, so later reads see frames from the new stream.
    pub fn try_read_sized_frame(&self) -> Result<Option<Bytes>, ClientError> {
        self.inner.engine.with_lock(|| self.inner.next_frame())
    }

    /// Removes and returns every complete inbound frame, oldest first.
    ///
    /// # Errors
    /// Same as [`try_read_sized_frame`](Self::try_read_sized_frame); frames
    /// extracted before the failure stay consumed.
    pub fn drain_frames(&self) -> Result<Vec<Bytes>, ClientError> {
        self.inner.engine.with_lock(|| -> Result<Vec<Bytes>, ClientError> {
            let mut frames = Vec::new();
            while let Some(frame) = self.inner.next_frame()? {
                frames.push(frame);
            }
            Ok(frames)
        })
    }

    /// Remote host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.inner.host
    }

    /// Remote port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.port
    }

    /// Number of successful connects so far.
    #[must_use]
    pub fn times_connected(&self) -> u64 {
        self.inner.state.lock().times_connected
    }

    /// Number of connections lost after having been established.
    #[must_use]
    pub fn times_disconnected(&self) -> u64 {
        self.inner.state.lock().times_disconnected
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> ConnectionPhase {
        self.inner.state.lock().phase
    }

    /// Returns true while the current stream is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.phase() == ConnectionPhase::Connected
    }

    /// Delay that was (or will be) applied before the next reconnect.
    #[must_use]
    pub fn current_backoff(&self) -> Duration {
        self.inner.state.lock().backoff.current()
    }

    /// Inbound bytes not yet consumed as frames.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.inner.state.lock().inbound.len()
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

impl<E: EventEngine> Drop for ReconnectingClient<E> {
    fn drop(&mut self) {
        self.inner.engine.with_engine(|engine| {
            if let Some(stream) = self.inner.state.lock().stream.take() {
                engine.close(stream);
            }
        });
    }
}

impl<E: EventEngine> std::fmt::Debug for ReconnectingClient<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ReconnectingClient")
            .field("host", &self.inner.host)
            .field("port", &self.inner.port)
            .field("stream", &state.stream)
            .field("phase", &state.phase)
            .field("times_connected", &state.times_connected)
            .field("times_disconnected", &state.times_disconnected)
            .finish()
    }
}
