//! TCP event engine backed by a tokio runtime.
//!
//! Each stream runs as one task on a private runtime. Tasks never touch
//! listeners; they push events onto a queue that [`TcpEngine::update`] drains,
//! so delivery only happens on the thread that polls the engine.

use super::{Dispatch, EventEngine, PanicHandler, StreamEvent, StreamId, StreamListener};
use crate::error::{StreamError, TransportError};
use bytes::{Bytes, BytesMut};
use crossbeam_channel::{Receiver, Sender};
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Weak;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Configuration for [`TcpEngine`].
#[derive(Debug, Clone)]
pub struct TcpEngineConfig {
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Enable TCP_NODELAY.
    pub tcp_nodelay: bool,
    /// Bytes requested from the socket per read.
    pub read_chunk_size: usize,
    /// Receive buffer size.
    pub recv_buffer_size: Option<usize>,
    /// Send buffer size.
    pub send_buffer_size: Option<usize>,
    /// Number of runtime worker threads.
    pub worker_threads: usize,
}

impl Default for TcpEngineConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            tcp_nodelay: true,
            read_chunk_size: 64 * 1024,
            recv_buffer_size: None,
            send_buffer_size: None,
            worker_threads: 1,
        }
    }
}

impl TcpEngineConfig {
    /// Sets the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets TCP_NODELAY option.
    #[must_use]
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// Sets the per-read chunk size.
    #[must_use]
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Sets the socket receive buffer size.
    #[must_use]
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = Some(size);
        self
    }

    /// Sets the socket send buffer size.
    #[must_use]
    pub fn send_buffer_size(mut self, size: usize) -> Self {
        self.send_buffer_size = Some(size);
        self
    }

    /// Sets the number of runtime worker threads.
    #[must_use]
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.max(1);
        self
    }
}

enum EngineEvent {
    Stream(StreamId, StreamEvent),
    Panic(String),
}

struct StreamSlot {
    listeners: Vec<Weak<dyn StreamListener>>,
    outbound_tx: mpsc::UnboundedSender<Bytes>,
    outbound_rx: Option<mpsc::UnboundedReceiver<Bytes>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

/// TCP implementation of [`EventEngine`].
pub struct TcpEngine {
    runtime: Option<tokio::runtime::Runtime>,
    handle: tokio::runtime::Handle,
    config: TcpEngineConfig,
    streams: HashMap<StreamId, StreamSlot>,
    next_id: u64,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
    panic_handler: Option<PanicHandler>,
}

impl TcpEngine {
    /// Creates an engine with its own I/O runtime.
    ///
    /// # Errors
    /// Returns `TransportError::Io` if the runtime cannot be started.
    pub fn new(config: TcpEngineConfig) -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name("redial-io")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        let (events_tx, events_rx) = crossbeam_channel::unbounded();

        Ok(Self {
            runtime: Some(runtime),
            handle,
            config,
            streams: HashMap::new(),
            next_id: 1,
            events_tx,
            events_rx,
            panic_handler: None,
        })
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &TcpEngineConfig {
        &self.config
    }

    fn slot_mut(&mut self, stream: StreamId) -> Result<&mut StreamSlot, TransportError> {
        self.streams
            .get_mut(&stream)
            .ok_or_else(|| TransportError::unknown_stream(stream))
    }

    fn report_panic(&self, message: &str) {
        match &self.panic_handler {
            Some(handler) => handler(message),
            None => tracing::error!(%message, "engine panic with no handler installed"),
        }
    }
}

impl EventEngine for TcpEngine {
    fn set_panic_handler(&mut self, handler: PanicHandler) {
        self.panic_handler = Some(handler);
    }

    fn new_stream(&mut self) -> StreamId {
        let id = StreamId::new(self.next_id);
        self.next_id += 1;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.streams.insert(
            id,
            StreamSlot {
                listeners: Vec::new(),
                outbound_tx,
                outbound_rx: Some(outbound_rx),
                task: None,
            },
        );
        id
    }

    fn add_listener(
        &mut self,
        stream: StreamId,
        listener: Weak<dyn StreamListener>,
    ) -> Result<(), TransportError> {
        self.slot_mut(stream)?.listeners.push(listener);
        Ok(())
    }

    fn connect(&mut self, stream: StreamId, host: &str, port: u16) -> Result<(), TransportError> {
        let handle = self.handle.clone();
        let config = self.config.clone();
        let events = self.events_tx.clone();
        let slot = self.slot_mut(stream)?;
        let outbound = slot
            .outbound_rx
            .take()
            .ok_or(TransportError::AlreadyConnecting { stream })?;

        let host = host.to_owned();
        tracing::debug!(%stream, %host, port, "connecting");

        let run = run_stream(stream, host, port, config, outbound, events.clone());
        let task = handle.spawn(supervise(stream, events, run));
        slot.task = Some(task);
        Ok(())
    }

    fn write(&mut self, stream: StreamId, bytes: &[u8]) -> Result<(), TransportError> {
        let slot = self.slot_mut(stream)?;
        if slot.outbound_tx.send(Bytes::copy_from_slice(bytes)).is_err() {
            // The task has finished; its Disconnected event is already queued.
            tracing::trace!(%stream, len = bytes.len(), "write to finished stream dropped");
        }
        Ok(())
    }

    fn close(&mut self, stream: StreamId) {
        if let Some(slot) = self.streams.remove(&stream) {
            if let Some(task) = slot.task {
                task.abort();
            }
            tracing::debug!(%stream, "stream closed");
        }
    }

    fn update(&mut self) -> Vec<Dispatch> {
        let mut due = Vec::new();

        while let Ok(event) = self.events_rx.try_recv() {
            let (stream, event) = match event {
                EngineEvent::Stream(stream, event) => (stream, event),
                EngineEvent::Panic(message) => {
                    self.report_panic(&message);
                    continue;
                }
            };

            let Some(slot) = self.streams.get(&stream) else {
                tracing::trace!(%stream, ?event, "event for retired stream dropped");
                continue;
            };

            let retire = matches!(event, StreamEvent::Disconnected);
            for listener in &slot.listeners {
                due.push(Dispatch::new(stream, listener.clone(), event.clone()));
            }
            if retire {
                self.streams.remove(&stream);
            }
        }

        due
    }

    fn stream_count(&self) -> usize {
        self.streams.len()
    }
}

impl Drop for TcpEngine {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn run_stream(
    id: StreamId,
    host: String,
    port: u16,
    config: TcpEngineConfig,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    events: Sender<EngineEvent>,
) {
    let emit = |event: StreamEvent| {
        let _ = events.send(EngineEvent::Stream(id, event));
    };

    let connected = tokio::time::timeout(
        config.connect_timeout,
        TcpStream::connect((host.as_str(), port)),
    )
    .await;

    let stream = match connected {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            emit(StreamEvent::ErrorOccurred(StreamError::ConnectFailed(
                e.to_string(),
            )));
            emit(StreamEvent::Disconnected);
            return;
        }
        Err(_) => {
            emit(StreamEvent::ErrorOccurred(StreamError::ConnectTimeout));
            emit(StreamEvent::Disconnected);
            return;
        }
    };

    if let Err(e) = configure_socket(&stream, &config) {
        tracing::debug!(stream = %id, error = %e, "failed to apply socket options");
    }
    emit(StreamEvent::Connected);

    let (mut reader, mut writer) = stream.into_split();
    let mut buf = BytesMut::with_capacity(config.read_chunk_size);

    loop {
        buf.reserve(config.read_chunk_size);
        tokio::select! {
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => break,
                Ok(_) => emit(StreamEvent::DataReceived(buf.split().freeze())),
                Err(e) => {
                    emit(StreamEvent::ErrorOccurred(StreamError::Io(e.to_string())));
                    break;
                }
            },
            pending = outbound.recv() => match pending {
                Some(bytes) => {
                    if let Err(e) = writer.write_all(&bytes).await {
                        emit(StreamEvent::ErrorOccurred(StreamError::Io(e.to_string())));
                        break;
                    }
                }
                // The engine dropped the stream.
                None => return,
            },
        }
    }

    emit(StreamEvent::Disconnected);
}

/// Runs a stream task, turning a panic into a panic report followed by the
/// stream's final error and `Disconnected`.
async fn supervise(
    id: StreamId,
    events: Sender<EngineEvent>,
    task: impl Future<Output = ()> + Send + 'static,
) {
    let Err(payload) = AssertUnwindSafe(task).catch_unwind().await else {
        return;
    };

    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "stream task panicked".to_owned());

    let _ = events.send(EngineEvent::Stream(
        id,
        StreamEvent::ErrorOccurred(StreamError::Io(format!("stream task panicked: {message}"))),
    ));
    let _ = events.send(EngineEvent::Panic(message));
    let _ = events.send(EngineEvent::Stream(id, StreamEvent::Disconnected));
}

fn configure_socket(stream: &TcpStream, config: &TcpEngineConfig) -> std::io::Result<()> {
    stream.set_nodelay(config.tcp_nodelay)?;

    let socket = socket2::SockRef::from(stream);
    if let Some(size) = config.recv_buffer_size {
        socket.set_recv_buffer_size(size)?;
    }
    if let Some(size) = config.send_buffer_size {
        socket.set_send_buffer_size(size)?;
    }
    Ok(())
}
