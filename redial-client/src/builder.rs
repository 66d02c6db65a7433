//! Client builder and configuration.

use crate::client::ReconnectingClient;
use crate::driver::EngineHandle;
use crate::reconnect::ReconnectConfig;
use redial_transport::EventEngine;
use redial_transport::framing::MAX_FRAME_SIZE;
use std::time::Duration;

/// Per-client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backoff policy between reconnect attempts.
    pub reconnect: ReconnectConfig,
    /// Largest frame payload accepted in either direction.
    pub max_frame_size: usize,
    /// Drop empty payloads in `write_sized_frame` instead of sending a
    /// zero-length frame.
    pub skip_empty_frames: bool,
    /// Discard buffered inbound bytes, including a partial frame, on disconnect.
    pub clear_on_disconnect: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            max_frame_size: MAX_FRAME_SIZE,
            skip_empty_frames: true,
            clear_on_disconnect: false,
        }
    }
}

/// Builder for configuring and creating a client.
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    host: String,
    port: u16,
    config: ClientConfig,
}

impl ClientBuilder {
    /// Creates a new client builder for `host:port`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            config: ClientConfig::default(),
        }
    }

    /// Replaces the whole backoff policy.
    #[must_use]
    pub fn reconnect_config(mut self, config: ReconnectConfig) -> Self {
        self.config.reconnect = config;
        self
    }

    /// Sets the reconnection delay floor.
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect.initial_delay = delay;
        self
    }

    /// Sets the reconnection delay ceiling.
    #[must_use]
    pub fn max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect.max_delay = delay;
        self
    }

    /// Sets the maximum frame size.
    #[must_use]
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size.min(MAX_FRAME_SIZE);
        self
    }

    /// Chooses whether empty payloads are dropped or sent as zero-length frames.
    #[must_use]
    pub fn skip_empty_frames(mut self, skip: bool) -> Self {
        self.config.skip_empty_frames = skip;
        self
    }

    /// Chooses whether buffered inbound bytes survive a disconnect.
    #[must_use]
    pub fn clear_on_disconnect(mut self, clear: bool) -> Self {
        self.config.clear_on_disconnect = clear;
        self
    }

    /// Returns the configuration built so far.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Builds the client and starts its first connection attempt.
    #[must_use]
    pub fn build<E: EventEngine>(self, engine: &EngineHandle<E>) -> ReconnectingClient<E> {
        ReconnectingClient::open(self.host, self.port, self.config, engine.clone())
    }
}
