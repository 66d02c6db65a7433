//! In-memory engine whose events are queued by hand.

use redial_transport::{
    Dispatch, EventEngine, PanicHandler, StreamEvent, StreamId, StreamListener, TransportError,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Weak;

#[derive(Default)]
pub(crate) struct ScriptedEngine {
    created: u64,
    streams: HashMap<StreamId, Vec<Weak<dyn StreamListener>>>,
    retired: HashMap<StreamId, Vec<Weak<dyn StreamListener>>>,
    connects: Vec<(StreamId, String, u16)>,
    writes: Vec<(StreamId, Vec<u8>)>,
    closed: Vec<StreamId>,
    pending: VecDeque<(StreamId, StreamEvent, bool)>,
    fatal: Option<String>,
    panic_handler: Option<PanicHandler>,
}

impl ScriptedEngine {
    /// Queues an event for the next `update`.
    pub(crate) fn push(&mut self, stream: StreamId, event: StreamEvent) {
        self.pending.push_back((stream, event, false));
    }

    /// Queues an event that reaches listeners even if `stream` was retired,
    /// like a misbehaving engine would.
    pub(crate) fn push_stale(&mut self, stream: StreamId, event: StreamEvent) {
        self.pending.push_back((stream, event, true));
    }

    /// Makes the next `update` report a fatal failure.
    pub(crate) fn fail_fatally(&mut self, message: &str) {
        self.fatal = Some(message.to_owned());
    }

    pub(crate) fn created(&self) -> u64 {
        self.created
    }

    pub(crate) fn is_live(&self, stream: StreamId) -> bool {
        self.streams.contains_key(&stream)
    }

    pub(crate) fn connects(&self) -> &[(StreamId, String, u16)] {
        &self.connects
    }

    /// Most recently connected stream.
    pub(crate) fn current(&self) -> StreamId {
        self.connects.last().map(|(id, _, _)| *id).unwrap()
    }

    /// Everything written to `stream`, concatenated.
    pub(crate) fn written(&self, stream: StreamId) -> Vec<u8> {
        self.writes
            .iter()
            .filter(|(id, _)| *id == stream)
            .flat_map(|(_, bytes)| bytes.iter().copied())
            .collect()
    }

    pub(crate) fn write_count(&self) -> usize {
        self.writes.len()
    }

    pub(crate) fn closed(&self) -> &[StreamId] {
        &self.closed
    }
}

impl EventEngine for ScriptedEngine {
    fn set_panic_handler(&mut self, handler: PanicHandler) {
        self.panic_handler = Some(handler);
    }

    fn new_stream(&mut self) -> StreamId {
        self.created += 1;
        let id = StreamId::new(self.created);
        self.streams.insert(id, Vec::new());
        id
    }

    fn add_listener(
        &mut self,
        stream: StreamId,
        listener: Weak<dyn StreamListener>,
    ) -> Result<(), TransportError> {
        self.streams
            .get_mut(&stream)
            .ok_or_else(|| TransportError::unknown_stream(stream))?
            .push(listener);
        Ok(())
    }

    fn connect(&mut self, stream: StreamId, host: &str, port: u16) -> Result<(), TransportError> {
        if !self.streams.contains_key(&stream) {
            return Err(TransportError::unknown_stream(stream));
        }
        self.connects.push((stream, host.to_owned(), port));
        Ok(())
    }

    fn write(&mut self, stream: StreamId, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.streams.contains_key(&stream) {
            return Err(TransportError::unknown_stream(stream));
        }
        self.writes.push((stream, bytes.to_vec()));
        Ok(())
    }

    fn close(&mut self, stream: StreamId) {
        if self.streams.remove(&stream).is_some() {
            self.closed.push(stream);
        }
    }

    fn update(&mut self) -> Vec<Dispatch> {
        if let (Some(message), Some(handler)) = (self.fatal.take(), &self.panic_handler) {
            handler(&message);
        }

        let mut due = Vec::new();
        while let Some((stream, event, stale)) = self.pending.pop_front() {
            let listeners = match self.streams.get(&stream) {
                Some(listeners) => listeners,
                None if stale => match self.retired.get(&stream) {
                    Some(listeners) => listeners,
                    None => continue,
                },
                None => continue,
            };
            for listener in listeners {
                due.push(Dispatch::new(stream, listener.clone(), event.clone()));
            }
            if matches!(event, StreamEvent::Disconnected) {
                if let Some(listeners) = self.streams.remove(&stream) {
                    self.retired.insert(stream, listeners);
                }
            }
        }
        due
    }

    fn stream_count(&self) -> usize {
        self.streams.len()
    }
}
