//! Background engine driver.
//!
//! An [`EngineDriver`] owns the one thread that polls an [`EventEngine`]. The
//! engine lives behind a re-entrant lock shared through [`EngineHandle`]s;
//! every client built on the driver takes that same lock before touching its
//! stream or its inbound buffer. Listeners run on the polling thread while the
//! lock is held, so they may call back into the engine.

use crate::error::ClientError;
use parking_lot::ReentrantMutex;
use redial_transport::{EventEngine, PanicHandler, TcpEngine, TcpEngineConfig};
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Shared access to an engine and the lock that serializes it.
pub struct EngineHandle<E> {
    shared: Arc<ReentrantMutex<RefCell<E>>>,
}

impl<E: EventEngine> EngineHandle<E> {
    /// Wraps an engine without starting a polling thread.
    ///
    /// Call [`poll_once`](Self::poll_once) to drive it manually, or use
    /// [`EngineDriver::start`] for a background poller.
    #[must_use]
    pub fn new(engine: E) -> Self {
        Self {
            shared: Arc::new(ReentrantMutex::new(RefCell::new(engine))),
        }
    }

    /// Runs `f` with exclusive access to the engine.
    ///
    /// # Panics
    /// Panics if called from inside another `with_engine` closure on the same
    /// thread.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        let guard = self.shared.lock();
        let mut engine = guard.borrow_mut();
        f(&mut engine)
    }

    /// Runs `f` while holding the shared lock.
    pub fn with_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.shared.lock();
        f()
    }

    /// Runs one polling iteration and delivers every due event.
    ///
    /// Returns the number of events delivered.
    pub fn poll_once(&self) -> usize {
        let guard = self.shared.lock();
        // The borrow ends before delivery so listeners can reach the engine.
        let due = guard.borrow_mut().update();

        let mut delivered = 0;
        for dispatch in due {
            if dispatch.deliver() {
                delivered += 1;
            }
        }
        delivered
    }
}

impl<E> Clone for EngineHandle<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E> fmt::Debug for EngineHandle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle").finish_non_exhaustive()
    }
}

/// Configuration for [`EngineDriver`].
#[derive(Clone)]
pub struct DriverConfig {
    /// Pause between polling iterations.
    pub poll_interval: Duration,
    /// Name of the polling thread.
    pub thread_name: String,
    /// Handler for fatal engine failures; defaults to logging and aborting.
    pub panic_handler: Option<PanicHandler>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            thread_name: "redial-driver".to_owned(),
            panic_handler: None,
        }
    }
}

impl DriverConfig {
    /// Sets the pause between polling iterations.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the polling thread name.
    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Replaces the fatal failure handler.
    #[must_use]
    pub fn panic_handler(mut self, handler: PanicHandler) -> Self {
        self.panic_handler = Some(handler);
        self
    }
}

impl fmt::Debug for DriverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverConfig")
            .field("poll_interval", &self.poll_interval)
            .field("thread_name", &self.thread_name)
            .field("panic_handler", &self.panic_handler.is_some())
            .finish()
    }
}

/// Owns the polling thread for one engine.
///
/// Dropping the driver stops the thread and waits for it to exit; clients
/// still holding an [`EngineHandle`] keep working but receive no more events.
pub struct EngineDriver<E: EventEngine> {
    handle: EngineHandle<E>,
    quit: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl<E: EventEngine> EngineDriver<E> {
    /// Installs the panic handler on `engine` and starts polling it.
    ///
    /// # Errors
    /// Returns `ClientError::Io` if the thread cannot be spawned.
    pub fn start(mut engine: E, config: DriverConfig) -> Result<Self, ClientError> {
        let panic_handler = config
            .panic_handler
            .clone()
            .unwrap_or_else(|| Arc::new(abort_on_panic));
        engine.set_panic_handler(panic_handler);

        let handle = EngineHandle::new(engine);
        let quit = Arc::new(AtomicBool::new(false));

        let thread = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn({
                let handle = handle.clone();
                let quit = Arc::clone(&quit);
                let interval = config.poll_interval;
                move || {
                    while !quit.load(Ordering::Acquire) {
                        handle.poll_once();
                        thread::sleep(interval);
                    }
                }
            })?;

        tracing::info!(
            thread = %config.thread_name,
            interval = ?config.poll_interval,
            "engine driver started"
        );

        Ok(Self {
            handle,
            quit,
            thread: Some(thread),
        })
    }

    /// Returns the handle clients are built on.
    #[must_use]
    pub fn handle(&self) -> &EngineHandle<E> {
        &self.handle
    }

    /// Returns true until the driver has been shut down.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stops the polling thread and waits for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        self.quit.store(true, Ordering::Release);
        if thread.join().is_err() {
            tracing::error!("engine driver thread panicked");
        } else {
            tracing::info!("engine driver stopped");
        }
    }
}

impl EngineDriver<TcpEngine> {
    /// Starts a driver over a fresh [`TcpEngine`].
    ///
    /// # Errors
    /// Returns an error if the engine runtime or the polling thread cannot be
    /// started.
    pub fn tcp(engine_config: TcpEngineConfig, config: DriverConfig) -> Result<Self, ClientError> {
        Self::start(TcpEngine::new(engine_config)?, config)
    }
}

impl<E: EventEngine> Drop for EngineDriver<E> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn abort_on_panic(message: &str) {
    tracing::error!(%message, "engine panic");
    std::process::abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedEngine;
    use parking_lot::Mutex;
    use redial_transport::{StreamEvent, StreamId, StreamListener};
    use std::sync::Weak;
    use std::time::Instant;

    #[derive(Default)]
    struct Counter {
        connects: Mutex<u32>,
    }

    impl StreamListener for Counter {
        fn on_connected(&self, _stream: StreamId) {
            *self.connects.lock() += 1;
        }
    }

    fn listen(handle: &EngineHandle<ScriptedEngine>) -> (StreamId, Arc<Counter>) {
        let counter = Arc::new(Counter::default());
        let weak: Weak<dyn StreamListener> = Arc::downgrade(&counter) as Weak<dyn StreamListener>;
        let stream = handle.with_engine(|engine| {
            let stream = engine.new_stream();
            engine.add_listener(stream, weak).unwrap();
            stream
        });
        (stream, counter)
    }

    #[test]
    fn test_driver_config_default() {
        let config = DriverConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert_eq!(config.thread_name, "redial-driver");
        assert!(config.panic_handler.is_none());
    }

    #[test]
    fn test_driver_config_debug() {
        let config = DriverConfig::default().panic_handler(Arc::new(|_: &str| {}));
        let debug_str = format!("{:?}", config);
        assert!(debug_str.contains("DriverConfig"));
        assert!(debug_str.contains("panic_handler: true"));
    }

    #[test]
    fn test_poll_once_delivers_pending_events() {
        let handle = EngineHandle::new(ScriptedEngine::default());
        let (stream, counter) = listen(&handle);

        assert_eq!(handle.poll_once(), 0);
        handle.with_engine(|engine| engine.push(stream, StreamEvent::Connected));
        assert_eq!(handle.poll_once(), 1);
        assert_eq!(*counter.connects.lock(), 1);
    }

    #[test]
    fn test_listener_may_reenter_engine() {
        struct Reopener {
            handle: EngineHandle<ScriptedEngine>,
        }

        impl StreamListener for Reopener {
            fn on_disconnected(&self, _stream: StreamId) {
                self.handle.with_engine(|engine| {
                    engine.new_stream();
                });
            }
        }

        let handle = EngineHandle::new(ScriptedEngine::default());
        let reopener = Arc::new(Reopener {
            handle: handle.clone(),
        });
        let weak: Weak<dyn StreamListener> = Arc::downgrade(&reopener) as Weak<dyn StreamListener>;
        let stream = handle.with_engine(|engine| {
            let stream = engine.new_stream();
            engine.add_listener(stream, weak).unwrap();
            engine.push(stream, StreamEvent::Disconnected);
            stream
        });

        assert_eq!(handle.poll_once(), 1);
        handle.with_engine(|engine| {
            assert_eq!(engine.created(), 2);
            assert!(!engine.is_live(stream));
        });
    }

    #[test]
    fn test_background_thread_polls_until_shutdown() {
        let driver = EngineDriver::start(
            ScriptedEngine::default(),
            DriverConfig::default().thread_name("driver-test"),
        )
        .unwrap();
        assert!(driver.is_running());

        let handle = driver.handle().clone();
        let (stream, counter) = listen(&handle);
        handle.with_engine(|engine| engine.push(stream, StreamEvent::Connected));

        let deadline = Instant::now() + Duration::from_secs(5);
        while *counter.connects.lock() == 0 {
            assert!(Instant::now() < deadline, "driver never polled");
            thread::sleep(Duration::from_millis(1));
        }

        driver.shutdown();
        handle.with_engine(|engine| engine.push(stream, StreamEvent::Connected));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(*counter.connects.lock(), 1);
    }

    #[test]
    fn test_custom_panic_handler_is_installed() {
        let reported = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&reported);
        let config = DriverConfig::default().panic_handler(Arc::new(move |message: &str| {
            sink.lock().push(message.to_owned());
        }));

        let driver = EngineDriver::start(ScriptedEngine::default(), config).unwrap();
        driver
            .handle()
            .with_engine(|engine| engine.fail_fatally("socket table corrupted"));

        let deadline = Instant::now() + Duration::from_secs(5);
        while reported.lock().is_empty() {
            assert!(Instant::now() < deadline, "panic handler never ran");
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(*reported.lock(), vec!["socket table corrupted".to_owned()]);
    }
}
