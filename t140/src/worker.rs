//! Named worker threads with cooperative shutdown

use logging::Logger;
use network::{NetworkError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// Shared stop flag polled by a worker loop.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lifecycle of a [`WorkerThread`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    /// Stop requested, loop not yet returned
    Stopping,
    Finished,
}

/// A named OS thread running a loop that checks its [`StopSignal`].
///
/// Dropping the handle stops and joins the thread.
pub struct WorkerThread {
    name: String,
    signal: StopSignal,
    handle: Option<JoinHandle<()>>,
    logger: Logger,
}

impl WorkerThread {
    /// Spawns `body`, handing it the stop signal.
    pub fn spawn<F>(name: &str, logger: Logger, body: F) -> Result<Self>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        let signal = StopSignal::new();
        let thread_signal = signal.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(thread_signal))
            .map_err(|e| {
                NetworkError::ThreadError(format!("Failed to spawn {} thread: {}", name, e))
            })?;

        logger.debug(&format!("Worker {} spawned", name));
        Ok(Self {
            name: name.to_string(),
            signal,
            handle: Some(handle),
            logger,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signal(&self) -> StopSignal {
        self.signal.clone()
    }

    pub fn state(&self) -> WorkerState {
        match &self.handle {
            Some(handle) if !handle.is_finished() => {
                if self.signal.is_stopped() {
                    WorkerState::Stopping
                } else {
                    WorkerState::Running
                }
            }
            _ => WorkerState::Finished,
        }
    }

    pub fn request_stop(&self) {
        self.signal.stop();
    }

    /// Requests a stop and waits for the loop to return.
    ///
    /// # Errors
    ///
    /// [`NetworkError::ThreadError`] if the worker panicked.
    pub fn stop(&mut self) -> Result<()> {
        self.signal.stop();
        self.join()
    }

    /// Waits for the loop to return on its own, without signalling it.
    pub fn join(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        handle.join().map_err(|_| {
            self.logger.error(&format!("Worker {} panicked", self.name));
            NetworkError::ThreadError(format!("{} thread panicked", self.name))
        })?;
        self.logger.debug(&format!("Worker {} joined", self.name));
        Ok(())
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
