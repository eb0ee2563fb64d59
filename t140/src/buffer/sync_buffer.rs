//! Time-windowed text batching
//!
//! Keystrokes are collected for `buffer_time` (300 ms by default, per
//! RFC 4103 Section 5) and handed to the RTP sender as one batch, so fast
//! typing produces one packet per window instead of one per character.

use crate::worker::{StopSignal, WorkerThread};
use logging::Logger;
use network::{NetworkError, Result};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub const DEFAULT_BUFFER_TIME: Duration = Duration::from_millis(300);

#[derive(Default)]
struct SyncState {
    /// Written by the producer, not yet released
    pending: Vec<u8>,
    /// Released, waiting for the consumer
    batch: Vec<u8>,
    closed: bool,
}

struct SyncShared {
    state: Mutex<SyncState>,
    /// Signalled when pending data arrives or on close
    data_pending: Condvar,
    /// Signalled when a batch is released or on close
    batch_ready: Condvar,
}

impl SyncShared {
    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Producer/consumer buffer with a worker that releases pending text once
/// per buffer window.
pub struct TextSyncBuffer {
    shared: Arc<SyncShared>,
    buffer_time: Duration,
    worker: Mutex<Option<WorkerThread>>,
}

impl TextSyncBuffer {
    /// Creates the buffer and starts its worker thread.
    pub fn new(buffer_time: Duration, logger: Logger) -> Result<Self> {
        let shared = Arc::new(SyncShared {
            state: Mutex::new(SyncState::default()),
            data_pending: Condvar::new(),
            batch_ready: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker_logger = logger.clone();
        let worker = WorkerThread::spawn("text-sync", logger, move |signal| {
            run_worker(&worker_shared, buffer_time, &signal, &worker_logger)
        })?;

        Ok(Self {
            shared,
            buffer_time,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn buffer_time(&self) -> Duration {
        self.buffer_time
    }

    /// Appends text to the current window.
    ///
    /// # Errors
    ///
    /// [`NetworkError::Closed`] after [`close`](TextSyncBuffer::close).
    pub fn set_data(&self, data: &[u8]) -> Result<()> {
        let mut state = self.shared.lock();
        if state.closed {
            return Err(NetworkError::Closed);
        }
        if data.is_empty() {
            return Ok(());
        }
        state.pending.extend_from_slice(data);
        self.shared.data_pending.notify_all();
        Ok(())
    }

    /// Blocks until a batch is released. `None` once closed and drained.
    pub fn get_data(&self) -> Option<Vec<u8>> {
        let mut state = self.shared.lock();
        loop {
            if !state.batch.is_empty() {
                return Some(std::mem::take(&mut state.batch));
            }
            if state.closed {
                return None;
            }
            state = self
                .shared
                .batch_ready
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Waits at most `timeout` for a batch.
    ///
    /// # Returns
    /// * `Ok(Some(batch))` - Text released by the worker
    /// * `Ok(None)` - Nothing released within `timeout`
    /// * `Err(NetworkError::Closed)` - Closed and fully drained
    pub fn get_data_timeout(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if !state.batch.is_empty() {
                return Ok(Some(std::mem::take(&mut state.batch)));
            }
            if state.closed {
                return Err(NetworkError::Closed);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            state = self
                .shared
                .batch_ready
                .wait_timeout(state, remaining)
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .0;
        }
    }

    /// True while text is waiting in the current window or in an untaken batch.
    pub fn has_data(&self) -> bool {
        let state = self.shared.lock();
        !state.pending.is_empty() || !state.batch.is_empty()
    }

    /// Releases whatever is pending immediately and stops the worker.
    /// Consumers drain the final batch, then see the buffer as closed.
    pub fn close(&self) {
        {
            let mut state = self.shared.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let pending = std::mem::take(&mut state.pending);
            state.batch.extend_from_slice(&pending);
            self.shared.data_pending.notify_all();
            self.shared.batch_ready.notify_all();
        }

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(mut worker) = worker {
            let _ = worker.stop();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

impl Drop for TextSyncBuffer {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker(shared: &SyncShared, buffer_time: Duration, signal: &StopSignal, logger: &Logger) {
    logger.debug("Text sync worker started");

    loop {
        let state = shared.lock();
        let state = shared
            .data_pending
            .wait_while(state, |s| s.pending.is_empty() && !s.closed)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.closed || signal.is_stopped() {
            break;
        }

        // Hold the window open; close() cuts it short.
        let (mut state, _) = shared
            .data_pending
            .wait_timeout_while(state, buffer_time, |s| !s.closed)
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let pending = std::mem::take(&mut state.pending);
        state.batch.extend_from_slice(&pending);
        shared.batch_ready.notify_all();
        if state.closed {
            break;
        }
    }

    logger.debug("Text sync worker stopped");
}
