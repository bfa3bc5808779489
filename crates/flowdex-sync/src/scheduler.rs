//! Recurring-task scheduler.
//!
//! Runs a named async task on a fixed interval. Each tick runs to
//! completion before the next interval sleep begins, so ticks never
//! overlap by construction; no locking is involved.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::debug;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::IndexerResult;

pub struct AsyncIntervalScheduler {
    name: String,
    interval: Duration,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncIntervalScheduler {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts the recurring loop. Idempotent: calling `start` while already
    /// running is a no-op. Tick errors are logged at debug level and never
    /// stop the loop; transient failures are expected and self-heal on a
    /// later tick.
    pub fn start<F, Fut>(&self, tick: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = IndexerResult<()>> + Send,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let name = self.name.clone();
        let interval = self.interval;
        let running = self.running.clone();
        debug!("starting scheduler: {name}");
        let handle = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                if let Err(e) = tick().await {
                    debug!("{name} tick failed: {e}");
                }
                sleep(interval).await;
            }
        });
        *self.handle.lock().expect("scheduler handle lock poisoned") = Some(handle);
    }

    /// Stops the loop, preventing any new tick from starting. Idempotent.
    /// Background work already spawned by a tick (e.g. sealing
    /// subscriptions) is not cancelled; those tasks self-terminate.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        debug!("stopping scheduler: {}", self.name);
        if let Some(handle) = self
            .handle
            .lock()
            .expect("scheduler handle lock poisoned")
            .take()
        {
            handle.abort();
        }
    }
}

impl Drop for AsyncIntervalScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
