//! Background age sweep for the client cache

use std::{sync::Weak, time::Duration};

use parking_lot::Mutex;
use tokio::{runtime::Handle, sync::mpsc, task::JoinHandle, time};
use tracing::debug;

use crate::{cache::CacheState, CacheError, Result};

/// Handle to a running sweep task
pub(crate) struct Sweeper {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn a task that sweeps the cache every `interval`
    ///
    /// The task holds only a weak reference and exits once the cache is gone.
    pub(crate) fn spawn<V: Send + 'static>(
        state: Weak<Mutex<CacheState<V>>>,
        interval: Duration,
        max_age: Duration,
    ) -> Result<Self> {
        if interval.is_zero() {
            return Err(CacheError::InvalidInterval);
        }
        let runtime = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let task = runtime.spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + interval, interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(state) = state.upgrade() else {
                            break;
                        };
                        let removed = state.lock().sweep(max_age);
                        if removed > 0 {
                            debug!(removed, max_age_ms = max_age.as_millis() as u64, "Swept expired cache entries");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Cache cleanup task shutting down");
                        break;
                    }
                }
            }
        });

        debug!(interval_ms = interval.as_millis() as u64, "Cache cleanup task started");
        Ok(Self { shutdown_tx, task })
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the task to exit; dropping the sender also ends the loop
    pub(crate) fn stop(self) {
        let _ = self.shutdown_tx.try_send(());
    }
}
