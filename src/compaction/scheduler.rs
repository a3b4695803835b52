//! Compaction Scheduler
//!
//! Runs compaction cycles on a fixed interval on a dedicated thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;

use crate::engine::EngineInner;
use crate::error::{Result, VaultError};

use super::run_cycle;

/// Handle to the background compaction thread
pub(crate) struct CompactionScheduler {
    /// Dropping the sender wakes the thread up for shutdown
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

impl CompactionScheduler {
    pub(crate) fn start(inner: Arc<EngineInner>, interval: Duration) -> Result<Self> {
        let (shutdown, shutdown_rx) = channel::bounded(1);

        let handle = thread::Builder::new()
            .name("logvault-compactor".to_string())
            .spawn(move || run(inner, interval, shutdown_rx))?;

        tracing::debug!(interval_ms = interval.as_millis() as u64, "compactor started");
        Ok(Self { shutdown, handle })
    }

    /// Stop the thread, waiting for an in-flight cycle to finish or abort.
    ///
    /// The engine's `closed` flag must already be set so the cycle cancels
    /// at its next checkpoint.
    pub(crate) fn shutdown(self) {
        let Self { shutdown, handle } = self;
        drop(shutdown);

        if handle.join().is_err() {
            tracing::error!("compactor thread panicked");
        }
    }
}

fn run(inner: Arc<EngineInner>, interval: Duration, shutdown: Receiver<()>) {
    let ticker = channel::tick(interval);

    loop {
        select! {
            recv(ticker) -> _ => match run_cycle(&inner, &inner.closed) {
                Ok(stats) if stats.committed => {
                    tracing::debug!(reclaimed = stats.bytes_reclaimed(), "scheduled compaction finished");
                }
                Ok(_) => {}
                Err(VaultError::Compaction(reason)) => {
                    tracing::warn!(%reason, "scheduled compaction aborted");
                }
                Err(e) => {
                    tracing::error!(error = %e, "scheduled compaction failed");
                }
            },
            recv(shutdown) -> _ => break,
        }
    }

    tracing::debug!("compactor stopped");
}
