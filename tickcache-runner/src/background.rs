//! Background refresh loop.
//!
//! One named thread runs a cycle, then waits on a stop channel for the refresh
//! interval. The thread only holds a `Weak` handle between cycles, so dropping
//! the last `Arc<Orchestrator>` still runs `Drop` and stops the loop.

use crate::orchestrator::{lock, Orchestrator, OrchestratorError};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const LOOP_THREAD_NAME: &str = "tickcache-refresh";

pub(crate) struct LoopHandle {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    thread: JoinHandle<()>,
}

impl Orchestrator {
    /// Start the refresh loop. A second call while a loop is alive only warns.
    pub fn start_background_refresh(
        self: &Arc<Self>,
        interval: Duration,
    ) -> Result<(), OrchestratorError> {
        let mut slot = lock(&self.background);
        if let Some(handle) = slot.as_ref() {
            if !handle.thread.is_finished() {
                tracing::warn!("background refresh already running, ignoring start");
                return Ok(());
            }
        }

        let (stop_tx, stop_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let weak = Arc::downgrade(self);

        let thread = thread::Builder::new()
            .name(LOOP_THREAD_NAME.into())
            .spawn(move || refresh_loop(weak, interval, stop_rx, done_tx))?;

        tracing::info!(interval_secs = interval.as_secs(), "background refresh started");
        *slot = Some(LoopHandle {
            stop_tx,
            done_rx,
            thread,
        });
        Ok(())
    }

    /// Signal the loop and wait up to `timeout` for it to exit.
    ///
    /// An in-flight cycle is never interrupted; the stop takes effect at the
    /// next wait. Returns `true` when the loop confirmed its exit in time.
    pub fn stop_background_refresh(&self, timeout: Duration) -> bool {
        let Some(handle) = lock(&self.background).take() else {
            tracing::warn!("no background refresh running, nothing to stop");
            return false;
        };

        let _ = handle.stop_tx.send(());

        // Dropped from inside the loop thread: it will see the signal on its own.
        if handle.thread.thread().id() == thread::current().id() {
            return true;
        }

        match handle.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.thread.join().is_err() {
                    tracing::error!("background refresh thread panicked");
                }
                tracing::info!("background refresh stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    "background refresh did not stop in time, detaching"
                );
                false
            }
        }
    }

    pub fn is_background_running(&self) -> bool {
        lock(&self.background)
            .as_ref()
            .is_some_and(|h| !h.thread.is_finished())
    }
}

fn refresh_loop(
    orchestrator: Weak<Orchestrator>,
    interval: Duration,
    stop_rx: Receiver<()>,
    done_tx: Sender<()>,
) {
    loop {
        match orchestrator.upgrade() {
            Some(orch) => {
                orch.refresh_cycle();
            }
            None => break,
        }

        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    tracing::info!("background refresh loop exiting");
    let _ = done_tx.send(());
}
