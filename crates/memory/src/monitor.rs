//! Background memory monitor.
//!
//! One named thread per registry. The thread waits on a shutdown channel with
//! a timeout equal to the sampling interval, so stopping it never waits for
//! a full sleep. It holds only a weak reference to the registry and exits on
//! its own once the registry is dropped.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::config::MIN_MONITOR_INTERVAL;
use crate::ResourceRegistry;

/// Owner side of a running monitor thread.
pub(crate) struct MonitorHandle {
    stop_tx: Sender<()>,
    /// Disconnects when the monitor thread exits
    done_rx: Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Start the monitor thread for `registry`.
    pub(crate) fn spawn(
        registry: Weak<ResourceRegistry>,
        interval: Duration,
    ) -> io::Result<Self> {
        let interval = interval.max(MIN_MONITOR_INTERVAL);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(0);

        let thread = thread::Builder::new()
            .name("color-picker-memory-monitor".to_string())
            .spawn(move || {
                let _done = done_tx;
                run(registry, stop_rx, interval);
            })?;

        Ok(Self {
            stop_tx,
            done_rx,
            thread: Some(thread),
        })
    }

    /// Signal the thread to stop and wait at most `timeout` for it to exit.
    ///
    /// A thread that does not exit in time is detached.
    pub(crate) fn stop(mut self, timeout: Duration) {
        let _ = self.stop_tx.try_send(());

        let Some(thread) = self.thread.take() else {
            return;
        };

        // Shutdown requested from inside a monitor pass; joining would deadlock.
        if thread.thread().id() == thread::current().id() {
            return;
        }

        match self.done_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(?timeout, "memory monitor did not stop in time; detaching");
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if thread.join().is_err() {
                    tracing::warn!("memory monitor thread panicked");
                }
            }
        }
    }
}

/// Main monitor loop.
fn run(registry: Weak<ResourceRegistry>, stop_rx: Receiver<()>, interval: Duration) {
    tracing::info!(?interval, "memory monitor started");

    loop {
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let Some(strong) = registry.upgrade() else {
            break;
        };
        if strong.is_shut_down() {
            break;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| strong.run_monitor_pass())) {
            Ok(report) => {
                tracing::trace!(
                    pressure = report.pressure,
                    bytes_freed = report.bytes_freed,
                    reclaimed = report.reclaimed,
                    "monitor pass complete"
                );
            }
            Err(_) => tracing::warn!("monitor pass panicked; monitoring continues"),
        }
    }

    tracing::info!("memory monitor stopped");
}
