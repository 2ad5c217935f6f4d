//! A single long-lived worker thread that sleeps until signalled.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Owns a named thread that runs one registered action whenever it is
/// triggered, and optionally on a fixed poll interval as well.
///
/// The action never runs concurrently with itself: there is exactly one
/// worker thread, and triggers arriving while the action runs coalesce
/// into a single follow-up invocation.
pub struct TaskWorker {
    wake_tx: Sender<()>,
    shutdown: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl TaskWorker {
    pub fn start(
        name: &str,
        poll_interval: Option<Duration>,
        mut task: impl FnMut() + Send + 'static,
    ) -> Self {
        let (wake_tx, wake_rx) = bounded::<()>(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(wake_rx, thread_shutdown, poll_interval, &mut task))
            .expect("Failed to spawn worker thread");

        tracing::debug!("worker '{name}' started");

        Self {
            wake_tx,
            shutdown,
            thread_handle: Some(thread_handle),
        }
    }

    /// Wake the worker. Non-blocking and allocation-free, so this is safe
    /// to call from the audio thread. A trigger arriving while one is
    /// already pending is absorbed.
    #[inline]
    pub fn trigger(&self) {
        let _ = self.wake_tx.try_send(());
    }

    /// Ask the thread to finish and join it.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.wake_tx.try_send(());

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TaskWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(
    wake_rx: Receiver<()>,
    shutdown: Arc<AtomicBool>,
    poll_interval: Option<Duration>,
    task: &mut dyn FnMut(),
) {
    loop {
        match poll_interval {
            Some(interval) => match wake_rx.recv_timeout(interval) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return,
            },
            None => {
                if wake_rx.recv().is_err() {
                    return;
                }
            }
        }

        if shutdown.load(Ordering::SeqCst) {
            return;
        }

        task();
    }
}
