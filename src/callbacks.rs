//! Dedicated thread for user-facing callbacks.
//!
//! Completion and progress callbacks never run on the thread that drives the
//! protocols. They are posted here and executed in order on a single worker
//! thread, so user code can block or call back into the engine without
//! stalling timeouts.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, ThreadId};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::error::LinkError;

type Job = Box<dyn FnOnce() + Send>;

enum Task {
    Run(Job),
    Flush(oneshot::Sender<()>),
}

/// Single-threaded FIFO executor for callbacks.
///
/// The worker thread exits once the executor is dropped and every posted
/// job has run.
pub struct CallbackExecutor {
    tx: UnboundedSender<Task>,
    worker: ThreadId,
}

impl CallbackExecutor {
    /// Start the worker thread.
    pub fn spawn() -> Result<Self, LinkError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = thread::Builder::new()
            .name("waylink-callbacks".into())
            .spawn(move || run(rx))?;

        Ok(Self {
            tx,
            worker: handle.thread().id(),
        })
    }

    /// Queue `job` behind every previously posted job.
    pub fn post<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Task::Run(Box::new(job))).is_err() {
            warn!("callback worker stopped, dropping callback");
        }
    }

    /// Block until every job posted before this call has run.
    ///
    /// Returns `false` without waiting when called from the worker itself.
    /// Must not be called from inside an async runtime.
    pub fn flush(&self) -> bool {
        if self.is_current_thread() {
            return false;
        }
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Task::Flush(done_tx)).is_err() {
            return false;
        }
        done_rx.blocking_recv().is_ok()
    }

    /// Whether the caller is running on the callback worker.
    pub fn is_current_thread(&self) -> bool {
        thread::current().id() == self.worker
    }
}

fn run(mut rx: UnboundedReceiver<Task>) {
    while let Some(task) = rx.blocking_recv() {
        match task {
            Task::Run(job) => {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!("user callback panicked");
                }
            }
            Task::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("callback worker exiting");
}
