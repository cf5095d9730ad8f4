//! Background worker with cooperative cancellation.
//!
//! Each engine loop runs as one tokio task owned by a `Worker`. Starting an
//! already-running worker is a no-op; stopping cancels the task's token and
//! waits a bounded time for it to exit before marking it stopped regardless.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default bounded wait used when stopping a loop.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owner of one cancellable background task.
pub struct Worker {
    name: &'static str,
    running: Mutex<Option<Running>>,
}

impl Worker {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            running: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Spawn the task built by `make`. Returns `false` without spawning if
    /// the previous task is still alive.
    pub fn start<F, Fut>(&self, make: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.spawn(CancellationToken::new(), make)
    }

    /// Like [`Worker::start`], but the task's token is a child of `parent`:
    /// cancelling `parent` stops the task as well.
    pub fn start_under<F, Fut>(&self, parent: &CancellationToken, make: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.spawn(parent.child_token(), make)
    }

    fn spawn<F, Fut>(&self, token: CancellationToken, make: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.lock();
        if let Some(current) = running.as_ref() {
            if !current.handle.is_finished() {
                debug!(worker = self.name, "Worker already running");
                return false;
            }
        }

        let handle = tokio::spawn(make(token.clone()));
        *running = Some(Running { token, handle });
        debug!(worker = self.name, "Worker started");
        true
    }

    /// Signal the task to stop and wait up to `timeout` for it to exit.
    ///
    /// Returns `true` if the task exited within the timeout. Either way the
    /// worker is considered stopped afterwards. Stopping an idle worker is a
    /// no-op that returns `true`.
    pub async fn stop(&self, timeout: Duration) -> bool {
        let running = self.lock().take();
        let Some(Running { token, mut handle }) = running else {
            return true;
        };

        token.cancel();
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => {
                debug!(worker = self.name, "Worker stopped");
                true
            }
            Ok(Err(e)) => {
                warn!(worker = self.name, error = %e, "Worker task ended abnormally");
                true
            }
            Err(_) => {
                warn!(
                    worker = self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Worker did not stop in time, aborting"
                );
                handle.abort();
                false
            }
        }
    }

    /// Whether a task is alive. A task that ended on its own reports `false`.
    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .map(|r| !r.handle.is_finished())
            .unwrap_or(false)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Sleep for `period`, returning early with `false` if `token` is cancelled.
pub async fn sleep_or_cancel(token: &CancellationToken, period: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(period) => true,
    }
}
