//! Private execution context of the remote bridge
//!
//! A dedicated thread runs a current-thread tokio runtime. The event thread
//! submits futures to it and blocks on the result with a timeout, so a hung
//! TV can never stall controller handling for longer than that timeout.

use super::client::RemoteClient;
use super::RemoteError;
use std::future::Future;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::runtime::{Builder, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Client handle. Only tasks running inside the context write to it.
pub(crate) type ClientSlot = Arc<tokio::sync::Mutex<Option<Box<dyn RemoteClient>>>>;

pub(crate) struct PrivateContext {
    handle: Handle,
    cancel: CancellationToken,
    done_rx: mpsc::Receiver<()>,
    thread: Option<JoinHandle<()>>,
    client: ClientSlot,
}

impl PrivateContext {
    /// Spawns the runtime thread and waits at most `ready_timeout` for it
    pub(crate) fn start(ready_timeout: Duration) -> Result<Self, RemoteError> {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let (ready_tx, ready_rx) = mpsc::channel::<Handle>();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("remote-bridge".into())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("remote: failed to build runtime: {}", e);
                        return;
                    }
                };
                if ready_tx.send(runtime.handle().clone()).is_err() {
                    return;
                }
                runtime.block_on(token.cancelled());
                drop(runtime);
                let _ = done_tx.send(());
            })
            .map_err(|e| RemoteError::Context(e.to_string()))?;

        let handle = match ready_rx.recv_timeout(ready_timeout) {
            Ok(handle) => handle,
            Err(e) => {
                cancel.cancel();
                return Err(RemoteError::Context(format!("runtime not ready: {}", e)));
            }
        };
        debug!("remote: execution context started");

        Ok(Self {
            handle,
            cancel,
            done_rx,
            thread: Some(thread),
            client: Arc::new(tokio::sync::Mutex::new(None)),
        })
    }

    pub(crate) fn client(&self) -> ClientSlot {
        self.client.clone()
    }

    /// Runs `task` inside the context and waits at most `timeout` for its result.
    /// A task that times out is aborted.
    pub(crate) fn submit<T, F>(&self, task: F, timeout: Duration) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = mpsc::sync_channel(1);
        let join = self.handle.spawn(async move {
            let _ = result_tx.send(task.await);
        });
        match result_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                join.abort();
                Err(RemoteError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(RemoteError::ContextStopped),
        }
    }

    /// Runs `task` inside the context without waiting for it
    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(task);
    }

    /// Drops the client inside the runtime, then stops the thread. Waits at most
    /// `timeout` for each step; a thread that does not finish is left behind.
    pub(crate) fn stop(mut self, timeout: Duration) {
        let client = self.client.clone();
        if let Err(e) = self.submit(
            async move {
                client.lock().await.take();
                Ok(())
            },
            timeout,
        ) {
            warn!("remote: failed to release client: {}", e);
        }

        self.cancel.cancel();
        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(thread) = self.thread.take() {
                    if thread.join().is_err() {
                        warn!("remote: execution context panicked");
                    }
                }
                debug!("remote: execution context stopped");
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("remote: execution context did not stop within {:?}", timeout);
            }
        }
    }
}

impl Drop for PrivateContext {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
