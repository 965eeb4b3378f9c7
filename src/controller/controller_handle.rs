//! Controller Handle - lifecycle of the controller thread
//!
//! Spawns the thread that owns gilrs and the [`InputRouter`], waits until the
//! collector reports that it is running and stops it again on shutdown.

use super::event_collector::{open_gilrs, CollectorError, CollectorSettings, EventCollector};
use super::haptics::RumblePattern;
use crate::mapping::InputRouter;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Configuration for the controller thread
#[derive(Clone, Debug)]
pub struct ControllerSettings {
    pub collector: CollectorSettings,

    /// How long `spawn` waits for gilrs to come up
    pub startup_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            collector: CollectorSettings::default(),
            startup_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Error from the event collection subsystem
    #[error("Collector error: {0}")]
    CollectorError(#[from] CollectorError),

    /// The thread did not report back in time or could not be spawned
    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("Controller thread panicked")]
    ThreadPanicked,
}

/// Running controller thread
pub struct ControllerHandle {
    thread: JoinHandle<()>,
    cancel: CancellationToken,
}

impl ControllerHandle {
    /// Moves the router onto a new controller thread and starts collecting.
    ///
    /// If gilrs cannot be opened, the router is shut down (unloading its
    /// active module) before the error is returned.
    pub fn spawn(
        router: InputRouter,
        rumble_queue: mpsc::Receiver<RumblePattern>,
        settings: ControllerSettings,
        cancel: CancellationToken,
    ) -> Result<Self, ControllerError> {
        info!("Initializing controller thread");
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), CollectorError>>();
        let token = cancel.clone();
        let collector_settings = settings.collector.clone();

        let thread = std::thread::Builder::new()
            .name("controller".into())
            .spawn(move || {
                let mut router = router;
                let gilrs = match open_gilrs() {
                    Ok(gilrs) => gilrs,
                    Err(e) => {
                        router.shutdown();
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                let mut collector =
                    EventCollector::create(gilrs, router, rumble_queue, collector_settings)
                        .initialize();
                collector.run_collection_loop(&token);
                debug!("Controller thread finished");
            })
            .map_err(|e| ControllerError::InitializationError(e.to_string()))?;

        match ready_rx.recv_timeout(settings.startup_timeout) {
            Ok(Ok(())) => {
                info!("Controller system initialized successfully");
                Ok(Self { thread, cancel })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e.into())
            }
            Err(e) => {
                error!("Controller thread did not start: {}", e);
                cancel.cancel();
                Err(ControllerError::InitializationError(e.to_string()))
            }
        }
    }

    /// Cancels the collector and waits for the thread, which unloads the active module on exit
    pub fn stop(self) -> Result<(), ControllerError> {
        self.cancel.cancel();
        self.thread
            .join()
            .map_err(|_| ControllerError::ThreadPanicked)
    }
}
