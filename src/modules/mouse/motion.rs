//! Mouse motion integrator
//!
//! The event callback stores the latest stick deflections in [`MotionState`];
//! a worker thread turns them into relative pointer and wheel deltas at a fixed
//! rate. The two sides share the state through a mutex and never hold it while
//! talking to the output sink.

use super::MouseOptions;
use crate::mapping::{InputKey, ModuleError};
use crate::output::{MouseButton, MouseSink};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_UPDATE_RATE: f64 = 120.0;

/// Shared state between the event callback and the motion worker
#[derive(Debug, Clone, PartialEq)]
pub struct MotionState {
    /// Pointer velocity in `-1.0..=1.0` per component, deadzone already applied
    pub velocity: (f64, f64),
    /// Wheel velocity per component, scroll sensitivity already applied
    pub scroll: (f64, f64),
    /// Speed multiplier driven by the boost and throttle triggers
    pub multiplier: f64,
    /// Mouse buttons currently held down, keyed by the control holding them
    pub held: HashMap<InputKey, MouseButton>,
}

impl Default for MotionState {
    fn default() -> Self {
        Self {
            velocity: (0.0, 0.0),
            scroll: (0.0, 0.0),
            multiplier: 1.0,
            held: HashMap::new(),
        }
    }
}

/// Output of one integration step
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Tick {
    pub movement: Option<(f64, f64)>,
    pub scroll: Option<(f64, f64)>,
}

/// One integration step.
///
/// `acceleration = 1 + speed * (acceleration - 1) * sensitivity * multiplier`,
/// where `speed` is the magnitude of the velocity vector. Returns no movement
/// while the stick rests and no scroll while the wheel stick rests.
pub fn tick(state: &MotionState, options: &MouseOptions) -> Tick {
    let (vx, vy) = state.velocity;
    let speed = vx.hypot(vy);
    let movement = (speed > 0.0).then(|| {
        let acceleration = 1.0
            + speed * (options.acceleration - 1.0) * options.sensitivity * state.multiplier;
        (vx * acceleration, vy * acceleration)
    });
    let scroll = (state.scroll != (0.0, 0.0)).then_some(state.scroll);
    Tick { movement, scroll }
}

struct Worker {
    stop_tx: mpsc::Sender<()>,
    done_rx: mpsc::Receiver<()>,
    handle: JoinHandle<()>,
}

/// Owns the motion state and the periodic worker
pub struct MotionIntegrator {
    state: Arc<Mutex<MotionState>>,
    mouse: Arc<dyn MouseSink>,
    options: MouseOptions,
    worker: Option<Worker>,
}

impl MotionIntegrator {
    pub fn new(mouse: Arc<dyn MouseSink>, options: MouseOptions) -> Self {
        Self {
            state: Arc::new(Mutex::new(MotionState::default())),
            mouse,
            options,
            worker: None,
        }
    }

    pub fn state(&self) -> &Arc<Mutex<MotionState>> {
        &self.state
    }

    pub fn snapshot(&self) -> MotionState {
        self.state.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    fn period(&self) -> Duration {
        let rate = if self.options.movement_update_rate > 0.0 {
            self.options.movement_update_rate
        } else {
            warn!(
                "mouse: invalid update rate {}, using {}",
                self.options.movement_update_rate, DEFAULT_UPDATE_RATE
            );
            DEFAULT_UPDATE_RATE
        };
        Duration::from_secs_f64(1.0 / rate)
    }

    /// Starts the worker. A running worker is left alone.
    pub fn start(&mut self) -> Result<(), ModuleError> {
        if self.worker.is_some() {
            return Ok(());
        }

        let period = self.period();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let state = self.state.clone();
        let mouse = self.mouse.clone();
        let options = self.options.clone();

        let handle = std::thread::Builder::new()
            .name("mouse-motion".into())
            .spawn(move || {
                debug!("mouse: motion worker started ({:?} period)", period);
                // Waiting on the stop channel doubles as the tick sleep
                while let Err(RecvTimeoutError::Timeout) = stop_rx.recv_timeout(period) {
                    let step = tick(&state.lock(), &options);
                    if let Some((dx, dy)) = step.movement {
                        if let Err(e) = mouse.move_by(dx, dy) {
                            warn!("mouse: failed to move pointer: {}", e);
                        }
                    }
                    if let Some((dx, dy)) = step.scroll {
                        if let Err(e) = mouse.scroll(dx, dy) {
                            warn!("mouse: failed to scroll: {}", e);
                        }
                    }
                }
                debug!("mouse: motion worker stopped");
                let _ = done_tx.send(());
            })
            .map_err(|e| ModuleError::ThreadError(e.to_string()))?;

        self.worker = Some(Worker {
            stop_tx,
            done_rx,
            handle,
        });
        info!("mouse: motion worker running");
        Ok(())
    }

    /// Signals the worker and waits at most `timeout` for it. A worker that does
    /// not finish in time is left to exit on its own.
    pub fn stop(&mut self, timeout: Duration) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.stop_tx.send(());
        match worker.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    warn!("mouse: motion worker panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("mouse: motion worker did not stop within {:?}", timeout);
            }
        }
    }

    /// Releases held buttons and zeroes the motion state
    pub fn reset(&self) {
        let held: Vec<MouseButton> = {
            let mut state = self.state.lock();
            let held = state.held.drain().map(|(_, button)| button).collect();
            state.velocity = (0.0, 0.0);
            state.scroll = (0.0, 0.0);
            state.multiplier = 1.0;
            held
        };
        for button in held {
            if let Err(e) = self.mouse.release(button) {
                warn!("mouse: failed to release {:?}: {}", button, e);
            }
        }
    }
}

impl Drop for MotionIntegrator {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::testing::{MouseCall, RecordingMouse};

    fn assert_close(actual: (f64, f64), expected: (f64, f64)) {
        assert!(
            (actual.0 - expected.0).abs() < 1e-9 && (actual.1 - expected.1).abs() < 1e-9,
            "{:?} != {:?}",
            actual,
            expected
        );
    }

    #[test]
    fn resting_stick_produces_nothing() {
        assert_eq!(
            tick(&MotionState::default(), &MouseOptions::default()),
            Tick::default()
        );
    }

    #[test]
    fn acceleration_grows_with_deflection() {
        let state = MotionState {
            velocity: (0.6, 0.0),
            ..Default::default()
        };
        let step = tick(&state, &MouseOptions::default());
        assert_close(step.movement.unwrap(), (2.04, 0.0));
        assert_eq!(step.scroll, None);
    }

    #[test]
    fn multiplier_and_sensitivity_scale_acceleration() {
        let state = MotionState {
            velocity: (0.0, 0.5),
            multiplier: 2.0,
            ..Default::default()
        };
        let options = MouseOptions {
            sensitivity: 0.5,
            ..Default::default()
        };
        // 1 + 0.5 * 4 * 0.5 * 2 = 3
        assert_close(tick(&state, &options).movement.unwrap(), (0.0, 1.5));
    }

    #[test]
    fn scroll_is_emitted_unscaled_by_acceleration() {
        let state = MotionState {
            scroll: (0.0, -0.8),
            ..Default::default()
        };
        let step = tick(&state, &MouseOptions::default());
        assert_eq!(step.movement, None);
        assert_eq!(step.scroll, Some((0.0, -0.8)));
    }

    #[test]
    fn worker_moves_pointer_until_stopped() {
        let mouse = Arc::new(RecordingMouse::default());
        let mut integrator = MotionIntegrator::new(mouse.clone(), MouseOptions::default());
        integrator.state().lock().velocity = (0.6, 0.0);

        integrator.start().unwrap();
        assert!(integrator.is_running());
        std::thread::sleep(Duration::from_millis(60));
        integrator.stop(Duration::from_millis(100));
        assert!(!integrator.is_running());

        let moves = mouse.moves();
        assert!(!moves.is_empty());
        for step in &moves {
            assert_close(*step, (2.04, 0.0));
        }
        let count = moves.len();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(mouse.moves().len(), count);
    }

    /// Sink that blocks the worker inside its first move
    struct StallingMouse;

    impl MouseSink for StallingMouse {
        fn press(&self, _button: MouseButton) -> Result<(), crate::output::OutputError> {
            Ok(())
        }

        fn release(&self, _button: MouseButton) -> Result<(), crate::output::OutputError> {
            Ok(())
        }

        fn move_by(&self, _dx: f64, _dy: f64) -> Result<(), crate::output::OutputError> {
            std::thread::sleep(Duration::from_secs(2));
            Ok(())
        }

        fn scroll(&self, _dx: f64, _dy: f64) -> Result<(), crate::output::OutputError> {
            Ok(())
        }
    }

    #[test]
    fn stop_gives_up_on_a_stuck_worker() {
        let mut integrator = MotionIntegrator::new(Arc::new(StallingMouse), MouseOptions::default());
        integrator.state().lock().velocity = (1.0, 0.0);
        integrator.start().unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let started = std::time::Instant::now();
        integrator.stop(Duration::from_millis(100));
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(100), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(1), "{:?}", elapsed);
        assert!(!integrator.is_running());
    }

    #[test]
    fn reset_releases_held_buttons() {
        let mouse = Arc::new(RecordingMouse::default());
        let integrator = MotionIntegrator::new(mouse.clone(), MouseOptions::default());
        {
            let mut state = integrator.state().lock();
            state.held.insert(InputKey::Button(0), MouseButton::Left);
            state.velocity = (1.0, 1.0);
            state.multiplier = 0.2;
        }

        integrator.reset();
        integrator.reset();

        assert_eq!(mouse.calls(), vec![MouseCall::Release(MouseButton::Left)]);
        assert_eq!(integrator.snapshot(), MotionState::default());
    }
}
