//! [`VelocityPublisher`] – fixed-cadence re-send of the current command.
//!
//! The vehicle drops to a stop when it stops hearing commands, so while the
//! publisher is armed a dedicated timer thread re-publishes the current
//! [`VelocityCommand`] every period whether or not it changed.  Plans only
//! update the stored command; the timer owns the wire.
//!
//! Command, armed flag and output binding live under one lock.  The timer
//! publishes while holding it, so once [`VelocityPublisher::disarm_and_zero`]
//! returns no tick can publish the old value.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use teleop_middleware::{ErrorSink, Publication};
use teleop_types::{Message, TeleopError, VelocityCommand};
use tracing::{debug, error, info, warn};

struct PublisherState {
    command: VelocityCommand,
    armed: bool,
    output: Option<Arc<dyn Publication>>,
}

impl PublisherState {
    /// Publish the current command on the bound output, if any.
    fn send(&self, on_error: &ErrorSink) {
        if let Some(output) = &self.output {
            if let Err(e) = output.publish(Message::Twist(self.command.into())) {
                on_error(&e);
            }
        }
    }
}

struct TimerThread {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Holds the single current [`VelocityCommand`] and the timer that
/// re-publishes it.
pub struct VelocityPublisher {
    state: Arc<Mutex<PublisherState>>,
    timer: Mutex<Option<TimerThread>>,
    on_error: ErrorSink,
}

impl VelocityPublisher {
    /// Create an unbound, disarmed publisher.  Failed publishes are reported
    /// to `on_error`.
    pub fn new(on_error: ErrorSink) -> Self {
        Self {
            state: Arc::new(Mutex::new(PublisherState {
                command: VelocityCommand::ZERO,
                armed: false,
                output: None,
            })),
            timer: Mutex::new(None),
            on_error,
        }
    }

    /// Bind `output` and start ticking every `period`.
    ///
    /// Any previous binding is released first.  The command starts out
    /// zeroed and disarmed.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::Channel`] if the timer thread cannot be
    /// spawned; the publisher is left unbound.
    pub fn bind(&self, output: Arc<dyn Publication>, period: Duration) -> Result<(), TeleopError> {
        self.unbind();

        let topic = output.topic().to_string();
        {
            let mut state = self.state.lock();
            state.command = VelocityCommand::ZERO;
            state.armed = false;
            state.output = Some(Arc::clone(&output));
        }

        let (stop, stopped) = mpsc::channel();
        let shared = Arc::clone(&self.state);
        let on_error = Arc::clone(&self.on_error);
        let spawned = thread::Builder::new()
            .name("velocity-publisher".into())
            .spawn(move || run_timer(&shared, &on_error, &stopped, period));

        match spawned {
            Ok(handle) => {
                *self.timer.lock() = Some(TimerThread { stop, handle });
                info!(topic = %topic, period_ms = period.as_millis() as u64, "velocity publisher bound");
                Ok(())
            }
            Err(e) => {
                self.state.lock().output = None;
                output.shutdown();
                Err(TeleopError::Channel(format!("velocity timer for {topic}: {e}")))
            }
        }
    }

    /// Stop the timer and release the output.  After this returns no
    /// further tick runs.  Safe to call when nothing is bound.
    pub fn unbind(&self) {
        self.stop_timer();
        let output = self.state.lock().output.take();
        if let Some(output) = output {
            output.shutdown();
            debug!(topic = output.topic(), "velocity publisher unbound");
        }
    }

    /// Replace the command.  The y-linear and z-angular components are
    /// stored negated to match the vehicle frame.  Does not touch the armed
    /// flag.  Dropped with a warning when no output is bound.
    pub fn set_command(&self, linear_x: f64, linear_y: f64, angular_z: f64) {
        let mut state = self.state.lock();
        Self::apply(&mut state, linear_x, linear_y, angular_z);
    }

    /// Arm, then [`set_command`][Self::set_command].
    pub fn force_command(&self, linear_x: f64, linear_y: f64, angular_z: f64) {
        let mut state = self.state.lock();
        state.armed = true;
        Self::apply(&mut state, linear_x, linear_y, angular_z);
    }

    /// Let the timer publish the current command.
    pub fn arm(&self) {
        self.state.lock().armed = true;
    }

    /// Disarm, zero the command and, when bound, publish the zero once right
    /// away.
    pub fn disarm_and_zero(&self) {
        let mut state = self.state.lock();
        state.armed = false;
        state.command = VelocityCommand::ZERO;
        state.send(&self.on_error);
    }

    /// The command as it goes on the wire.
    pub fn command(&self) -> VelocityCommand {
        self.state.lock().command
    }

    pub fn is_armed(&self) -> bool {
        self.state.lock().armed
    }

    pub fn is_bound(&self) -> bool {
        self.state.lock().output.is_some()
    }

    fn apply(state: &mut PublisherState, linear_x: f64, linear_y: f64, angular_z: f64) {
        if state.output.is_none() {
            warn!(linear_x, linear_y, angular_z, "velocity command dropped: publisher not bound");
            return;
        }
        state.command = VelocityCommand::new(linear_x, -linear_y, -angular_z);
    }

    fn stop_timer(&self) {
        let Some(timer) = self.timer.lock().take() else {
            return;
        };
        // The thread may have exited already; joining still reaps it.
        let _ = timer.stop.send(());
        if timer.handle.thread().id() == thread::current().id() {
            return;
        }
        if timer.handle.join().is_err() {
            error!("velocity timer thread panicked");
        }
    }
}

impl Drop for VelocityPublisher {
    fn drop(&mut self) {
        self.stop_timer();
    }
}

/// Tick loop: publish, then sleep until the next deadline or a stop signal.
fn run_timer(
    state: &Mutex<PublisherState>,
    on_error: &ErrorSink,
    stopped: &mpsc::Receiver<()>,
    period: Duration,
) {
    let mut next_tick = Instant::now();
    loop {
        {
            let state = state.lock();
            if state.armed {
                state.send(on_error);
            }
        }

        next_tick += period;
        let now = Instant::now();
        if next_tick < now {
            // Overran one or more periods; realign instead of bursting.
            let behind = now.duration_since(next_tick);
            warn!(behind_ms = behind.as_millis() as u64, "velocity tick overrun");
            next_tick = now;
        }

        match stopped.recv_timeout(next_tick.saturating_duration_since(Instant::now())) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("velocity timer stopped");
}
