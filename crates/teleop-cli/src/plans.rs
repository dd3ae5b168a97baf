//! Demo motion plans for the interactive shell.
//!
//! - `cruise` drives forward holding the heading it started on.  Resumable.
//! - `spin` turns in place.  Not resumable.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use teleop_core::{MotionPlan, PlanKind, RobotController};
use teleop_types::canonical_angle;
use tracing::{debug, warn};

pub const CRUISE: PlanKind = PlanKind(1);
pub const SPIN: PlanKind = PlanKind(2);

const CRUISE_SPEED: f64 = 0.5;
const HEADING_GAIN: f64 = 1.5;
const MAX_CORRECTION: f64 = 0.8;
const SPIN_RATE: f64 = 0.6;
const CONTROL_PERIOD: Duration = Duration::from_millis(100);

/// Build a fresh plan for `kind`.  Used to resume paused plans.
pub fn factory(kind: PlanKind) -> Option<Arc<dyn MotionPlan>> {
    match kind {
        CRUISE => Some(Arc::new(CruisePlan::new())),
        SPIN => Some(Arc::new(SpinPlan)),
        _ => None,
    }
}

/// Look a plan up by its shell name.
pub fn by_name(name: &str) -> Option<Arc<dyn MotionPlan>> {
    match name {
        "cruise" => factory(CRUISE),
        "spin" => factory(SPIN),
        _ => None,
    }
}

pub fn name_of(kind: PlanKind) -> &'static str {
    match kind {
        CRUISE => "cruise",
        SPIN => "spin",
        _ => "unknown",
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Cruise
// ────────────────────────────────────────────────────────────────────────────

/// Forward drive with proportional heading hold.
pub struct CruisePlan {
    /// `Some` while running.  Commands are only issued with this held, so
    /// none can land after `stop` returns.
    active: Arc<Mutex<Option<mpsc::Sender<()>>>>,
}

impl CruisePlan {
    pub fn new() -> Self {
        Self {
            active: Arc::new(Mutex::new(None)),
        }
    }
}

impl Default for CruisePlan {
    fn default() -> Self {
        Self::new()
    }
}

/// Steering command that turns `heading` towards `target`.
fn heading_correction(target: f64, heading: f64) -> f64 {
    (HEADING_GAIN * canonical_angle(target - heading)).clamp(-MAX_CORRECTION, MAX_CORRECTION)
}

impl MotionPlan for CruisePlan {
    fn kind(&self) -> Option<PlanKind> {
        Some(CRUISE)
    }

    fn run(&self, controller: RobotController) {
        let target = controller.heading();
        let (stop, stopped) = mpsc::channel::<()>();
        *self.active.lock() = Some(stop);
        controller.force_velocity(CRUISE_SPEED, 0.0, 0.0);

        let active = Arc::clone(&self.active);
        let spawned = thread::Builder::new().name("cruise".into()).spawn(move || {
            while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(CONTROL_PERIOD) {
                let guard = active.lock();
                if guard.is_none() {
                    break;
                }
                let turn = heading_correction(target, controller.heading());
                controller.publish_velocity(CRUISE_SPEED, 0.0, turn);
                drop(guard);
            }
            debug!("cruise control loop finished");
        });
        if let Err(e) = spawned {
            warn!(error = %e, "cruise runs without heading hold");
        }
    }

    fn stop(&self) {
        self.active.lock().take();
    }

    fn is_resumable(&self) -> bool {
        true
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Spin
// ────────────────────────────────────────────────────────────────────────────

/// Turn in place until stopped.
pub struct SpinPlan;

impl MotionPlan for SpinPlan {
    fn kind(&self) -> Option<PlanKind> {
        Some(SPIN)
    }

    fn run(&self, controller: RobotController) {
        controller.force_velocity(0.0, 0.0, SPIN_RATE);
    }

    fn stop(&self) {}

    fn is_resumable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    use teleop_core::ControllerConfig;
    use teleop_middleware::EventBus;

    #[test]
    fn factory_knows_both_demo_plans() {
        assert_eq!(factory(CRUISE).and_then(|p| p.kind()), Some(CRUISE));
        assert_eq!(by_name("spin").and_then(|p| p.kind()), Some(SPIN));
        assert!(factory(PlanKind(42)).is_none());
        assert!(by_name("dance").is_none());
        assert_eq!(name_of(CRUISE), "cruise");
    }

    #[test]
    fn only_cruise_is_resumable() {
        assert!(CruisePlan::new().is_resumable());
        assert!(!SpinPlan.is_resumable());
    }

    #[test]
    fn correction_steers_the_short_way_and_saturates() {
        assert_eq!(heading_correction(0.0, 0.0), 0.0);
        assert!(heading_correction(0.1, 0.0) > 0.0);
        assert!(heading_correction(-0.1, 0.0) < 0.0);
        // Across the ±π seam the short way round is positive.
        assert!(heading_correction(-PI + 0.1, PI - 0.1) > 0.0);
        assert_eq!(heading_correction(PI / 2.0, 0.0), MAX_CORRECTION);
    }

    #[test]
    fn cruise_stops_issuing_commands_once_stopped() {
        let controller = RobotController::new(Arc::new(ControllerConfig::default()), Arc::new(factory));
        controller.connect(Arc::new(EventBus::default())).expect("connect");

        controller.run_plan(by_name("cruise").expect("cruise"));
        assert!(controller.is_publishing());
        assert_eq!(controller.velocity_command().linear_x, CRUISE_SPEED);

        assert!(controller.stop());
        thread::sleep(CONTROL_PERIOD * 3);
        assert_eq!(controller.velocity_command(), teleop_types::VelocityCommand::ZERO);
        assert_eq!(controller.paused_plan(), Some(CRUISE));
        controller.disconnect();
    }
}
