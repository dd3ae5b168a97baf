//! [`RobotController`] – the composition root.
//!
//! Wires telemetry caches, position tracking, the velocity publisher, the
//! plan state machine and the bus bindings together, and exposes the surface
//! used by control surfaces and by running plans.
//!
//! The controller is a cheap handle: clones share the same state, which is
//! how a plan receives "a handle back into the controller" when it is run.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use teleop_core::{ControllerConfig, MotionPlan, PlanKind, RobotController};
//! use teleop_middleware::EventBus;
//!
//! let factory = Arc::new(|_: PlanKind| -> Option<Arc<dyn MotionPlan>> { None });
//! let controller = RobotController::new(Arc::new(ControllerConfig::default()), factory);
//!
//! controller.connect(Arc::new(EventBus::default())).unwrap();
//! assert!(controller.is_initialized());
//! assert_eq!((controller.x(), controller.y()), (0.0, 0.0));
//!
//! controller.disconnect();
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use teleop_middleware::{ErrorSink, Transport};
use teleop_types::{LaserScan, NavSatFix, Odometry, Pose, TeleopError, VelocityCommand};
use tracing::{debug, error, info};

use crate::channel::{ListenerId, TelemetryChannels};
use crate::config::ConfigSource;
use crate::location::LocationProvider;
use crate::plan::{MotionPlan, PersistedState, PlanController, PlanFactory, PlanKind, PlanState};
use crate::position::{PositionState, PositionTracker};
use crate::publisher::VelocityPublisher;
use crate::subscriptions::SubscriptionManager;

/// Name under which the controller identifies itself on the bus.
pub const NODE_NAME: &str = "teleop/robot_controller";

struct Inner {
    config: Arc<dyn ConfigSource>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    telemetry: Arc<TelemetryChannels>,
    position: Arc<PositionTracker>,
    location: Arc<LocationProvider>,
    publisher: VelocityPublisher,
    plans: PlanController,
    subscriptions: SubscriptionManager,
    on_error: ErrorSink,
}

/// Shared handle to one controller.
#[derive(Clone)]
pub struct RobotController {
    inner: Arc<Inner>,
}

impl RobotController {
    /// Build a controller whose delivery errors are logged.
    pub fn new(config: Arc<dyn ConfigSource>, plans: Arc<dyn PlanFactory>) -> Self {
        let sink: ErrorSink = Arc::new(|e: &TeleopError| error!(error = %e, "bus error"));
        Self::with_error_sink(config, plans, sink)
    }

    /// Build a controller that reports delivery errors to `on_error`.
    pub fn with_error_sink(config: Arc<dyn ConfigSource>, plans: Arc<dyn PlanFactory>, on_error: ErrorSink) -> Self {
        let telemetry = Arc::new(TelemetryChannels::new());
        let position = Arc::new(PositionTracker::new());
        let location = Arc::new(LocationProvider::new());

        let tracker = Arc::clone(&position);
        telemetry.odometry.add_listener(move |odometry| tracker.update(odometry));
        let provider = Arc::clone(&location);
        telemetry.nav_sat_fix.add_listener(move |fix| provider.on_fix(fix));
        telemetry.pose.add_listener(|pose: &Pose| {
            debug!(x = pose.position.x, y = pose.position.y, "pose set");
        });

        Self {
            inner: Arc::new(Inner {
                config,
                transport: Mutex::new(None),
                telemetry,
                position,
                location,
                publisher: VelocityPublisher::new(Arc::clone(&on_error)),
                plans: PlanController::new(plans),
                subscriptions: SubscriptionManager::new(),
                on_error,
            }),
        }
    }

    pub fn node_name(&self) -> &'static str {
        NODE_NAME
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Attach to `transport` and establish the bindings.
    ///
    /// # Errors
    ///
    /// See [`initialize`][Self::initialize].
    pub fn connect(&self, transport: Arc<dyn Transport>) -> Result<(), TeleopError> {
        self.shutdown();
        *self.inner.transport.lock() = Some(transport);
        info!(node = NODE_NAME, "connected");
        self.initialize()
    }

    /// Release the bindings and forget the transport.
    pub fn disconnect(&self) {
        self.shutdown();
        if self.inner.transport.lock().take().is_some() {
            info!(node = NODE_NAME, "disconnected");
        }
    }

    /// Establish the bus bindings, reading the configuration afresh.  A
    /// no-op when already initialized or when no transport is attached.
    ///
    /// # Errors
    ///
    /// Returns the transport failure that prevented a binding; nothing stays
    /// bound in that case.
    pub fn initialize(&self) -> Result<(), TeleopError> {
        let Some(transport) = self.inner.transport.lock().clone() else {
            debug!("initialize skipped: no transport");
            return Ok(());
        };
        if self.inner.subscriptions.is_initialized() {
            return Ok(());
        }
        let config = self.inner.config.load();
        self.inner.subscriptions.initialize(
            transport.as_ref(),
            &config,
            &self.inner.telemetry,
            &self.inner.publisher,
            &self.inner.on_error,
        )
    }

    /// Tear down every binding that exists.  Idempotent.
    pub fn shutdown(&self) {
        self.inner.subscriptions.shutdown(&self.inner.publisher);
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.subscriptions.is_initialized()
    }

    // ── Plans ───────────────────────────────────────────────────────────────

    /// Stop the current plan and run `plan`.
    pub fn run_plan(&self, plan: Arc<dyn MotionPlan>) {
        self.inner.plans.run(plan, &self.inner.publisher, self);
    }

    /// Stop the current plan and halt the vehicle.  Returns whether a
    /// resumable plan was captured.
    pub fn stop(&self) -> bool {
        self.inner.plans.stop(&self.inner.publisher)
    }

    /// Run a fresh instance of the paused plan.
    pub fn resume_plan(&self) -> bool {
        self.inner.plans.resume(&self.inner.publisher, self)
    }

    pub fn has_paused_plan(&self) -> bool {
        self.inner.plans.has_paused_plan()
    }

    pub fn paused_plan(&self) -> Option<PlanKind> {
        self.inner.plans.paused_plan()
    }

    /// The running plan, if any.
    pub fn motion_plan(&self) -> Option<Arc<dyn MotionPlan>> {
        self.inner.plans.current_plan()
    }

    pub fn plan_state(&self) -> PlanState {
        self.inner.plans.state()
    }

    pub fn save(&self) -> PersistedState {
        self.inner.plans.save()
    }

    /// Restore a saved paused plan.  Does not start it.
    pub fn load(&self, persisted: PersistedState) {
        self.inner.plans.load(persisted);
    }

    // ── Velocity ────────────────────────────────────────────────────────────

    /// Update the command without arming the publisher.
    pub fn publish_velocity(&self, linear_x: f64, linear_y: f64, angular_z: f64) {
        self.inner.publisher.set_command(linear_x, linear_y, angular_z);
    }

    /// Arm the publisher and update the command.
    pub fn force_velocity(&self, linear_x: f64, linear_y: f64, angular_z: f64) {
        self.inner.publisher.force_command(linear_x, linear_y, angular_z);
    }

    /// The command as it goes on the wire.
    pub fn velocity_command(&self) -> VelocityCommand {
        self.inner.publisher.command()
    }

    pub fn is_publishing(&self) -> bool {
        self.inner.publisher.is_armed()
    }

    // ── Telemetry ───────────────────────────────────────────────────────────

    pub fn nav_sat_fix(&self) -> Option<NavSatFix> {
        self.inner.telemetry.nav_sat_fix.get()
    }

    pub fn laser_scan(&self) -> Option<LaserScan> {
        self.inner.telemetry.laser_scan.get()
    }

    pub fn odometry(&self) -> Option<Odometry> {
        self.inner.telemetry.odometry.get()
    }

    pub fn pose(&self) -> Option<Pose> {
        self.inner.telemetry.pose.get()
    }

    /// Direct access to the four caches.
    pub fn telemetry(&self) -> &TelemetryChannels {
        &self.inner.telemetry
    }

    pub fn add_nav_sat_fix_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&NavSatFix) + Send + Sync + 'static,
    {
        self.inner.telemetry.nav_sat_fix.add_listener(listener)
    }

    pub fn remove_nav_sat_fix_listener(&self, id: ListenerId) -> bool {
        self.inner.telemetry.nav_sat_fix.remove_listener(id)
    }

    pub fn add_laser_scan_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&LaserScan) + Send + Sync + 'static,
    {
        self.inner.telemetry.laser_scan.add_listener(listener)
    }

    pub fn remove_laser_scan_listener(&self, id: ListenerId) -> bool {
        self.inner.telemetry.laser_scan.remove_listener(id)
    }

    pub fn add_odometry_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Odometry) + Send + Sync + 'static,
    {
        self.inner.telemetry.odometry.add_listener(listener)
    }

    pub fn remove_odometry_listener(&self, id: ListenerId) -> bool {
        self.inner.telemetry.odometry.remove_listener(id)
    }

    pub fn location_provider(&self) -> &LocationProvider {
        &self.inner.location
    }

    // ── Position ────────────────────────────────────────────────────────────

    /// X offset from the first odometry sample.
    pub fn x(&self) -> f64 {
        self.inner.position.x()
    }

    /// Y offset from the first odometry sample.
    pub fn y(&self) -> f64 {
        self.inner.position.y()
    }

    /// Heading in radians within `(-π, π]`.
    pub fn heading(&self) -> f64 {
        self.inner.position.heading()
    }

    pub fn speed(&self) -> f64 {
        self.inner.position.speed()
    }

    pub fn turn_rate(&self) -> f64 {
        self.inner.position.turn_rate()
    }

    pub fn position(&self) -> PositionState {
        self.inner.position.snapshot()
    }
}

impl std::fmt::Debug for RobotController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotController")
            .field("initialized", &self.is_initialized())
            .field("plans", &self.inner.plans)
            .field("command", &self.velocity_command())
            .finish()
    }
}
