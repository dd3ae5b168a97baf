//! Simulated differential-drive vehicle on the in-process bus.
//!
//! [`SimVehicle`] listens on the command topic, integrates the most recent
//! twist at a fixed rate and publishes odometry and pose every step, a
//! satellite fix once per second and a synthetic range scan a few times per
//! second.  Enough to drive the controller end to end without hardware.

use std::f64::consts::PI;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use teleop_core::ControllerConfig;
use teleop_middleware::{ErrorSink, Publication, Subscription, Transport};
use teleop_types::{
    Event, FixStatus, LaserScan, Message, NavSatFix, Odometry, Point, Pose, Quaternion, TeleopError, Twist,
    Vector3, canonical_angle,
};
use tracing::{debug, info, warn};

use crate::config::SimConfig;

const METERS_PER_DEGREE: f64 = 111_320.0;
const SCAN_BEAMS: usize = 72;

/// Planar vehicle state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VehicleState {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
    pub twist: Twist,
}

impl VehicleState {
    /// Advance by `dt` seconds under `command` as received on the wire.
    /// The wire frame mirrors the lateral and yaw axes, so they are flipped
    /// back before integrating.
    pub fn step(&mut self, command: &Twist, dt: f64) {
        let forward = command.linear.x;
        let lateral = -command.linear.y;
        let yaw_rate = -command.angular.z;

        let (sin, cos) = self.yaw.sin_cos();
        self.x += (forward * cos - lateral * sin) * dt;
        self.y += (forward * sin + lateral * cos) * dt;
        self.yaw = canonical_angle(self.yaw + yaw_rate * dt);
        self.twist = Twist {
            linear: Vector3::new(forward, lateral, 0.0),
            angular: Vector3::new(0.0, 0.0, yaw_rate),
        };
    }

    pub fn odometry(&self) -> Odometry {
        Odometry {
            pose: self.pose(),
            twist: self.twist,
        }
    }

    pub fn pose(&self) -> Pose {
        Pose {
            position: Point::new(self.x, self.y, 0.0),
            orientation: Quaternion::from_yaw(self.yaw),
        }
    }

    /// Flat-earth fix around `origin`.
    pub fn fix(&self, sim: &SimConfig) -> NavSatFix {
        let latitude = sim.origin_latitude + self.y / METERS_PER_DEGREE;
        let longitude = sim.origin_longitude + self.x / (METERS_PER_DEGREE * latitude.to_radians().cos());
        NavSatFix {
            latitude,
            longitude,
            altitude: 0.0,
            status: FixStatus::Fix,
        }
    }
}

/// A 360° scan of a square room centred on the start point.
fn room_scan(state: &VehicleState, half_width: f64) -> LaserScan {
    let increment = 2.0 * PI / SCAN_BEAMS as f64;
    let ranges = (0..SCAN_BEAMS)
        .map(|i| {
            let beam = state.yaw - PI + i as f64 * increment;
            let (sin, cos) = beam.sin_cos();
            let to_x = if cos.abs() > 1e-9 { ((half_width * cos.signum()) - state.x) / cos } else { f64::INFINITY };
            let to_y = if sin.abs() > 1e-9 { ((half_width * sin.signum()) - state.y) / sin } else { f64::INFINITY };
            to_x.min(to_y).max(0.0) as f32
        })
        .collect();
    LaserScan {
        angle_min: -PI as f32,
        angle_max: (PI - increment) as f32,
        angle_increment: increment as f32,
        range_min: 0.05,
        range_max: 30.0,
        ranges,
    }
}

struct Outputs {
    odometry: Arc<dyn Publication>,
    pose: Arc<dyn Publication>,
    fix: Arc<dyn Publication>,
    scan: Arc<dyn Publication>,
}

impl Outputs {
    fn all(&self) -> [&Arc<dyn Publication>; 4] {
        [&self.odometry, &self.pose, &self.fix, &self.scan]
    }
}

/// Handle to the running simulation.  Dropping it stops the vehicle thread.
pub struct SimVehicle {
    state: Arc<Mutex<VehicleState>>,
    command: Option<Box<dyn Subscription>>,
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SimVehicle {
    /// Start the vehicle on `transport`, using the topic names the
    /// controller is configured with.
    pub fn spawn(transport: &dyn Transport, topics: &ControllerConfig, sim: SimConfig) -> Result<Self, TeleopError> {
        let outputs = Outputs {
            odometry: transport.advertise(&topics.odometry_topic)?,
            pose: transport.advertise(&topics.pose_topic)?,
            fix: transport.advertise(&topics.nav_sat_fix_topic)?,
            scan: transport.advertise(&topics.laser_scan_topic)?,
        };

        let latest = Arc::new(Mutex::new(Twist::default()));
        let sink = Arc::clone(&latest);
        let on_error: ErrorSink = Arc::new(|e: &TeleopError| warn!(error = %e, "sim command stream"));
        let command = transport.subscribe(
            &topics.command_topic,
            Box::new(move |event: Event| match event.payload {
                Message::Twist(twist) => *sink.lock() = twist,
                other => debug!(found = other.kind(), "sim ignored non-twist command"),
            }),
            on_error,
        )?;

        let state = Arc::new(Mutex::new(VehicleState::default()));
        let shared = Arc::clone(&state);
        let (stop, stopped) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("sim-vehicle".into())
            .spawn(move || drive(&shared, &latest, &outputs, &sim, &stopped))
            .map_err(|e| TeleopError::Channel(format!("sim vehicle thread: {e}")))?;

        info!(command = %topics.command_topic, "simulated vehicle started");
        Ok(Self {
            state,
            command: Some(command),
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    pub fn state(&self) -> VehicleState {
        *self.state.lock()
    }

    /// Stop the vehicle thread and drop its bus bindings.  Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(mut command) = self.command.take() {
            command.shutdown();
        }
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("sim vehicle thread panicked");
        }
    }
}

impl Drop for SimVehicle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn drive(
    state: &Mutex<VehicleState>,
    command: &Mutex<Twist>,
    outputs: &Outputs,
    sim: &SimConfig,
    stopped: &mpsc::Receiver<()>,
) {
    let rate = sim.rate_hz.max(1);
    let period = Duration::from_secs_f64(1.0 / f64::from(rate));
    let mut next_tick = Instant::now();
    let mut last = Instant::now();

    for step in 0u64.. {
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f64();
        last = now;

        let current = {
            let mut state = state.lock();
            state.step(&command.lock(), dt);
            *state
        };

        let mut messages = vec![
            (&outputs.odometry, Message::Odometry(current.odometry())),
            (&outputs.pose, Message::Pose(current.pose())),
        ];
        if step % u64::from(rate) == 0 {
            messages.push((&outputs.fix, Message::NavSatFix(current.fix(sim))));
        }
        if step % u64::from(rate.div_ceil(4)) == 0 {
            messages.push((&outputs.scan, Message::LaserScan(room_scan(&current, 10.0))));
        }
        for (output, message) in messages {
            if let Err(e) = output.publish(message) {
                warn!(topic = output.topic(), error = %e, "sim publish failed");
            }
        }

        next_tick = (next_tick + period).max(Instant::now());
        match stopped.recv_timeout(next_tick.saturating_duration_since(Instant::now())) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    for output in outputs.all() {
        output.shutdown();
    }
    debug!("simulated vehicle stopped");
}
