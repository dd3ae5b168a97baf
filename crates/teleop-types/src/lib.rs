//! `teleop-types` – shared message model for the teleoperation stack.
//!
//! Everything that crosses the bus is defined here: the geometry primitives,
//! the four telemetry kinds the controller caches (satellite fix, range scan,
//! odometry, pose), the outbound [`Twist`] and the [`Event`] envelope that
//! wraps every payload.

use std::f64::consts::PI;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Geometry primitives
// ────────────────────────────────────────────────────────────────────────────

/// A position in 3-D space (metres).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A free 3-D vector, used for linear and angular velocities.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A rotation quaternion in (x, y, z, w) order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    /// Rotation of `yaw` radians about the vertical axis.
    pub fn from_yaw(yaw: f64) -> Self {
        let half = yaw * 0.5;
        Self::new(0.0, 0.0, half.sin(), half.cos())
    }

    /// Rotation about the vertical axis, wrapped into `(-π, π]`.
    ///
    /// ```
    /// use teleop_types::Quaternion;
    ///
    /// let q = Quaternion::from_yaw(1.0);
    /// assert!((q.yaw() - 1.0).abs() < 1e-9);
    /// ```
    pub fn yaw(&self) -> f64 {
        let siny_cosp = 2.0 * (self.w * self.z + self.x * self.y);
        let cosy_cosp = 1.0 - 2.0 * (self.y * self.y + self.z * self.z);
        canonical_angle(siny_cosp.atan2(cosy_cosp))
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

/// Wrap an angle in radians into the half-open interval `(-π, π]`.
pub fn canonical_angle(rad: f64) -> f64 {
    if !rad.is_finite() {
        return rad;
    }
    let mut wrapped = rad % (2.0 * PI);
    if wrapped <= -PI {
        wrapped += 2.0 * PI;
    } else if wrapped > PI {
        wrapped -= 2.0 * PI;
    }
    wrapped
}

// ────────────────────────────────────────────────────────────────────────────
// Telemetry messages
// ────────────────────────────────────────────────────────────────────────────

/// Position and orientation of the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point,
    pub orientation: Quaternion,
}

/// Linear and angular velocity pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

/// Dead-reckoning estimate: where the vehicle is and how fast it moves.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Odometry {
    pub pose: Pose,
    pub twist: Twist,
}

/// Quality of a satellite fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    #[default]
    NoFix,
    Fix,
    SbasFix,
    GbasFix,
}

/// A satellite navigation fix.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NavSatFix {
    /// Degrees, positive north.
    pub latitude: f64,
    /// Degrees, positive east.
    pub longitude: f64,
    /// Metres above the WGS-84 ellipsoid.
    pub altitude: f64,
    pub status: FixStatus,
}

/// One sweep of a planar range finder.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LaserScan {
    pub angle_min: f32,
    pub angle_max: f32,
    pub angle_increment: f32,
    pub range_min: f32,
    pub range_max: f32,
    pub ranges: Vec<f32>,
}

// ────────────────────────────────────────────────────────────────────────────
// Velocity command
// ────────────────────────────────────────────────────────────────────────────

/// The command the periodic publisher re-sends to the vehicle.
///
/// Values are stored exactly as they go on the wire; the frame-sign
/// convention is applied by the publisher's setter, not here.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VelocityCommand {
    pub linear_x: f64,
    pub linear_y: f64,
    pub angular_z: f64,
}

impl VelocityCommand {
    pub const ZERO: Self = Self {
        linear_x: 0.0,
        linear_y: 0.0,
        angular_z: 0.0,
    };

    pub fn new(linear_x: f64, linear_y: f64, angular_z: f64) -> Self {
        Self {
            linear_x,
            linear_y,
            angular_z,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl From<VelocityCommand> for Twist {
    fn from(cmd: VelocityCommand) -> Self {
        Twist {
            linear: Vector3::new(cmd.linear_x, cmd.linear_y, 0.0),
            angular: Vector3::new(0.0, 0.0, cmd.angular_z),
        }
    }
}

impl From<Twist> for VelocityCommand {
    fn from(twist: Twist) -> Self {
        VelocityCommand::new(twist.linear.x, twist.linear.y, twist.angular.z)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bus envelope
// ────────────────────────────────────────────────────────────────────────────

/// Every payload kind that can travel over a named topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "msg", rename_all = "snake_case")]
pub enum Message {
    NavSatFix(NavSatFix),
    LaserScan(LaserScan),
    Odometry(Odometry),
    Pose(Pose),
    Twist(Twist),
}

impl Message {
    /// Short, stable name of the payload kind, used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::NavSatFix(_) => "nav_sat_fix",
            Message::LaserScan(_) => "laser_scan",
            Message::Odometry(_) => "odometry",
            Message::Pose(_) => "pose",
            Message::Twist(_) => "twist",
        }
    }
}

/// Envelope for a message delivered on a named topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"/odom"`
    pub topic: String,
    pub payload: Message,
}

impl Event {
    /// Wrap `payload` for `topic`, stamping a fresh id and the current time.
    pub fn new(topic: impl Into<String>, payload: Message) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            topic: topic.into(),
            payload,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type shared by the bus, the controller and the CLI.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TeleopError {
    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Publication on {topic} is shut down")]
    Closed { topic: String },

    #[error("Subscriber on {topic} lagged, {skipped} message(s) lost")]
    Lagged { topic: String, skipped: u64 },

    #[error("Unexpected {found} payload on {topic} (expected {expected})")]
    UnexpectedPayload {
        topic: String,
        expected: String,
        found: String,
    },

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Persistence Error: {0}")]
    Persistence(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn identity_quaternion_has_zero_yaw() {
        assert!(Quaternion::identity().yaw().abs() < 1e-12);
    }

    #[test]
    fn yaw_roundtrips_through_quaternion() {
        for yaw in [-3.0, -FRAC_PI_2, -0.25, 0.0, 0.5, FRAC_PI_2, 3.0] {
            let q = Quaternion::from_yaw(yaw);
            assert!((q.yaw() - yaw).abs() < 1e-9, "yaw {yaw} came back as {}", q.yaw());
        }
    }

    #[test]
    fn canonical_angle_wraps_into_half_open_interval() {
        assert!((canonical_angle(3.0 * PI - 0.1) - (PI - 0.1)).abs() < 1e-9);
        assert!((canonical_angle(-PI) - PI).abs() < 1e-9);
        assert!((canonical_angle(2.0 * PI + 0.5) - 0.5).abs() < 1e-9);
        assert!((canonical_angle(-2.0 * PI - 0.5) + 0.5).abs() < 1e-9);
        assert!((canonical_angle(0.25) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn velocity_command_twist_zeroes_unused_axes() {
        let twist: Twist = VelocityCommand::new(1.0, -2.0, 0.5).into();
        assert_eq!(twist.linear, Vector3::new(1.0, -2.0, 0.0));
        assert_eq!(twist.angular, Vector3::new(0.0, 0.0, 0.5));
        assert_eq!(VelocityCommand::from(twist), VelocityCommand::new(1.0, -2.0, 0.5));
        assert!(VelocityCommand::from(Twist::default()).is_zero());
        assert!(!VelocityCommand::new(0.0, 0.0, -0.1).is_zero());
    }

    #[test]
    fn message_kind_names() {
        assert_eq!(Message::Pose(Pose::default()).kind(), "pose");
        assert_eq!(Message::LaserScan(LaserScan::default()).kind(), "laser_scan");
        assert_eq!(Message::Twist(Twist::default()).kind(), "twist");
    }

    #[test]
    fn event_json_carries_tagged_payload() {
        let event = Event::new("/odom", Message::Odometry(Odometry::default()));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"odometry\""));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.topic, "/odom");
        assert_eq!(back.payload, event.payload);
    }

    #[test]
    fn teleop_error_display() {
        let err = TeleopError::UnexpectedPayload {
            topic: "/scan".to_string(),
            expected: "laser_scan".to_string(),
            found: "pose".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("/scan"));
        assert!(text.contains("pose"));

        let lag = TeleopError::Lagged {
            topic: "/odom".to_string(),
            skipped: 3,
        };
        assert!(lag.to_string().contains("3 message(s)"));
    }
}
