//! [`PositionTracker`] – position, heading and speed derived from odometry.
//!
//! The tracker is registered as an odometry listener when the controller is
//! built.  The first sample ever received fixes the start position; every
//! later sample moves the current position.  Position is reported relative
//! to the start, and heading is computed from the stored rotation on read.

use parking_lot::Mutex;
use teleop_types::{Odometry, Point, Quaternion};

/// Raw state accumulated from odometry samples.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PositionState {
    pub start_position: Option<Point>,
    pub current_position: Option<Point>,
    pub rotation: Option<Quaternion>,
    /// Linear x velocity of the latest sample.
    pub speed: f64,
    /// Angular z velocity of the latest sample.
    pub turn_rate: f64,
}

impl PositionState {
    /// Displacement from the start position, `(0, 0)` until a second sample
    /// has arrived.
    pub fn offset(&self) -> (f64, f64) {
        match (self.start_position, self.current_position) {
            (Some(start), Some(current)) => (current.x - start.x, current.y - start.y),
            _ => (0.0, 0.0),
        }
    }

    /// Heading in radians within `(-π, π]`, `0` before any sample.
    pub fn heading(&self) -> f64 {
        self.rotation.map_or(0.0, |q| q.yaw())
    }
}

/// Owns the [`PositionState`] of one controller.
#[derive(Debug, Default)]
pub struct PositionTracker {
    state: Mutex<PositionState>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one odometry sample into the state.
    pub fn update(&self, odometry: &Odometry) {
        let mut state = self.state.lock();
        let position = odometry.pose.position;
        if state.start_position.is_none() {
            state.start_position = Some(position);
        } else {
            state.current_position = Some(position);
        }
        state.rotation = Some(odometry.pose.orientation);
        state.speed = odometry.twist.linear.x;
        state.turn_rate = odometry.twist.angular.z;
    }

    /// A copy of the whole state, taken under a single lock.
    pub fn snapshot(&self) -> PositionState {
        *self.state.lock()
    }

    pub fn x(&self) -> f64 {
        self.snapshot().offset().0
    }

    pub fn y(&self) -> f64 {
        self.snapshot().offset().1
    }

    pub fn heading(&self) -> f64 {
        self.snapshot().heading()
    }

    pub fn speed(&self) -> f64 {
        self.state.lock().speed
    }

    pub fn turn_rate(&self) -> f64 {
        self.state.lock().turn_rate
    }
}
