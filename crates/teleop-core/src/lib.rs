//! `teleop-core` – the coordination layer between a control surface and a
//! remote-controlled vehicle.
//!
//! Telemetry arrives on independent delivery threads and lands in
//! latest-value caches that fan out to listeners.  A dedicated timer thread
//! keeps re-sending the current velocity command while a motion plan drives
//! it, and a small state machine decides which plan that is.
//!
//! # Modules
//!
//! - [`channel`] – [`TelemetryChannel`], the per-kind cache with listener
//!   fan-out, and the four instances a controller owns.
//! - [`position`] – [`PositionTracker`], position/heading/speed from odometry.
//! - [`location`] – [`LocationProvider`], geographic location from fixes.
//! - [`publisher`] – [`VelocityPublisher`], the fixed-cadence command sender.
//! - [`plan`] – [`MotionPlan`], [`PlanController`] and [`PersistedState`].
//! - [`subscriptions`] – [`SubscriptionManager`], bus bindings as one unit.
//! - [`config`] – [`ControllerConfig`] and the [`ConfigSource`] seam.
//! - [`controller`] – [`RobotController`], the composition root.

pub mod channel;
pub mod config;
pub mod controller;
pub mod location;
pub mod plan;
pub mod position;
pub mod publisher;
pub mod subscriptions;

#[cfg(test)]
mod testing;

pub use channel::{ListenerId, TelemetryChannel, TelemetryChannels};
pub use config::{ConfigSource, ControllerConfig};
pub use controller::{NODE_NAME, RobotController};
pub use location::{GeoLocation, LocationProvider};
pub use plan::{MotionPlan, PersistedState, PlanController, PlanFactory, PlanKind, PlanState};
pub use position::{PositionState, PositionTracker};
pub use publisher::VelocityPublisher;
pub use subscriptions::SubscriptionManager;
