//! [`SubscriptionManager`] – all bus bindings of a controller, as one unit.

use std::sync::Arc;

use parking_lot::Mutex;
use teleop_middleware::{ErrorSink, MessageHandler, Subscription, Transport};
use teleop_types::{Event, Message, TeleopError};
use tracing::{debug, info, warn};

use crate::channel::TelemetryChannels;
use crate::config::ControllerConfig;
use crate::publisher::VelocityPublisher;

/// Stores a message in its channel, or hands it back if it has the wrong
/// kind for that channel.
type Route = fn(&TelemetryChannels, Message) -> Option<Message>;

#[derive(Default)]
struct Bindings {
    initialized: bool,
    subscriptions: Vec<Box<dyn Subscription>>,
}

/// Owns the telemetry subscriptions and the command publisher binding.
#[derive(Default)]
pub struct SubscriptionManager {
    bindings: Mutex<Bindings>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise the command topic, bind `publisher` to it and subscribe the
    /// four telemetry topics named in `config`.  A no-op when already
    /// initialized.
    ///
    /// # Errors
    ///
    /// Returns the first transport failure; every binding made before it is
    /// torn down again.
    pub fn initialize(
        &self,
        transport: &dyn Transport,
        config: &ControllerConfig,
        channels: &Arc<TelemetryChannels>,
        publisher: &VelocityPublisher,
        on_error: &ErrorSink,
    ) -> Result<(), TeleopError> {
        let mut bindings = self.bindings.lock();
        if bindings.initialized {
            debug!("already initialized");
            return Ok(());
        }
        // Leftovers from a failed or interrupted cycle.
        release(&mut bindings, publisher);

        match bind_all(transport, config, channels, publisher, on_error, &mut bindings.subscriptions) {
            Ok(()) => {
                bindings.initialized = true;
                info!(
                    command = %config.command_topic,
                    subscriptions = bindings.subscriptions.len(),
                    "controller bindings established"
                );
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "binding failed, rolling back");
                release(&mut bindings, publisher);
                Err(e)
            }
        }
    }

    /// Tear down whatever bindings exist.  Idempotent.
    pub fn shutdown(&self, publisher: &VelocityPublisher) {
        let subscriptions = {
            let mut bindings = self.bindings.lock();
            bindings.initialized = false;
            std::mem::take(&mut bindings.subscriptions)
        };
        publisher.unbind();
        let count = subscriptions.len();
        for mut subscription in subscriptions {
            subscription.shutdown();
        }
        if count > 0 {
            info!(subscriptions = count, "controller bindings released");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.bindings.lock().initialized
    }
}

fn release(bindings: &mut Bindings, publisher: &VelocityPublisher) {
    bindings.initialized = false;
    publisher.unbind();
    for mut subscription in bindings.subscriptions.drain(..) {
        subscription.shutdown();
    }
}

fn bind_all(
    transport: &dyn Transport,
    config: &ControllerConfig,
    channels: &Arc<TelemetryChannels>,
    publisher: &VelocityPublisher,
    on_error: &ErrorSink,
    subscriptions: &mut Vec<Box<dyn Subscription>>,
) -> Result<(), TeleopError> {
    let output = transport.advertise(&config.command_topic)?;
    publisher.bind(output, config.publish_period())?;

    let routes: [(&str, &'static str, Route); 4] = [
        (config.nav_sat_fix_topic.as_str(), "nav_sat_fix", route_nav_sat_fix),
        (config.laser_scan_topic.as_str(), "laser_scan", route_laser_scan),
        (config.odometry_topic.as_str(), "odometry", route_odometry),
        (config.pose_topic.as_str(), "pose", route_pose),
    ];

    for (topic, expected, route) in routes {
        let handler = router(Arc::clone(channels), expected, Arc::clone(on_error), route);
        subscriptions.push(transport.subscribe(topic, handler, Arc::clone(on_error))?);
        debug!(topic, kind = expected, "subscribed");
    }
    Ok(())
}

fn route_nav_sat_fix(channels: &TelemetryChannels, message: Message) -> Option<Message> {
    match message {
        Message::NavSatFix(fix) => channels.nav_sat_fix.set(fix),
        other => return Some(other),
    }
    None
}

fn route_laser_scan(channels: &TelemetryChannels, message: Message) -> Option<Message> {
    match message {
        Message::LaserScan(scan) => channels.laser_scan.set(scan),
        other => return Some(other),
    }
    None
}

fn route_odometry(channels: &TelemetryChannels, message: Message) -> Option<Message> {
    match message {
        Message::Odometry(odometry) => channels.odometry.set(odometry),
        other => return Some(other),
    }
    None
}

fn route_pose(channels: &TelemetryChannels, message: Message) -> Option<Message> {
    match message {
        Message::Pose(pose) => channels.pose.set(pose),
        other => return Some(other),
    }
    None
}

fn router(channels: Arc<TelemetryChannels>, expected: &'static str, on_error: ErrorSink, route: Route) -> MessageHandler {
    Box::new(move |event: Event| {
        if let Some(other) = route(&channels, event.payload) {
            warn!(topic = %event.topic, expected, found = other.kind(), "unexpected payload");
            on_error(&TeleopError::UnexpectedPayload {
                topic: event.topic,
                expected: expected.to_string(),
                found: other.kind().to_string(),
            });
        }
    })
}
