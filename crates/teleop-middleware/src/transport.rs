//! The Transport Contract.
//!
//! The controller publishes velocity commands and consumes telemetry through
//! the traits in this module only.  Backends translate them into their own
//! protocol.
//!
//! # Overview
//!
//! - [`Transport`] – opens subscriptions and publications on named topics.
//! - [`Subscription`] – a live inbound binding; dropping or shutting it down
//!   stops delivery.
//! - [`Publication`] – a live outbound binding for a single topic.
//! - [`EventBus`][crate::bus::EventBus] – the in-process implementation.

use std::sync::Arc;

use teleop_types::{Event, Message, TeleopError};

/// Callback invoked for every event delivered on a subscribed topic.
pub type MessageHandler = Box<dyn FnMut(Event) + Send + 'static>;

/// Sink for delivery-layer failures (lost messages, broken channels, …).
pub type ErrorSink = Arc<dyn Fn(&TeleopError) + Send + Sync + 'static>;

/// A bus backend able to bind named topics.
///
/// # Contract
///
/// * `subscribe` – every message arriving on `topic` is handed to
///   `on_event`, one at a time, in arrival order.  Failures of the delivery
///   layer are reported to `on_error`; they never stop the subscription.
///
/// * `advertise` – returns a publication on `topic`.  Publishing while
///   nobody listens is not an error.
pub trait Transport: Send + Sync {
    /// Bind `topic` for inbound delivery.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::Channel`] if the binding cannot be created.
    fn subscribe(
        &self,
        topic: &str,
        on_event: MessageHandler,
        on_error: ErrorSink,
    ) -> Result<Box<dyn Subscription>, TeleopError>;

    /// Bind `topic` for outbound publication.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::Channel`] if the binding cannot be created.
    fn advertise(&self, topic: &str) -> Result<Arc<dyn Publication>, TeleopError>;
}

/// A live inbound binding.
pub trait Subscription: Send {
    /// Topic this subscription is bound to.
    fn topic(&self) -> &str;

    /// Stop delivery.  Once this returns no further callback starts, unless
    /// it is called from within the callback itself.  Calling it again is a
    /// no-op.
    fn shutdown(&mut self);
}

/// A live outbound binding.
pub trait Publication: Send + Sync {
    /// Topic this publication is bound to.
    fn topic(&self) -> &str;

    /// Send `payload` to every current subscriber of the topic.
    ///
    /// Returns the number of subscribers that were handed the message.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::Closed`] after [`shutdown`][Self::shutdown].
    fn publish(&self, payload: Message) -> Result<usize, TeleopError>;

    /// Release the binding.  Idempotent.
    fn shutdown(&self);
}
