//! `teleop-middleware` – the bus boundary.
//!
//! The controller never talks to a concrete transport.  It subscribes to and
//! advertises named topics through the [`Transport`] trait; whatever sits
//! behind it (a robot middleware client, a simulator, a test double) only
//! has to deliver each message to the subscription callback, one at a time,
//! in arrival order.
//!
//! # Modules
//!
//! - [`transport`] – [`Transport`], [`Subscription`] and [`Publication`], the
//!   contract every bus backend implements.
//! - [`bus`] – [`EventBus`], an in-process named-topic bus built on Tokio
//!   broadcast channels with one delivery thread per subscription.

pub mod bus;
pub mod transport;

pub use bus::{EventBus, TopicReceiver};
pub use transport::{ErrorSink, MessageHandler, Publication, Subscription, Transport};
