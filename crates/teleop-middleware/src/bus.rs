//! In-process, named-topic publish/subscribe bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.  Topics are created lazily on first use.
//!
//! The bus exposes two APIs:
//!
//! * **Async** (`publish` / `subscribe_to`) – a [`TopicReceiver`] awaited from
//!   inside a Tokio runtime.
//! * **[`Transport`]** (`subscribe` / `advertise`) – callback delivery on a
//!   dedicated thread per subscription, the way the controller consumes
//!   telemetry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use teleop_types::{Event, Message, TeleopError};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, warn};

use crate::transport::{ErrorSink, MessageHandler, Publication, Subscription, Transport};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Shared event bus. Clone it cheaply – all clones share the same topics.
#[derive(Clone, Debug)]
pub struct EventBus {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<Event>>>>,
    capacity: usize,
}

impl EventBus {
    /// Create a new bus with the given per-topic channel capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero (a broadcast channel needs room for at
    /// least one message).
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "EventBus capacity must be non-zero");
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            capacity,
        }
    }

    /// Publish `payload` on `topic`.
    ///
    /// Returns the number of active receivers that were handed the event.
    /// Returns `Ok(0)` when nobody is listening on the topic (this is a
    /// normal condition, not an error).
    pub fn publish(&self, topic: &str, payload: Message) -> Result<usize, TeleopError> {
        Ok(self.sender(topic).send(Event::new(topic, payload)).unwrap_or(0))
    }

    /// Subscribe to `topic` for async consumption.
    pub fn subscribe_to(&self, topic: &str) -> TopicReceiver {
        TopicReceiver {
            topic: topic.to_string(),
            receiver: self.sender(topic).subscribe(),
        }
    }

    /// Number of live receivers on `topic`, including delivery threads.
    pub fn receiver_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Event> {
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Transport for EventBus {
    fn subscribe(
        &self,
        topic: &str,
        on_event: MessageHandler,
        on_error: ErrorSink,
    ) -> Result<Box<dyn Subscription>, TeleopError> {
        let receiver = self.sender(topic).subscribe();
        let subscription = DeliveryThread::spawn(topic, receiver, on_event, on_error)?;
        debug!(topic, "subscription established");
        Ok(Box::new(subscription))
    }

    fn advertise(&self, topic: &str) -> Result<Arc<dyn Publication>, TeleopError> {
        debug!(topic, "publication established");
        Ok(Arc::new(BusPublication {
            topic: topic.to_string(),
            sender: self.sender(topic),
            closed: AtomicBool::new(false),
        }))
    }
}

// ---------------------------------------------------------------------------
// Async receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single topic.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: String,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.  The caller decides whether to
    ///   continue or abort.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The topic this receiver is bound to.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

// ---------------------------------------------------------------------------
// Callback delivery
// ---------------------------------------------------------------------------

/// A subscription served by its own thread.
///
/// The thread drives a single-threaded Tokio runtime that awaits the
/// broadcast receiver and hands each event to the callback in order.
struct DeliveryThread {
    topic: String,
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl DeliveryThread {
    fn spawn(
        topic: &str,
        receiver: broadcast::Receiver<Event>,
        on_event: MessageHandler,
        on_error: ErrorSink,
    ) -> Result<Self, TeleopError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .map_err(|e| TeleopError::Channel(format!("delivery runtime for {topic}: {e}")))?;
        let (cancel, cancelled) = oneshot::channel();

        let owned_topic = topic.to_string();
        let handle = thread::Builder::new()
            .name(format!("deliver{topic}"))
            .spawn(move || {
                runtime.block_on(deliver(owned_topic, receiver, cancelled, on_event, on_error));
            })
            .map_err(|e| TeleopError::Channel(format!("delivery thread for {topic}: {e}")))?;

        Ok(Self {
            topic: topic.to_string(),
            cancel: Some(cancel),
            handle: Some(handle),
        })
    }
}

async fn deliver(
    topic: String,
    mut receiver: broadcast::Receiver<Event>,
    mut cancelled: oneshot::Receiver<()>,
    mut on_event: MessageHandler,
    on_error: ErrorSink,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut cancelled => break,
            received = receiver.recv() => match received {
                Ok(event) => on_event(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(topic = %topic, skipped, "delivery lagged");
                    on_error(&TeleopError::Lagged {
                        topic: topic.clone(),
                        skipped,
                    });
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!(topic = %topic, "delivery thread stopped");
}

impl Subscription for DeliveryThread {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn shutdown(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            // The thread may already be gone; nothing to cancel then.
            let _ = cancel.send(());
        }
        let Some(handle) = self.handle.take() else {
            return;
        };
        // Shutting down from inside the callback: the loop exits on return.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            error!(topic = %self.topic, "delivery thread panicked");
        }
    }
}

impl Drop for DeliveryThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct BusPublication {
    topic: String,
    sender: broadcast::Sender<Event>,
    closed: AtomicBool,
}

impl Publication for BusPublication {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn publish(&self, payload: Message) -> Result<usize, TeleopError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TeleopError::Closed {
                topic: self.topic.clone(),
            });
        }
        Ok(self.sender.send(Event::new(&self.topic, payload)).unwrap_or(0))
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
