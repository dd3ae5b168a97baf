//! Test doubles shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use teleop_middleware::{ErrorSink, MessageHandler, Publication, Subscription, Transport};
use teleop_types::{Event, Message, TeleopError, Twist};

use crate::controller::RobotController;
use crate::plan::{MotionPlan, PlanKind};

/// Poll `condition` for up to two seconds.
pub(crate) fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

// ────────────────────────────────────────────────────────────────────────────
// Publication
// ────────────────────────────────────────────────────────────────────────────

/// Records every published twist.
pub(crate) struct RecordingPublication {
    topic: String,
    published: Mutex<Vec<Twist>>,
    closed: AtomicBool,
}

impl RecordingPublication {
    pub(crate) fn new(topic: &str) -> Arc<Self> {
        Arc::new(Self {
            topic: topic.to_string(),
            published: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn published(&self) -> Vec<Twist> {
        self.published.lock().clone()
    }

    pub(crate) fn count_of(&self, twist: &Twist) -> usize {
        self.published.lock().iter().filter(|t| *t == twist).count()
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Publication for RecordingPublication {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn publish(&self, payload: Message) -> Result<usize, TeleopError> {
        if self.is_shut_down() {
            return Err(TeleopError::Closed {
                topic: self.topic.clone(),
            });
        }
        match payload {
            Message::Twist(twist) => self.published.lock().push(twist),
            other => panic!("unexpected {} on {}", other.kind(), self.topic),
        }
        Ok(1)
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transport
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Bindings {
    handlers: HashMap<u64, (String, Option<MessageHandler>)>,
    publications: Vec<Arc<RecordingPublication>>,
    subscribed: Vec<String>,
    failing_topic: Option<String>,
}

/// A transport whose deliveries are driven by the test thread.
#[derive(Clone, Default)]
pub(crate) struct RecordingTransport {
    bindings: Arc<Mutex<Bindings>>,
    next_id: Arc<AtomicU64>,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make every later bind of `topic` fail.
    pub(crate) fn fail_on(&self, topic: &str) {
        self.bindings.lock().failing_topic = Some(topic.to_string());
    }

    /// Deliver `payload` to every live subscription on `topic`, on the
    /// calling thread.
    pub(crate) fn deliver(&self, topic: &str, payload: Message) {
        let ids: Vec<u64> = self
            .bindings
            .lock()
            .handlers
            .iter()
            .filter(|(_, (bound, _))| bound == topic)
            .map(|(id, _)| *id)
            .collect();

        for id in ids {
            let handler = self
                .bindings
                .lock()
                .handlers
                .get_mut(&id)
                .and_then(|(_, handler)| handler.take());
            let Some(mut handler) = handler else { continue };
            handler(Event::new(topic, payload.clone()));
            if let Some((_, slot)) = self.bindings.lock().handlers.get_mut(&id) {
                *slot = Some(handler);
            }
        }
    }

    /// Number of subscriptions currently live.
    pub(crate) fn live_subscriptions(&self) -> usize {
        self.bindings.lock().handlers.len()
    }

    /// Every topic ever subscribed, in order.
    pub(crate) fn subscribed_topics(&self) -> Vec<String> {
        self.bindings.lock().subscribed.clone()
    }

    /// The most recent publication created on `topic`.
    pub(crate) fn publication(&self, topic: &str) -> Option<Arc<RecordingPublication>> {
        self.bindings
            .lock()
            .publications
            .iter()
            .rev()
            .find(|p| p.topic() == topic)
            .cloned()
    }

    fn check(&self, topic: &str) -> Result<(), TeleopError> {
        match &self.bindings.lock().failing_topic {
            Some(failing) if failing == topic => {
                Err(TeleopError::Channel(format!("cannot bind {topic}")))
            }
            _ => Ok(()),
        }
    }
}

struct RecordingSubscription {
    id: u64,
    topic: String,
    bindings: Arc<Mutex<Bindings>>,
}

impl Subscription for RecordingSubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn shutdown(&mut self) {
        self.bindings.lock().handlers.remove(&self.id);
    }
}

impl Transport for RecordingTransport {
    fn subscribe(
        &self,
        topic: &str,
        on_event: MessageHandler,
        _on_error: ErrorSink,
    ) -> Result<Box<dyn Subscription>, TeleopError> {
        self.check(topic)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut bindings = self.bindings.lock();
        bindings.handlers.insert(id, (topic.to_string(), Some(on_event)));
        bindings.subscribed.push(topic.to_string());
        Ok(Box::new(RecordingSubscription {
            id,
            topic: topic.to_string(),
            bindings: Arc::clone(&self.bindings),
        }))
    }

    fn advertise(&self, topic: &str) -> Result<Arc<dyn Publication>, TeleopError> {
        self.check(topic)?;
        let publication = RecordingPublication::new(topic);
        self.bindings.lock().publications.push(Arc::clone(&publication));
        Ok(publication)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Plans
// ────────────────────────────────────────────────────────────────────────────

pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

/// A plan that journals its lifecycle hooks and optionally forces one
/// command when run.
pub(crate) struct ScriptedPlan {
    pub(crate) name: &'static str,
    pub(crate) kind: Option<PlanKind>,
    pub(crate) resumable: bool,
    pub(crate) command: Option<(f64, f64, f64)>,
    pub(crate) journal: Journal,
}

impl ScriptedPlan {
    pub(crate) fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            kind: None,
            resumable: false,
            command: None,
            journal: Arc::clone(journal),
        }
    }

    pub(crate) fn resumable(mut self, kind: u32) -> Self {
        self.kind = Some(PlanKind(kind));
        self.resumable = true;
        self
    }

    pub(crate) fn driving(mut self, lx: f64, ly: f64, az: f64) -> Self {
        self.command = Some((lx, ly, az));
        self
    }

    pub(crate) fn boxed(self) -> Arc<dyn MotionPlan> {
        Arc::new(self)
    }
}

impl MotionPlan for ScriptedPlan {
    fn kind(&self) -> Option<PlanKind> {
        self.kind
    }

    fn run(&self, controller: RobotController) {
        self.journal.lock().push(format!("{}:run", self.name));
        if let Some((lx, ly, az)) = self.command {
            controller.force_velocity(lx, ly, az);
        }
    }

    fn stop(&self) {
        self.journal.lock().push(format!("{}:stop", self.name));
    }

    fn is_resumable(&self) -> bool {
        self.resumable
    }
}
