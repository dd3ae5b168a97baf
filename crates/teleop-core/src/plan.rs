//! Motion-plan lifecycle: which plan, if any, drives the velocity command.
//!
//! ```text
//!            run(p)                 stop() / resumable
//!   Idle ───────────► Running(p) ─────────────────────► Paused(kind)
//!    ▲                  │  ▲                                 │
//!    │  stop() / not    │  │  run(q) stops p first           │ resume_plan()
//!    └──── resumable ───┘  └─────────────────────────────────┘
//! ```
//!
//! `stop()` from `Paused` drops the paused kind and lands in `Idle`.
//! Plan hooks are always invoked with the state lock released.
//!
//! Transitions (`run`, `stop`, `resume`, `load`) are serialized as a whole,
//! so concurrent callers see them in some total order.  The transition lock
//! is reentrant: a hook may start or stop a plan on its own thread, but must
//! not wait on another thread that does.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::controller::RobotController;
use crate::publisher::VelocityPublisher;

/// Identifies a kind of plan well enough to build a fresh instance of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanKind(pub u32);

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plan#{}", self.0)
    }
}

/// A unit of motion logic driven through the controller handle it receives.
pub trait MotionPlan: Send + Sync {
    /// Kind used to rebuild this plan after a pause.  `None` for ad-hoc plans.
    fn kind(&self) -> Option<PlanKind>;

    /// Start driving.  May return immediately and keep working elsewhere.
    fn run(&self, controller: RobotController);

    /// Stop driving.  Must return promptly.
    fn stop(&self);

    /// Whether a stopped instance should be remembered for `resume_plan`.
    fn is_resumable(&self) -> bool;
}

/// Rebuilds a plan from its [`PlanKind`].
pub trait PlanFactory: Send + Sync {
    fn create(&self, kind: PlanKind) -> Option<Arc<dyn MotionPlan>>;
}

impl<F> PlanFactory for F
where
    F: Fn(PlanKind) -> Option<Arc<dyn MotionPlan>> + Send + Sync,
{
    fn create(&self, kind: PlanKind) -> Option<Arc<dyn MotionPlan>> {
        self(kind)
    }
}

/// Current plan lifecycle state.
#[derive(Clone, Default)]
pub enum PlanState {
    #[default]
    Idle,
    Running(Arc<dyn MotionPlan>),
    Paused(PlanKind),
}

impl fmt::Debug for PlanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Running(plan) => f.debug_tuple("Running").field(&plan.kind()).finish(),
            Self::Paused(kind) => f.debug_tuple("Paused").field(kind).finish(),
        }
    }
}

/// What survives a restart of the hosting process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_plan: Option<PlanKind>,
}

/// The plan state machine.
pub struct PlanController {
    state: Mutex<PlanState>,
    transition: ReentrantMutex<()>,
    factory: Arc<dyn PlanFactory>,
}

impl PlanController {
    pub fn new(factory: Arc<dyn PlanFactory>) -> Self {
        Self {
            state: Mutex::new(PlanState::Idle),
            transition: ReentrantMutex::new(()),
            factory,
        }
    }

    /// Stop whatever runs, then start `plan`.
    pub fn run(&self, plan: Arc<dyn MotionPlan>, publisher: &VelocityPublisher, controller: &RobotController) {
        let _transition = self.transition.lock();
        self.halt(publisher);
        publisher.arm();
        // Overwrites any kind the halt above just paused.
        *self.state.lock() = PlanState::Running(Arc::clone(&plan));
        info!(kind = ?plan.kind(), "plan started");
        plan.run(controller.clone());
    }

    /// Stop the running plan, remembering it if resumable, and bring the
    /// vehicle to a halt.  Returns whether a resumable plan was captured.
    pub fn stop(&self, publisher: &VelocityPublisher) -> bool {
        let _transition = self.transition.lock();
        self.halt(publisher)
    }

    /// Rebuild and run the paused plan.  `false` when nothing is paused or
    /// the factory does not know the kind.
    pub fn resume(&self, publisher: &VelocityPublisher, controller: &RobotController) -> bool {
        let _transition = self.transition.lock();
        let PlanState::Paused(kind) = *self.state.lock() else {
            return false;
        };
        let Some(plan) = self.factory.create(kind) else {
            warn!(%kind, "cannot resume: unknown plan kind");
            return false;
        };
        self.run(plan, publisher, controller);
        true
    }

    /// `stop` body; the caller holds the transition lock.
    fn halt(&self, publisher: &VelocityPublisher) -> bool {
        let previous = std::mem::take(&mut *self.state.lock());

        let mut paused = None;
        if let PlanState::Running(plan) = previous {
            plan.stop();
            if plan.is_resumable() {
                paused = plan.kind();
            }
            debug!(kind = ?plan.kind(), resumable = paused.is_some(), "plan stopped");
        }

        publisher.disarm_and_zero();

        let Some(kind) = paused else {
            return false;
        };
        let mut state = self.state.lock();
        if matches!(*state, PlanState::Idle) {
            *state = PlanState::Paused(kind);
            info!(%kind, "plan paused");
            true
        } else {
            // The stop hook itself started another plan.
            false
        }
    }

    pub fn has_paused_plan(&self) -> bool {
        matches!(*self.state.lock(), PlanState::Paused(_))
    }

    pub fn paused_plan(&self) -> Option<PlanKind> {
        match *self.state.lock() {
            PlanState::Paused(kind) => Some(kind),
            _ => None,
        }
    }

    /// The running plan, if any.
    pub fn current_plan(&self) -> Option<Arc<dyn MotionPlan>> {
        match &*self.state.lock() {
            PlanState::Running(plan) => Some(Arc::clone(plan)),
            _ => None,
        }
    }

    pub fn state(&self) -> PlanState {
        self.state.lock().clone()
    }

    pub fn save(&self) -> PersistedState {
        PersistedState {
            paused_plan: self.paused_plan(),
        }
    }

    /// Restore the paused slot.  Never starts a plan, and leaves a running
    /// plan alone.
    pub fn load(&self, persisted: PersistedState) {
        let _transition = self.transition.lock();
        let mut state = self.state.lock();
        if matches!(*state, PlanState::Running(_)) {
            debug!("persisted state ignored: a plan is running");
            return;
        }
        *state = match persisted.paused_plan {
            Some(kind) => PlanState::Paused(kind),
            None => PlanState::Idle,
        };
    }
}

impl fmt::Debug for PlanController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanController").field("state", &*self.state.lock()).finish()
    }
}
