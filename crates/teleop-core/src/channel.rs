//! [`TelemetryChannel`] – latest-value cache with listener fan-out.
//!
//! One channel exists per telemetry kind.  It keeps only the most recent
//! sample and hands every new sample to the registered listeners.
//!
//! # Locking
//!
//! The cached value and the listener set are guarded by two independent
//! locks.  [`TelemetryChannel::set`] releases the value lock before taking a
//! snapshot of the listener set, and invokes the snapshot with no lock held,
//! so a listener may register or remove listeners (including itself) or read
//! the channel from inside its callback.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use teleop_core::channel::TelemetryChannel;
//!
//! let channel = TelemetryChannel::new("odometry");
//! assert_eq!(channel.get(), None);
//!
//! let seen = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&seen);
//! channel.add_listener(move |v: &u32| {
//!     counter.fetch_add(*v as usize, Ordering::SeqCst);
//! });
//!
//! channel.set(2);
//! channel.set(5);
//! assert_eq!(channel.get(), Some(5));
//! assert_eq!(seen.load(Ordering::SeqCst), 7);
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use teleop_types::{LaserScan, NavSatFix, Odometry, Pose};
use tracing::trace;

/// Handle returned by [`TelemetryChannel::add_listener`], used to remove the
/// listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Latest-value cache for one telemetry kind.
pub struct TelemetryChannel<T> {
    name: &'static str,
    latest: RwLock<Option<T>>,
    listeners: Mutex<Vec<(ListenerId, Listener<T>)>>,
    next_id: AtomicU64,
}

impl<T: Clone> TelemetryChannel<T> {
    /// Create an empty channel.  `name` only appears in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            latest: RwLock::new(None),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Store `value` as the latest sample, then hand it to every listener
    /// registered at this instant, in registration order.
    pub fn set(&self, value: T) {
        *self.latest.write() = Some(value.clone());

        let snapshot: Vec<Listener<T>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        trace!(channel = self.name, listeners = snapshot.len(), "sample stored");

        for listener in snapshot {
            listener(&value);
        }
    }

    /// The most recent sample, or `None` if nothing has arrived yet.
    pub fn get(&self) -> Option<T> {
        self.latest.read().clone()
    }

    /// Register `listener`; it sees every sample set after this call.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener.  A fan-out already in progress still completes
    /// with it.  Returns `false` if `id` was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> fmt::Debug for TelemetryChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryChannel")
            .field("name", &self.name)
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

/// The four telemetry caches owned by a controller.
#[derive(Debug)]
pub struct TelemetryChannels {
    pub nav_sat_fix: TelemetryChannel<NavSatFix>,
    pub laser_scan: TelemetryChannel<LaserScan>,
    pub odometry: TelemetryChannel<Odometry>,
    pub pose: TelemetryChannel<Pose>,
}

impl TelemetryChannels {
    pub fn new() -> Self {
        Self {
            nav_sat_fix: TelemetryChannel::new("nav_sat_fix"),
            laser_scan: TelemetryChannel::new("laser_scan"),
            odometry: TelemetryChannel::new("odometry"),
            pose: TelemetryChannel::new("pose"),
        }
    }
}

impl Default for TelemetryChannels {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn recorder(channel: &TelemetryChannel<u32>, tag: &'static str, log: &Arc<Mutex<Vec<String>>>) -> ListenerId {
        let log = Arc::clone(log);
        channel.add_listener(move |v| log.lock().push(format!("{tag}{v}")))
    }

    #[test]
    fn empty_channel_reads_none() {
        let channel: TelemetryChannel<u32> = TelemetryChannel::new("test");
        assert_eq!(channel.get(), None);
        assert_eq!(channel.listener_count(), 0);
    }

    #[test]
    fn last_write_wins_and_every_value_is_observed_in_order() {
        let channel = TelemetryChannel::new("test");
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&channel, "", &log);

        for v in [3, 1, 4, 1, 5, 9] {
            channel.set(v);
        }

        assert_eq!(channel.get(), Some(9));
        assert_eq!(*log.lock(), ["3", "1", "4", "1", "5", "9"]);
    }

    #[test]
    fn fan_out_follows_registration_order() {
        let channel = TelemetryChannel::new("test");
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&channel, "a", &log);
        recorder(&channel, "b", &log);
        recorder(&channel, "c", &log);

        channel.set(1);
        assert_eq!(*log.lock(), ["a1", "b1", "c1"]);
    }

    #[test]
    fn removed_listener_stops_receiving() {
        let channel = TelemetryChannel::new("test");
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder(&channel, "a", &log);
        recorder(&channel, "b", &log);

        channel.set(1);
        assert!(channel.remove_listener(a));
        assert!(!channel.remove_listener(a));
        channel.set(2);

        assert_eq!(*log.lock(), ["a1", "b1", "b2"]);
    }

    #[test]
    fn listener_removing_itself_finishes_current_pass() {
        let channel = Arc::new(TelemetryChannel::new("test"));
        let log = Arc::new(Mutex::new(Vec::new()));
        let own_id: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let id = {
            let inner = Arc::clone(&channel);
            let log = Arc::clone(&log);
            let own_id = Arc::clone(&own_id);
            channel.add_listener(move |v: &u32| {
                log.lock().push(format!("once{v}"));
                if let Some(id) = *own_id.lock() {
                    inner.remove_listener(id);
                }
            })
        };
        *own_id.lock() = Some(id);
        recorder(&channel, "after", &log);

        channel.set(1);
        channel.set(2);

        assert_eq!(*log.lock(), ["once1", "after1", "after2"]);
    }

    #[test]
    fn listener_may_register_and_read_during_fan_out() {
        let channel = Arc::new(TelemetryChannel::new("test"));
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let inner = Arc::clone(&channel);
            let log = Arc::clone(&log);
            channel.add_listener(move |v: &u32| {
                log.lock().push(format!("read{:?}", inner.get()));
                if *v == 1 {
                    let log = Arc::clone(&log);
                    inner.add_listener(move |v: &u32| log.lock().push(format!("late{v}")));
                }
            });
        }

        channel.set(1);
        channel.set(2);

        assert_eq!(*log.lock(), ["readSome(1)", "readSome(2)", "late2"]);
        assert_eq!(channel.listener_count(), 2);
    }

    #[test]
    fn concurrent_writers_never_tear_values() {
        let channel: Arc<TelemetryChannel<(u64, u64)>> = Arc::new(TelemetryChannel::new("test"));
        let writers: Vec<_> = (0..4u64)
            .map(|w| {
                let channel = Arc::clone(&channel);
                thread::spawn(move || {
                    for i in 0..500 {
                        channel.set((w * 1000 + i, w * 1000 + i));
                    }
                })
            })
            .collect();

        for _ in 0..2000 {
            if let Some((a, b)) = channel.get() {
                assert_eq!(a, b);
            }
        }
        for writer in writers {
            writer.join().unwrap();
        }
        assert!(channel.get().is_some());
    }
}
