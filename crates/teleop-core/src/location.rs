//! [`LocationProvider`] – geographic location fed by satellite fixes.
//!
//! Registered on the fix channel at construction so that observers interested
//! only in "where is the vehicle on the map" can subscribe without handling
//! raw fixes.

use teleop_types::{FixStatus, NavSatFix};

use crate::channel::{ListenerId, TelemetryChannel};

/// A geographic position derived from a [`NavSatFix`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// `false` when the receiver reported no fix for this sample.
    pub has_fix: bool,
}

impl From<&NavSatFix> for GeoLocation {
    fn from(fix: &NavSatFix) -> Self {
        Self {
            latitude: fix.latitude,
            longitude: fix.longitude,
            altitude: fix.altitude,
            has_fix: fix.status != FixStatus::NoFix,
        }
    }
}

/// Latest known location plus its own listener fan-out.
#[derive(Debug)]
pub struct LocationProvider {
    locations: TelemetryChannel<GeoLocation>,
}

impl LocationProvider {
    pub fn new() -> Self {
        Self {
            locations: TelemetryChannel::new("location"),
        }
    }

    /// Feed a new fix.
    pub fn on_fix(&self, fix: &NavSatFix) {
        self.locations.set(GeoLocation::from(fix));
    }

    /// The most recent location, or `None` before the first fix.
    pub fn last_location(&self) -> Option<GeoLocation> {
        self.locations.get()
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&GeoLocation) + Send + Sync + 'static,
    {
        self.locations.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.locations.remove_listener(id)
    }
}

impl Default for LocationProvider {
    fn default() -> Self {
        Self::new()
    }
}
