//! Controller configuration: topic names and publish cadence.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Topic names and timing for one controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Where velocity commands are published.
    #[serde(default = "default_command_topic")]
    pub command_topic: String,

    #[serde(default = "default_nav_sat_fix_topic")]
    pub nav_sat_fix_topic: String,

    #[serde(default = "default_laser_scan_topic")]
    pub laser_scan_topic: String,

    #[serde(default = "default_odometry_topic")]
    pub odometry_topic: String,

    #[serde(default = "default_pose_topic")]
    pub pose_topic: String,

    /// Re-send interval of the armed velocity command.
    #[serde(default = "default_publish_period_ms")]
    pub publish_period_ms: u64,
}

fn default_command_topic() -> String {
    "/cmd_vel".to_string()
}
fn default_nav_sat_fix_topic() -> String {
    "/navsat/fix".to_string()
}
fn default_laser_scan_topic() -> String {
    "/scan".to_string()
}
fn default_odometry_topic() -> String {
    "/odom".to_string()
}
fn default_pose_topic() -> String {
    "/pose".to_string()
}
fn default_publish_period_ms() -> u64 {
    80
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            command_topic: default_command_topic(),
            nav_sat_fix_topic: default_nav_sat_fix_topic(),
            laser_scan_topic: default_laser_scan_topic(),
            odometry_topic: default_odometry_topic(),
            pose_topic: default_pose_topic(),
            publish_period_ms: default_publish_period_ms(),
        }
    }
}

impl ControllerConfig {
    /// The publish period, never shorter than one millisecond.
    pub fn publish_period(&self) -> Duration {
        Duration::from_millis(self.publish_period_ms.max(1))
    }

    /// Apply `TELEOP_*` environment variable overrides.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `TELEOP_COMMAND_TOPIC` | `command_topic` |
    /// | `TELEOP_NAV_SAT_FIX_TOPIC` | `nav_sat_fix_topic` |
    /// | `TELEOP_LASER_SCAN_TOPIC` | `laser_scan_topic` |
    /// | `TELEOP_ODOMETRY_TOPIC` | `odometry_topic` |
    /// | `TELEOP_POSE_TOPIC` | `pose_topic` |
    /// | `TELEOP_PUBLISH_PERIOD_MS` | `publish_period_ms` |
    ///
    /// Unparseable or zero periods are ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Same as [`apply_env_overrides`][Self::apply_env_overrides] with an
    /// arbitrary variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let topics = [
            ("TELEOP_COMMAND_TOPIC", &mut self.command_topic),
            ("TELEOP_NAV_SAT_FIX_TOPIC", &mut self.nav_sat_fix_topic),
            ("TELEOP_LASER_SCAN_TOPIC", &mut self.laser_scan_topic),
            ("TELEOP_ODOMETRY_TOPIC", &mut self.odometry_topic),
            ("TELEOP_POSE_TOPIC", &mut self.pose_topic),
        ];
        for (key, field) in topics {
            if let Some(v) = lookup(key).filter(|v| !v.is_empty()) {
                *field = v;
            }
        }
        if let Some(v) = lookup("TELEOP_PUBLISH_PERIOD_MS")
            && let Ok(ms) = v.trim().parse::<u64>()
            && ms > 0
        {
            self.publish_period_ms = ms;
        }
    }
}

/// Supplies the configuration in effect.  Queried on every
/// `initialize()`, so a source may change between re-initializations.
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> ControllerConfig;
}

impl ConfigSource for ControllerConfig {
    fn load(&self) -> ControllerConfig {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_table_yields_defaults() {
        let cfg: ControllerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, ControllerConfig::default());
        assert_eq!(cfg.command_topic, "/cmd_vel");
        assert_eq!(cfg.publish_period(), Duration::from_millis(80));
    }

    #[test]
    fn zero_period_is_clamped() {
        let cfg = ControllerConfig {
            publish_period_ms: 0,
            ..ControllerConfig::default()
        };
        assert_eq!(cfg.publish_period(), Duration::from_millis(1));
    }

    #[test]
    fn overrides_replace_topics_and_ignore_bad_periods() {
        let vars: HashMap<&str, &str> = [
            ("TELEOP_COMMAND_TOPIC", "/robot/cmd"),
            ("TELEOP_POSE_TOPIC", ""),
            ("TELEOP_PUBLISH_PERIOD_MS", "fast"),
        ]
        .into();
        let mut cfg = ControllerConfig::default();
        cfg.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.command_topic, "/robot/cmd");
        assert_eq!(cfg.pose_topic, "/pose");
        assert_eq!(cfg.publish_period_ms, 80);

        cfg.apply_overrides(|k| (k == "TELEOP_PUBLISH_PERIOD_MS").then(|| "0".to_string()));
        assert_eq!(cfg.publish_period_ms, 80);
        cfg.apply_overrides(|k| (k == "TELEOP_PUBLISH_PERIOD_MS").then(|| "25".to_string()));
        assert_eq!(cfg.publish_period_ms, 25);
    }
}
