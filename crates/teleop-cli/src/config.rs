//! Settings file – reads/writes `~/.teleop/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use teleop_core::{ConfigSource, ControllerConfig};
use teleop_types::TeleopError;
use tracing::warn;

/// Contents of `~/.teleop/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(default)]
    pub sim: SimConfig,
}

/// Simulated vehicle settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Odometry/pose publish rate.
    #[serde(default = "default_rate_hz")]
    pub rate_hz: u32,

    /// Latitude of the simulated start point.
    #[serde(default = "default_origin_latitude")]
    pub origin_latitude: f64,

    #[serde(default = "default_origin_longitude")]
    pub origin_longitude: f64,
}

fn default_rate_hz() -> u32 {
    20
}
fn default_origin_latitude() -> f64 {
    59.9139
}
fn default_origin_longitude() -> f64 {
    10.7522
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            rate_hz: default_rate_hz(),
            origin_latitude: default_origin_latitude(),
            origin_longitude: default_origin_longitude(),
        }
    }
}

/// `~/.teleop`, or `./.teleop` when no home directory is known.
pub fn home_dir() -> PathBuf {
    teleop_dir_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn teleop_dir_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".teleop")
}

/// Return the path to `~/.teleop/config.toml`.
pub fn config_path() -> PathBuf {
    home_dir().join("config.toml")
}

/// Load the config.  `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, TeleopError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, TeleopError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| TeleopError::Config(format!("failed to read {}: {e}", path.display())))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| TeleopError::Config(format!("failed to parse {}: {e}", path.display())))?;
    cfg.controller.apply_env_overrides();
    Ok(Some(cfg))
}

/// Save the config, creating `~/.teleop/` if necessary.
pub fn save(cfg: &Config) -> Result<(), TeleopError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), TeleopError> {
    let raw = toml::to_string_pretty(cfg).map_err(|e| TeleopError::Config(format!("failed to serialize config: {e}")))?;
    write_private(path, &raw).map_err(TeleopError::Config)
}

/// Write `contents` readable by the owner only, creating the parent
/// directory (owner-only as well) on the way.
pub(crate) fn write_private(path: &Path, contents: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("failed to create {}: {e}", parent.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("failed to restrict {}: {e}", parent.display()))?;
        }
    }
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(contents.as_bytes()))
            .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
    }
    #[cfg(not(unix))]
    fs::write(path, contents).map_err(|e| format!("failed to write {}: {e}", path.display()))?;
    Ok(())
}

/// Re-reads the `[controller]` table every time the controller initializes.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> ControllerConfig {
        match load_from(&self.path) {
            Ok(Some(cfg)) => cfg.controller,
            missing_or_broken => {
                if let Err(e) = missing_or_broken {
                    warn!(error = %e, "using default controller configuration");
                }
                let mut cfg = ControllerConfig::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_in(dir: &tempfile::TempDir) -> PathBuf {
        teleop_dir_for_home(&dir.path().to_string_lossy()).join("config.toml")
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        assert!(load_from(&path_in(&dir)).expect("no error").is_none());
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = path_in(&dir);
        save_to(&Config::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.controller.publish_period_ms, 80);
        assert_eq!(loaded.sim.rate_hz, 20);
    }

    #[test]
    fn partial_controller_table_keeps_other_defaults() {
        let cfg: Config = toml::from_str("[controller]\nodometry_topic = \"/wheel/odom\"\n").expect("parse");
        assert_eq!(cfg.controller.odometry_topic, "/wheel/odom");
        assert_eq!(cfg.controller.command_topic, "/cmd_vel");
        assert_eq!(cfg.sim, SimConfig::default());
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = path_in(&dir);
        write_private(&path, "[controller\n").expect("write");
        assert!(matches!(load_from(&path), Err(TeleopError::Config(_))));
    }

    #[test]
    fn file_source_rereads_on_every_load() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = path_in(&dir);
        let source = FileConfigSource::new(path.clone());
        assert_eq!(source.load().pose_topic, "/pose");

        let mut cfg = Config::default();
        cfg.controller.pose_topic = "/amcl_pose".to_string();
        save_to(&cfg, &path).expect("save");
        assert_eq!(source.load().pose_topic, "/amcl_pose");
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = path_in(&dir);
        save_to(&Config::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = fs::metadata(path.parent().unwrap()).expect("dir metadata").permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }
}
