//! Paused-plan persistence in `~/.teleop/state.json`.

use std::fs;
use std::path::{Path, PathBuf};

use teleop_core::PersistedState;
use teleop_types::TeleopError;

use crate::config::{home_dir, write_private};

pub fn state_path() -> PathBuf {
    home_dir().join("state.json")
}

/// Read the saved state.  A missing file means nothing was saved.
pub fn load_from(path: &Path) -> Result<PersistedState, TeleopError> {
    if !path.exists() {
        return Ok(PersistedState::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| TeleopError::Persistence(format!("failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&raw).map_err(|e| TeleopError::Persistence(format!("failed to parse {}: {e}", path.display())))
}

pub fn save_to(state: &PersistedState, path: &Path) -> Result<(), TeleopError> {
    let raw = serde_json::to_string_pretty(state)
        .map_err(|e| TeleopError::Persistence(format!("failed to serialize state: {e}")))?;
    write_private(path, &raw).map_err(TeleopError::Persistence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use teleop_core::PlanKind;

    #[test]
    fn missing_file_means_nothing_paused() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let state = load_from(&dir.path().join("state.json")).expect("load");
        assert_eq!(state.paused_plan, None);
    }

    #[test]
    fn paused_plan_survives_a_restart() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("nested").join("state.json");
        let saved = PersistedState {
            paused_plan: Some(PlanKind(1)),
        };
        save_to(&saved, &path).expect("save");
        assert_eq!(load_from(&path).expect("load"), saved);

        save_to(&PersistedState::default(), &path).expect("save");
        assert_eq!(fs::read_to_string(&path).expect("read").trim(), "{}");
        assert_eq!(load_from(&path).expect("load").paused_plan, None);
    }

    #[test]
    fn garbage_is_a_persistence_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("state.json");
        fs::write(&path, "not json").expect("write");
        assert!(matches!(load_from(&path), Err(TeleopError::Persistence(_))));
    }
}
