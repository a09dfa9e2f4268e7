//! Load and persist engine settings in the data directory.
//!
//! Settings live in `data/settings/engine_settings.json`. A missing file means
//! defaults; a file that exists but does not parse is an error, so a typo is
//! never silently replaced by defaults. Every section and field is optional
//! in the file.
use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::evaluator::Thresholds;
use crate::executor::ExecutorSettings;
use crate::paths;
use crate::planner::PlannerSettings;

pub const SETTINGS_FILE: &str = "engine_settings.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub thresholds: Thresholds,
    pub planner: PlannerSettings,
    pub executor: ExecutorSettings,
}

// Build the full path to the settings JSON within the `settings` directory.
pub fn settings_file_path(data_root: &Path) -> PathBuf {
    let (_reports, settings) = paths::subdirs(data_root);
    settings.join(SETTINGS_FILE)
}

/// Loads settings from `data_root`, falling back to defaults when the file
/// does not exist.
pub fn load_settings(data_root: &Path) -> Result<EngineSettings> {
    let path = settings_file_path(data_root);
    match fs::read_to_string(&path) {
        Ok(text) => serde_json::from_str(&text).map_err(|e| EngineError::parse(path.display().to_string(), e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, using defaults");
            Ok(EngineSettings::default())
        }
        Err(e) => Err(EngineError::io(path, e)),
    }
}

/// Saves settings as pretty-printed JSON, creating `settings/` if needed.
pub fn save_settings(data_root: &Path, settings: &EngineSettings) -> Result<()> {
    let path = settings_file_path(data_root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
    }
    let pretty = serde_json::to_string_pretty(settings).map_err(|source| EngineError::Serialize {
        what: "engine settings".into(),
        source,
    })?;
    fs::write(&path, pretty).map_err(|e| EngineError::io(path, e))
}
