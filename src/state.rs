use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::executor::RunControl;
use crate::paths;
use crate::settings::{load_settings, EngineSettings};

/// Process-wide state shared by the CLI commands.
#[derive(Debug, Clone)]
pub struct AppState {
    pub data_dir: Arc<PathBuf>,
    pub settings: EngineSettings,
    /// Stop flag for the run in progress
    pub run_control: RunControl,
}

impl AppState {
    /// Resolves the data directory, creates its layout and loads settings.
    pub fn initialize(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.unwrap_or_else(paths::resolve_data_dir);
        paths::ensure_structure(&data_dir).map_err(|e| EngineError::io(&data_dir, e))?;
        let settings = load_settings(&data_dir)?;
        Ok(Self {
            data_dir: Arc::new(data_dir),
            settings,
            run_control: RunControl::new(),
        })
    }

    pub fn reports_dir(&self) -> PathBuf {
        paths::reports_dir(&self.data_dir)
    }
}
