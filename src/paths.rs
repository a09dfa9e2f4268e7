/// Data directory resolution for AutoTune.
///
/// AutoTune runs from a folder (often a USB drive) with a `data` directory
/// next to the executable. Settings and saved reports live under it.
use std::{
    env,
    path::{Path, PathBuf},
};

pub const DATA_DIR_ENV: &str = "AUTOTUNE_DATA_DIR";

/// Resolves the location of the `data` directory.
///
/// Resolution order:
/// 1. `AUTOTUNE_DATA_DIR`, when it names an existing directory.
/// 2. A `data` folder next to the executable.
/// 3. The repository `data` folder (development builds).
/// 4. `./data` under the current working directory.
///
/// The returned directory may not exist yet; see [`ensure_structure`].
pub fn resolve_data_dir() -> PathBuf {
    if let Some(val) = env::var_os(DATA_DIR_ENV) {
        let p = PathBuf::from(val);
        if p.is_dir() {
            return p;
        }
    }

    if let Ok(exe) = env::current_exe() {
        if let Some(dir) = exe.parent() {
            let p = dir.join("data");
            if p.is_dir() {
                return p;
            }
        }
    }

    let repo_data = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data");
    if repo_data.is_dir() {
        return repo_data;
    }

    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("data")
}

/// `(reports, settings)` under the data root.
pub fn subdirs(data_root: &Path) -> (PathBuf, PathBuf) {
    (data_root.join("reports"), data_root.join("settings"))
}

pub fn reports_dir(data_root: &Path) -> PathBuf {
    subdirs(data_root).0
}

/// Creates the `reports` and `settings` directories if missing.
pub fn ensure_structure(data_root: &Path) -> std::io::Result<()> {
    let (reports, settings) = subdirs(data_root);
    std::fs::create_dir_all(reports)?;
    std::fs::create_dir_all(settings)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ensure_structure_creates_subdirs() {
        let dir = TempDir::new().unwrap();
        ensure_structure(dir.path()).unwrap();
        assert!(dir.path().join("reports").is_dir());
        assert!(dir.path().join("settings").is_dir());
        // Idempotent
        ensure_structure(dir.path()).unwrap();
    }
}
