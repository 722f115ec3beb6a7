//! Interpreter resolution: reuse the active virtual environment or create one
//! next to the project's `pyproject.toml`.

use std::env;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::EnvError;

/// Marker file identifying a project root.
pub const PROJECT_MARKER: &str = "pyproject.toml";

/// The activated virtual environment, when `VIRTUAL_ENV` points at one.
#[must_use]
pub fn active_venv() -> Option<PathBuf> {
    let root = PathBuf::from(env::var_os("VIRTUAL_ENV")?);
    root.is_dir().then_some(root)
}

/// Interpreter path inside a virtual environment directory.
#[must_use]
pub fn venv_python(venv: &Path) -> PathBuf {
    if cfg!(windows) {
        venv.join("Scripts").join("python.exe")
    } else {
        venv.join("bin").join("python")
    }
}

/// Walk `start` and its ancestors looking for a `pyproject.toml`.
pub fn find_project_root(start: &Path) -> Result<PathBuf, EnvError> {
    for dir in start.ancestors() {
        tracing::debug!(path = %dir.display(), "checking for pyproject.toml");
        if dir.join(PROJECT_MARKER).is_file() {
            tracing::info!(path = %dir.display(), "found pyproject.toml");
            return Ok(dir.to_path_buf());
        }
    }
    Err(EnvError::NoProjectRoot)
}

/// Locate a base interpreter on PATH for venv creation and version probes.
pub fn system_python() -> Result<PathBuf, EnvError> {
    which::which("python3")
        .or_else(|_| which::which("python"))
        .map_err(EnvError::NoPython)
}

/// Create `<root>/.venv` with the base interpreter's venv module and return
/// the new environment's interpreter path.
pub async fn create_venv(root: &Path, base_python: &Path) -> Result<PathBuf, EnvError> {
    let venv = root.join(".venv");
    let status = Command::new(base_python)
        .arg("-m")
        .arg("venv")
        .arg(&venv)
        .status()
        .await
        .map_err(|source| EnvError::VenvCreate {
            path: venv.clone(),
            source,
        })?;
    if !status.success() {
        return Err(EnvError::VenvCreateStatus { status });
    }
    tracing::info!(path = %venv.display(), "created virtual environment");
    Ok(venv_python(&venv))
}
