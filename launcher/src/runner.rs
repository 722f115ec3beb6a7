//! Executes the cached artifact as a subprocess.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use tokio::process::Command;

use crate::error::LaunchError;

const DISABLE_VERSION_CHECK: &str = "--disable-pip-version-check";
const REQUIRE_VIRTUALENV: &str = "--require-virtualenv";

/// Immutable description of one pip execution: the resolved interpreter and
/// the user's arguments, forwarded unmodified after the fixed flag prefix.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub python: PathBuf,
    pub forwarded_args: Vec<OsString>,
}

/// Run `pip.pyz` per `request` and return its exit code verbatim.
///
/// stdout/stderr are inherited so pip's native output reaches the user
/// uninterpreted. `--require-virtualenv` is always passed here: execution
/// always happens against a virtual-environment interpreter.
pub async fn pip(request: &ExecutionRequest, pyz: &Path) -> Result<i32, LaunchError> {
    let mut command = Command::new(&request.python);
    command
        .arg(pyz)
        .arg(DISABLE_VERSION_CHECK)
        .arg(REQUIRE_VIRTUALENV)
        .args(&request.forwarded_args);

    let status = run(command, &request.python).await?;
    let code = exit_code(status);
    tracing::info!(
        python = %request.python.display(),
        pyz = %pyz.display(),
        code,
        "executed pip"
    );
    Ok(code)
}

/// Query the cached artifact's version against `python`.
///
/// Never passes `--require-virtualenv`: a system interpreter is a valid probe
/// target before any environment exists.
pub async fn print_pip_version(python: &Path, pyz: &Path) -> Result<i32, LaunchError> {
    let mut command = Command::new(python);
    command.arg(pyz).arg(DISABLE_VERSION_CHECK).arg("--version");

    let status = run(command, python).await?;
    let code = exit_code(status);
    tracing::info!(python = %python.display(), code, "pip version probe");
    Ok(code)
}

async fn run(mut command: Command, python: &Path) -> Result<ExitStatus, LaunchError> {
    command.status().await.map_err(|source| LaunchError::Spawn {
        command: python.display().to_string(),
        source,
    })
}

fn exit_code(status: ExitStatus) -> i32 {
    // A signal-terminated child has no code; report generic failure.
    status.code().unwrap_or(1)
}
