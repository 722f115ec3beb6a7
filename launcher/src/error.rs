use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

/// Failure while retrieving the artifact over HTTP.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GET {url} returned {status}")]
    UnexpectedStatus { url: Url, status: StatusCode },

    #[error("GET {url} failed: {source}")]
    Transport { url: Url, source: reqwest::Error },
}

/// Failure while resolving an interpreter to execute with.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("no pyproject.toml found")]
    NoProjectRoot,

    #[error("no python interpreter found on PATH")]
    NoPython(#[source] which::Error),

    #[error("failed to determine current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("failed to create virtual environment at {path}: {source}")]
    VenvCreate { path: PathBuf, source: io::Error },

    #[error("virtual environment creation exited with {status}")]
    VenvCreateStatus { status: ExitStatus },
}

/// Fatal launcher failure.
///
/// The underlying tool's own non-zero exit is not represented here; its code
/// is propagated verbatim as the launcher's exit code.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("failed to write {path}: {source}")]
    CacheWrite { path: PathBuf, source: io::Error },

    #[error("failed to run {command}: {source}")]
    Spawn { command: String, source: io::Error },

    #[error("pip --version returned {code}")]
    VersionProbe { code: i32 },
}
