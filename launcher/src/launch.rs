//! Coordinator: decides blocking vs. background fetch, runs pip and the
//! refresh concurrently, and sequences console output and cache replacement.
//!
//! Exactly two tasks run in the concurrent phase, joined by `tokio::join!`:
//! the runner and (unless the artifact was fetched moments ago) a background
//! refresh. The refresh waits on the runner's [`CompletionSignal`] before
//! touching the cache or printing any chrome, so pip's own output is never
//! interleaved with the launcher's.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use reqwest::{Client, StatusCode};
use tokio::sync::{oneshot, watch};

use crate::cache::PyzCache;
use crate::config::LauncherConfig;
use crate::console;
use crate::environment;
use crate::error::{EnvError, FetchError, LaunchError};
use crate::fetch::{self, FetchOutcome};
use crate::progress::{DownloadProgress, Visibility};
use crate::runner;

/// One-shot sticky completion flag.
///
/// Orders observable side effects (console chrome, cache replacement) behind
/// the runner's completion. Never used to gate the exit code itself; that
/// travels through its own capacity-one channel.
#[derive(Debug)]
struct CompletionSignal {
    tx: watch::Sender<bool>,
}

impl CompletionSignal {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Set the flag. Idempotent; once set it stays set.
    fn set(&self) {
        // send_replace stores the value even when no watcher is subscribed
        // yet (or ever, when the refresh task was skipped).
        self.tx.send_replace(true);
    }

    fn watcher(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            // The sender lives for the whole invocation; a closed channel
            // only means there is nothing left to wait for.
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Ensure a runnable artifact, execute pip, refresh opportunistically, and
/// return pip's exit code.
pub async fn launch(config: &LauncherConfig, args: Vec<OsString>) -> Result<i32, LaunchError> {
    let cache = PyzCache::new(&config.cache_dir);
    let client = Client::new();

    let mut section_output = false;
    let mut freshly_fetched = false;

    if !cache.exists() {
        tracing::debug!(path = %cache.pyz_path().display(), "pip.pyz not cached yet");
        section_output = true;
        console::rule("Download pip");
        bootstrap(&client, config, &cache).await?;
        freshly_fetched = true;
    }

    let python = resolve_interpreter(config, &mut section_output).await?;
    let request = runner::ExecutionRequest {
        python,
        forwarded_args: args,
    };

    if section_output {
        console::rule("pip output");
    }

    let signal = CompletionSignal::new();
    let (exit_tx, exit_rx) = oneshot::channel();
    let pyz = cache.pyz_path();

    let run_pip = async {
        let result = runner::pip(&request, &pyz).await;
        // The only writer: exactly one exit result crosses the channel.
        let _ = exit_tx.send(result);
        signal.set();
    };

    let refresh = async {
        if !freshly_fetched {
            background_refresh(&client, config, &cache, &signal, &request.python).await;
        }
    };

    // Structured scope: nothing past this point runs until both tasks are
    // done, however they finish.
    tokio::join!(run_pip, refresh);

    let code = exit_rx
        .await
        .expect("runner task delivers exactly one exit result")?;
    tracing::debug!(code, "exit code");
    Ok(code)
}

/// Blocking first fetch: with no artifact on disk there is nothing to run,
/// so the user waits for the download and any failure is fatal.
async fn bootstrap(
    client: &Client,
    config: &LauncherConfig,
    cache: &PyzCache,
) -> Result<(), LaunchError> {
    let mut progress = DownloadProgress::new(Visibility::Always);
    match fetch::fetch_pyz(client, &config.pyz_url, None, &mut progress).await? {
        FetchOutcome::Modified { bytes, headers } => {
            cache
                .write(&bytes, &headers)
                .map_err(|source| LaunchError::CacheWrite {
                    path: cache.pyz_path(),
                    source,
                })?;
        }
        FetchOutcome::NotModified => {
            // Unconditional requests cannot legitimately produce a 304.
            return Err(FetchError::UnexpectedStatus {
                url: config.pyz_url.clone(),
                status: StatusCode::NOT_MODIFIED,
            }
            .into());
        }
    }

    // A fresh artifact that cannot even report its version is unusable.
    let python = probe_interpreter(config)?;
    let code = runner::print_pip_version(&python, &cache.pyz_path()).await?;
    if code != 0 {
        return Err(LaunchError::VersionProbe { code });
    }
    Ok(())
}

/// Determine the interpreter pip will execute with: the configured override,
/// the active virtual environment, or a newly created `.venv` next to the
/// project's `pyproject.toml`.
async fn resolve_interpreter(
    config: &LauncherConfig,
    section_output: &mut bool,
) -> Result<PathBuf, LaunchError> {
    if let Some(interpreter) = &config.interpreter {
        return Ok(interpreter.clone());
    }
    if let Some(venv) = environment::active_venv() {
        tracing::debug!(path = %venv.display(), "in virtual environment");
        return Ok(environment::venv_python(&venv));
    }

    *section_output = true;
    console::rule("Create virtual environment");
    let cwd = env::current_dir().map_err(EnvError::CurrentDir)?;
    let root = environment::find_project_root(&cwd)?;
    println!("Creating virtual environment in {}", root.display());
    let base = environment::system_python()?;
    Ok(environment::create_venv(&root, &base).await?)
}

/// Interpreter used for version probes. Falls back to the system interpreter
/// when no environment is active; probes never require a virtualenv.
fn probe_interpreter(config: &LauncherConfig) -> Result<PathBuf, EnvError> {
    if let Some(interpreter) = &config.interpreter {
        return Ok(interpreter.clone());
    }
    if let Some(venv) = environment::active_venv() {
        return Ok(environment::venv_python(&venv));
    }
    environment::system_python()
}

/// Best-effort refresh alongside the running pip.
///
/// Every failure is logged and swallowed; the cache and the user-visible
/// outcome are exactly as if no refresh had been attempted.
async fn background_refresh(
    client: &Client,
    config: &LauncherConfig,
    cache: &PyzCache,
    signal: &CompletionSignal,
    python: &Path,
) {
    let _lock = match cache.try_lock_refresh() {
        Ok(Some(lock)) => lock,
        Ok(None) => {
            tracing::debug!("another invocation is refreshing pip.pyz; skipping");
            return;
        }
        Err(err) => {
            tracing::warn!("could not claim the refresh slot: {err}");
            return;
        }
    };

    let validator = cache.read_validator();
    let mut progress = DownloadProgress::new(Visibility::WhenSet(signal.watcher()));
    let outcome = fetch::fetch_pyz(client, &config.pyz_url, validator.as_ref(), &mut progress).await;

    // Replacement and update chrome wait for pip to finish, so its output is
    // never interleaved with ours and it never races the file it is running.
    signal.wait().await;

    match outcome {
        Ok(FetchOutcome::NotModified) => {
            tracing::debug!("pip.pyz is up to date");
        }
        Ok(FetchOutcome::Modified { bytes, headers }) => {
            console::rule("updating pip");
            if let Err(err) = cache.write(&bytes, &headers) {
                tracing::warn!("failed to store refreshed pip.pyz: {err}");
                return;
            }
            match runner::print_pip_version(python, &cache.pyz_path()).await {
                Ok(0) => {}
                Ok(code) => tracing::warn!(code, "pip --version failed after update"),
                Err(err) => tracing::warn!("pip --version failed after update: {err}"),
            }
        }
        Err(err) => {
            tracing::warn!("background pip.pyz refresh failed: {err}");
        }
    }
}
