//! pipz binary entry point.
//!
//! Arguments are forwarded to pip verbatim; there are no launcher flags. The
//! process exits with pip's own code, or with a fixed non-zero code when the
//! launcher itself cannot produce something to run.

use std::env;
use std::ffi::OsString;

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use pipz_launcher::{LauncherConfig, console, launch};

/// Exit code for launcher-level failures (no artifact obtainable, no
/// interpreter resolvable). pip's own exit code is propagated verbatim.
const FAILURE_EXIT_CODE: i32 = 1;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_env("PIPZ_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // Diagnostics go to stderr, plain, so pip's own output stays clean.
    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false).with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let args: Vec<OsString> = env::args_os().skip(1).collect();
    tracing::debug!(?args, "forwarding arguments to pip");

    let code = match run(args).await {
        Ok(code) => code,
        Err(err) => {
            console::failure(&format!("{err:#}"));
            FAILURE_EXIT_CODE
        }
    };
    std::process::exit(code);
}

async fn run(args: Vec<OsString>) -> Result<i32> {
    let config = LauncherConfig::from_env()?;
    Ok(launch(&config, args).await?)
}
