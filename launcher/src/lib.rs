//! Fetch-and-execute coordination for a cached `pip.pyz`.
//!
//! # Architecture
//!
//! ```text
//! launch(config, args)
//!   ├─ no cached artifact?  ── blocking fetch ── version probe
//!   ├─ resolve interpreter  (active VIRTUAL_ENV | create .venv at project root)
//!   └─ tokio::join!
//!        ├─ runner:  python pip.pyz <args>  ─→ exit code (oneshot) + CompletionSignal
//!        └─ refresh: conditional GET ── wait(CompletionSignal) ── atomic replace
//! ```
//!
//! The on-disk cache is never observed torn: the artifact is replaced via
//! temp-file-plus-rename, and the validator sidecar is rewritten only after
//! the rename succeeds. A background refresh that fails leaves the cache and
//! the foreground exit code exactly as if it had never been attempted.

pub mod cache;
pub mod config;
pub mod console;
pub mod environment;
pub mod fetch;
pub mod launch;
pub mod progress;
pub mod runner;

mod error;

pub use cache::PyzCache;
pub use config::LauncherConfig;
pub use error::{EnvError, FetchError, LaunchError};
pub use launch::launch;
pub use runner::ExecutionRequest;
