//! Launcher configuration.
//!
//! The coordinator never reads ambient globals: the cache location and
//! download URL are injected here, so the whole pipeline can run against a
//! temporary directory and a mock server in tests.

use std::env;
use std::path::PathBuf;

use thiserror::Error;
use url::Url;

/// Well-known download location of the single-file pip distribution.
pub const DEFAULT_PYZ_URL: &str = "https://bootstrap.pypa.io/pip/pip.pyz";

/// Subdirectory of the user cache base that pipz owns.
const CACHE_SUBDIR: &str = "pipz";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no user cache directory available")]
    NoCacheDir,

    #[error("invalid PIPZ_URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// Directory holding `pip.pyz` and its validator sidecar.
    pub cache_dir: PathBuf,

    /// URL serving the artifact.
    pub pyz_url: Url,

    /// Pre-resolved virtual-environment interpreter. When set, environment
    /// resolution is skipped and this interpreter is used for both execution
    /// and version probes.
    pub interpreter: Option<PathBuf>,
}

impl LauncherConfig {
    /// Default configuration, honoring the `PIPZ_CACHE_DIR` and `PIPZ_URL`
    /// environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let cache_dir = match env::var_os("PIPZ_CACHE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::cache_dir()
                .ok_or(ConfigError::NoCacheDir)?
                .join(CACHE_SUBDIR),
        };

        let pyz_url = match env::var("PIPZ_URL") {
            Ok(raw) => Url::parse(&raw)?,
            Err(_) => Url::parse(DEFAULT_PYZ_URL).expect("default URL is valid"),
        };

        Ok(Self {
            cache_dir,
            pyz_url,
            interpreter: None,
        })
    }
}
