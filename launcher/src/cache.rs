//! On-disk cache for the `pip.pyz` artifact and its HTTP validator metadata.
//!
//! Invariants:
//! - The artifact file is either absent or a complete prior download;
//!   replacement goes through [`pipz_utils::atomic_write`].
//! - The validator sidecar is rewritten only after a successful artifact
//!   rename. A reader that finds the artifact without a usable sidecar treats
//!   the validator as absent, never as mismatched.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use pipz_utils::atomic_write;

/// Artifact file name inside the cache directory.
pub const PYZ_FILE: &str = "pip.pyz";

/// Validator sidecar: lower-cased response header names mapped to values.
pub const HEADERS_FILE: &str = "response_headers.json";

/// Well-known marker claimed by the invocation running a background refresh.
const REFRESH_MARKER: &str = "pip.pyz.refreshing";

/// A refresh marker older than this was left behind by a killed invocation
/// and is broken rather than honored.
const REFRESH_MARKER_STALE_AFTER: Duration = Duration::from_secs(15 * 60);

/// Lower-cased response headers, as persisted in the sidecar.
pub type ResponseHeaders = BTreeMap<String, String>;

/// HTTP cache validators extracted from the persisted response headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validator {
    /// Project the validator pair out of a header map. `None` when neither
    /// header is present.
    #[must_use]
    pub fn from_headers(headers: &ResponseHeaders) -> Option<Self> {
        let etag = headers.get("etag").cloned();
        let last_modified = headers.get("last-modified").cloned();
        if etag.is_none() && last_modified.is_none() {
            return None;
        }
        Some(Self {
            etag,
            last_modified,
        })
    }
}

/// Cache store rooted at a single directory.
#[derive(Debug, Clone)]
pub struct PyzCache {
    dir: PathBuf,
}

impl PyzCache {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn pyz_path(&self) -> PathBuf {
        self.dir.join(PYZ_FILE)
    }

    fn headers_path(&self) -> PathBuf {
        self.dir.join(HEADERS_FILE)
    }

    fn marker_path(&self) -> PathBuf {
        self.dir.join(REFRESH_MARKER)
    }

    /// Whether an artifact is present. Does not validate its contents.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.pyz_path().is_file()
    }

    /// Read the persisted validator.
    ///
    /// A missing file, malformed JSON, or a sidecar without validator fields
    /// all degrade to `None`; stale-cache detection then falls back to an
    /// unconditional fetch instead of erroring.
    #[must_use]
    pub fn read_validator(&self) -> Option<Validator> {
        let path = self.headers_path();
        let raw = fs::read_to_string(&path).ok()?;
        let headers: ResponseHeaders = match serde_json::from_str(&raw) {
            Ok(headers) => headers,
            Err(err) => {
                tracing::debug!(
                    path = %path.display(),
                    "ignoring malformed validator sidecar: {err}"
                );
                return None;
            }
        };
        Validator::from_headers(&headers)
    }

    /// Durably replace the artifact, then its sidecar.
    ///
    /// The payload is staged in a uniquely named temp file next to the final
    /// path and renamed into place. Any failure leaves the previous artifact
    /// valid and usable. The sidecar is written only once the rename has
    /// succeeded, so validator metadata never runs ahead of the bytes it
    /// describes. The cache directory is created lazily here.
    pub fn write(&self, bytes: &[u8], headers: &ResponseHeaders) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        atomic_write(self.pyz_path(), bytes)?;
        let sidecar = serde_json::to_vec(headers).map_err(io::Error::other)?;
        atomic_write(self.headers_path(), &sidecar)
    }

    /// Claim the background-refresh slot for this cache directory.
    ///
    /// At most one launcher invocation refreshes at a time: the slot is an
    /// exclusive-create on a well-known marker name, shared across processes.
    /// A loser skips its refresh and runs with whatever artifact is present.
    /// A marker past its staleness bound is reclaimed.
    pub fn try_lock_refresh(&self) -> io::Result<Option<RefreshLock>> {
        fs::create_dir_all(&self.dir)?;
        let path = self.marker_path();
        match exclusive_create(&path) {
            Ok(()) => Ok(Some(RefreshLock { path })),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                if !marker_is_stale(&path) {
                    return Ok(None);
                }
                tracing::debug!(path = %path.display(), "breaking stale refresh marker");
                let _ = fs::remove_file(&path);
                match exclusive_create(&path) {
                    Ok(()) => Ok(Some(RefreshLock { path })),
                    Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(None),
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }
}

fn exclusive_create(path: &Path) -> io::Result<()> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map(drop)
}

fn marker_is_stale(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .is_ok_and(|age| age > REFRESH_MARKER_STALE_AFTER)
}

/// RAII guard for the refresh marker; releases the slot on drop.
#[derive(Debug)]
pub struct RefreshLock {
    path: PathBuf,
}

impl Drop for RefreshLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
