//! Atomic file write helper.
//!
//! Uses a temp file + rename pattern. On Windows, rename-over-existing fails,
//! so overwriting falls back to backup-and-restore to avoid data loss.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Replace `path` with `bytes` so no reader ever observes a partial file.
///
/// The payload is written to a uniquely named temp file in the destination
/// directory (same filesystem, so the rename is atomic; the name is unique per
/// process, so concurrent writers cannot collide) and fsynced before the
/// rename. Any failure before the rename leaves the previous contents of
/// `path` untouched.
pub fn atomic_write(path: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    // Persist (rename) - handle Windows where rename fails if target exists.
    if let Err(err) = tmp.persist(path) {
        if path.exists() {
            let backup = path.with_extension("bak");
            let _ = fs::remove_file(&backup);
            fs::rename(path, &backup)?;

            if let Err(persist_err) = err.file.persist(path) {
                let _ = fs::rename(&backup, path);
                return Err(persist_err.error);
            }
            if let Err(e) = fs::remove_file(&backup) {
                tracing::warn!(
                    path = %backup.display(),
                    "Failed to remove .bak after atomic write: {e}"
                );
            }
        } else {
            return Err(err.error);
        }
    }

    Ok(())
}
