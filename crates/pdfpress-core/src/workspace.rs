//! Scratch directory for per-request artifacts.
//!
//! Every request writes uniquely named files into one shared directory; the
//! sweep reclaims anything older than the age threshold. There is no locking:
//! name uniqueness is the whole coordination story.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use chrono::Local;

use crate::error::PdfPressError;

/// Age past which the sweep reclaims an artifact.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(3600);

/// Tie-breaker for names minted within the same second.
static NAME_SEQ: AtomicU64 = AtomicU64::new(0);

/// Shared scratch directory, guaranteed to exist once constructed.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, PdfPressError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Mint a path that no other request will mint: timestamp for human
    /// readability, process-wide counter against same-second collisions.
    pub fn unique_path(&self, prefix: &str, ext: &str) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let seq = NAME_SEQ.fetch_add(1, Ordering::Relaxed);
        self.root.join(format!("{prefix}_{stamp}_{seq}.{ext}"))
    }

    /// Delete regular files older than `max_age`. Non-recursive, best-effort:
    /// individual failures are logged and skipped, and the caller never sees
    /// an error. Returns the number of files removed.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to scan workspace {}: {}", self.root.display(), e);
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            let Ok(modified) = meta.modified() else { continue };
            let age = now.duration_since(modified).unwrap_or_default();
            if age <= max_age {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!("Reaped stale artifact {}", path.display());
                    removed += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to reap {}: {}", path.display(), e);
                }
            }
        }
        removed
    }
}
