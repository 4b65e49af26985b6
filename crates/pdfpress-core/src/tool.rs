//! External compression tool invocation.
//!
//! The pipeline talks to Ghostscript through the [`ToolRunner`] trait so
//! tests can substitute a scripted fake instead of spawning real processes.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::PdfPressError;

/// Captured result of one tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Process exited with a zero status.
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// The deadline elapsed and the process was killed.
    pub timed_out: bool,
}

/// Capability to run the external compression tool with a bounded deadline.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Tool name for logs and error messages.
    fn name(&self) -> &str;

    /// Cheap availability probe, checked before any per-request file I/O.
    fn is_available(&self) -> bool;

    /// Run the tool with `args`, waiting at most `deadline`.
    async fn run(&self, args: &[String], deadline: Duration) -> Result<ToolOutput, PdfPressError>;
}

/// Ghostscript located via the process search path or an explicit binary.
pub struct Ghostscript {
    binary: PathBuf,
}

impl Ghostscript {
    pub const DEFAULT_BINARY: &'static str = "gs";

    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Resolve the binary to a concrete path. A bare name is searched on
    /// `PATH`; anything with a directory component is used as-is.
    fn resolve(&self) -> Option<PathBuf> {
        if self.binary.components().count() > 1 {
            return self.binary.is_file().then(|| self.binary.clone());
        }
        let path_var = env::var_os("PATH")?;
        search_dirs(env::split_paths(&path_var), &self.binary)
    }

    fn unavailable(&self) -> PdfPressError {
        PdfPressError::ToolUnavailable(format!(
            "'{}' was not found on the search path. Install Ghostscript \
             (e.g. `apt-get install ghostscript`) or point --gs-binary at it",
            self.binary.display()
        ))
    }
}

impl Default for Ghostscript {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BINARY)
    }
}

/// Find `name` as a regular file in the given directories, first match wins.
fn search_dirs(dirs: impl Iterator<Item = PathBuf>, name: &Path) -> Option<PathBuf> {
    dirs.map(|dir| dir.join(name)).find(|cand| cand.is_file())
}

#[async_trait]
impl ToolRunner for Ghostscript {
    fn name(&self) -> &str {
        "ghostscript"
    }

    fn is_available(&self) -> bool {
        self.resolve().is_some()
    }

    async fn run(&self, args: &[String], deadline: Duration) -> Result<ToolOutput, PdfPressError> {
        let binary = self.resolve().ok_or_else(|| self.unavailable())?;

        let mut command = Command::new(&binary);
        command.args(args).kill_on_drop(true);

        match timeout(deadline, command.output()).await {
            Ok(Ok(output)) => Ok(ToolOutput {
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                timed_out: false,
            }),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => Err(self.unavailable()),
            Ok(Err(e)) => Err(PdfPressError::Io(e)),
            // Dropping the output future kills the child (kill_on_drop).
            Err(_) => Ok(ToolOutput {
                success: false,
                stdout: String::new(),
                stderr: format!("{} timed out after {:?}", self.name(), deadline),
                timed_out: true,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn search_finds_first_match() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        File::create(dir_b.path().join("gs")).unwrap();

        let dirs = vec![dir_a.path().to_path_buf(), dir_b.path().to_path_buf()];
        let found = search_dirs(dirs.into_iter(), Path::new("gs")).unwrap();
        assert_eq!(found, dir_b.path().join("gs"));
    }

    #[test]
    fn search_misses_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = vec![dir.path().to_path_buf()];
        assert!(search_dirs(dirs.into_iter(), Path::new("gs")).is_none());
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Ghostscript::new(dir.path().join("gs"));
        assert!(!missing.is_available());

        File::create(dir.path().join("gs")).unwrap();
        let present = Ghostscript::new(dir.path().join("gs"));
        assert!(present.is_available());
    }
}
