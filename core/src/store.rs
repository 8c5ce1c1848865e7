//! Script storage
//!
//! The supervisor only needs a handful of filesystem operations on scripts.
//! They sit behind [`ScriptStore`] so the lifecycle code never touches paths
//! directly; [`DirScriptStore`] keeps everything in one flat directory.

use crate::{CoreError, Result};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Filesystem operations on stored scripts.
///
/// Names passed in are expected to be validated already.
pub trait ScriptStore: Send + Sync {
    /// Location of the script on disk
    fn script_path(&self, name: &str) -> PathBuf;

    /// Whether a regular file exists for `name`
    fn exists(&self, name: &str) -> bool;

    /// Set the execute bits on the script
    fn ensure_executable(&self, name: &str) -> Result<()>;

    /// Delete the script file
    fn remove(&self, name: &str) -> Result<()>;

    /// Write (or overwrite) the script file
    fn save(&self, name: &str, content: &[u8]) -> Result<()>;

    /// Names of all stored scripts, sorted
    fn list(&self) -> Result<Vec<String>>;
}

/// [`ScriptStore`] backed by a single directory
#[derive(Debug, Clone)]
pub struct DirScriptStore {
    root: PathBuf,
}

impl DirScriptStore {
    /// Open the store, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            CoreError::InitializationError(format!(
                "Failed to create scripts directory {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }
}

impl ScriptStore for DirScriptStore {
    fn script_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn exists(&self, name: &str) -> bool {
        self.script_path(name).is_file()
    }

    #[cfg(unix)]
    fn ensure_executable(&self, name: &str) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let path = self.script_path(name);
        let mut perms = fs::metadata(&path)?.permissions();
        let mode = perms.mode();
        if mode & 0o111 != 0o111 {
            perms.set_mode(mode | 0o111);
            fs::set_permissions(&path, perms)?;
            debug!("Marked {} executable", path.display());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn ensure_executable(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let path = self.script_path(name);
        fs::remove_file(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::NotFound(name.to_string())
            } else {
                CoreError::IoError(e)
            }
        })?;
        debug!("Removed script {}", path.display());
        Ok(())
    }

    fn save(&self, name: &str, content: &[u8]) -> Result<()> {
        fs::write(self.script_path(name), content)?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
