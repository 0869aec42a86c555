/// Workspace Manager - per-request scratch directories
///
/// Every execution gets its own directory under the scratch root, named by a
/// fresh v4 UUID. The directory holds exactly the source file and the input
/// file, and is removed when the `Workspace` is released or dropped, whichever
/// comes first. Removal failures are logged and swallowed.
///
/// No state is shared between workspaces, so concurrent requests need no locking.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Name of the stdin file inside every workspace
pub const INPUT_FILE: &str = "input.txt";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace {path}: {source}")]
    Creation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh directory `<root>/<uuid>`, creating the root as needed
    pub fn acquire(&self) -> Result<Workspace, WorkspaceError> {
        self.acquire_with_id(Uuid::new_v4())
    }

    /// The directory itself must not exist yet, so ownership is exclusive
    fn acquire_with_id(&self, id: Uuid) -> Result<Workspace, WorkspaceError> {
        let path = self.root.join(id.to_string());

        fs::create_dir_all(&self.root)
            .and_then(|()| fs::create_dir(&path))
            .map_err(|source| WorkspaceError::Creation {
                path: path.clone(),
                source,
            })?;

        debug!(run_id = %id, path = %path.display(), "Workspace acquired");
        Ok(Workspace {
            id,
            path,
            released: false,
        })
    }
}

/// Exclusively owned scratch directory; removed on release or drop
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    path: PathBuf,
    released: bool,
}

impl Workspace {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_source(&self, filename: &str, content: &str) -> Result<PathBuf, WorkspaceError> {
        self.write_file(filename, content)
    }

    pub fn write_input(&self, content: &str) -> Result<PathBuf, WorkspaceError> {
        self.write_file(INPUT_FILE, content)
    }

    fn write_file(&self, filename: &str, content: &str) -> Result<PathBuf, WorkspaceError> {
        let target = self.path.join(filename);

        // Only bare filenames may land in the workspace
        if Path::new(filename).file_name().and_then(|n| n.to_str()) != Some(filename) {
            return Err(WorkspaceError::Write {
                path: target,
                source: io::Error::new(io::ErrorKind::InvalidInput, "not a bare filename"),
            });
        }

        fs::write(&target, content).map_err(|source| WorkspaceError::Write {
            path: target.clone(),
            source,
        })?;
        Ok(target)
    }

    /// Remove the directory now instead of waiting for drop
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(run_id = %self.id, "Workspace removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                run_id = %self.id,
                path = %self.path.display(),
                error = %e,
                "Failed to remove workspace; leaving stale directory"
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.remove();
    }
}
