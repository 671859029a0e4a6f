use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

const TEMP_PREFIX: &str = "fnport-";
const STALE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// Hands out fresh, uniquely named, writable directories.
pub trait TempProvisioner: Send + Sync {
    fn create_temp_dir(&self) -> Result<PathBuf>;
}

/// Creates `fnport-*` directories under a root, sweeping leftovers from
/// crashed runs older than a day.
#[derive(Debug, Clone)]
pub struct SystemTempProvisioner {
    root: PathBuf,
}

impl SystemTempProvisioner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TempProvisioner for SystemTempProvisioner {
    fn create_temp_dir(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;
        sweep_stale(&self.root);
        let dir = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir_in(&self.root)
            .with_context(|| format!("failed to create temp dir under {}", self.root.display()))?;
        Ok(dir.keep())
    }
}

/// Process-wide list of directories to delete at teardown.
///
/// Entries are only ever appended during a session; once a path is
/// registered the registry is the only party that deletes it.
#[derive(Debug, Default)]
pub struct CleanupRegistry {
    paths: Mutex<Vec<PathBuf>>,
    keep: bool,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that records paths but leaves them on disk at teardown.
    pub fn keeping() -> Self {
        Self {
            paths: Mutex::new(Vec::new()),
            keep: true,
        }
    }

    pub fn register(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!(path = %path.display(), "registered temporary workspace");
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path);
    }

    #[must_use]
    pub fn registered(&self) -> Vec<PathBuf> {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes every registered path; failures are logged, not returned.
    pub fn teardown(&self) {
        let paths = std::mem::take(&mut *self.paths.lock().unwrap_or_else(PoisonError::into_inner));
        if self.keep {
            for path in &paths {
                debug!(path = %path.display(), "keeping temporary workspace");
            }
            return;
        }
        for path in paths {
            if let Err(err) = remove_dir_all_writable(&path) {
                warn!(path = %path.display(), error = %err, "failed to remove temporary workspace");
            }
        }
    }
}

impl Drop for CleanupRegistry {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Provision a directory and immediately hand it to the registry.
pub(crate) fn provision(
    provisioner: &dyn TempProvisioner,
    registry: &CleanupRegistry,
) -> Result<PathBuf> {
    let path = provisioner.create_temp_dir()?;
    registry.register(&path);
    Ok(path)
}

/// Delete a workspace even when a build tool left read-only files behind.
pub(crate) fn remove_dir_all_writable(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err).with_context(|| format!("failed to stat {}", path.display())),
    };
    if !meta.is_dir() {
        return fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()));
    }
    if let Err(err) = fs::remove_dir_all(path) {
        if err.kind() != io::ErrorKind::PermissionDenied {
            return Err(err).with_context(|| format!("failed to remove {}", path.display()));
        }
        debug!(path = %path.display(), "retrying removal with owner write access");
        grant_owner_access(path);
        fs::remove_dir_all(path).with_context(|| format!("failed to remove {}", path.display()))?;
    }
    Ok(())
}

#[cfg(unix)]
fn grant_owner_access(root: &Path) {
    use std::os::unix::fs::PermissionsExt;
    for entry in WalkDir::new(root).follow_links(false).into_iter().flatten() {
        if !entry.file_type().is_dir() {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            let mut perms = meta.permissions();
            perms.set_mode(perms.mode() | 0o700);
            let _ = fs::set_permissions(entry.path(), perms);
        }
    }
}

#[cfg(not(unix))]
fn grant_owner_access(_root: &Path) {}

/// Workspaces under `root` left behind by runs that never reached teardown.
fn stale_workspaces(root: &Path, max_age: Duration) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(TEMP_PREFIX))
        })
        .filter(|entry| {
            entry
                .metadata()
                .ok()
                .filter(fs::Metadata::is_dir)
                .and_then(|meta| meta.modified().ok())
                .and_then(|modified| modified.elapsed().ok())
                .is_some_and(|age| age >= max_age)
        })
        .map(|entry| entry.path())
        .collect()
}

fn sweep_stale(root: &Path) {
    for path in stale_workspaces(root, STALE_AFTER) {
        match remove_dir_all_writable(&path) {
            Ok(()) => debug!(path = %path.display(), "removed stale workspace"),
            Err(err) => debug!(path = %path.display(), error = %err, "stale workspace kept"),
        }
    }
}
