//! Exclusive lock on the state dir: one process owns `cache.json` at a time.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Held for the lifetime of a download session (or a direct cache edit).
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct StateLock {
    _file: File,
    path: PathBuf,
}

impl StateLock {
    /// Default lock file: `~/.local/state/tunefetch/session.lock`.
    pub fn default_path() -> Result<PathBuf> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("tunefetch")?;
        Ok(xdg_dirs.get_state_home().join("session.lock"))
    }

    pub fn acquire_default() -> Result<Self> {
        Self::acquire(Self::default_path()?)
    }

    /// Takes the lock without waiting. Fails if another process holds it.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("create state dir: {}", dir.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("open lock file: {}", path.display()))?;
        try_lock_exclusive(&file, &path)?;
        tracing::debug!(path = %path.display(), "state lock acquired");
        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File, path: &Path) -> Result<()> {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    // SAFETY: fd is owned by `file`, which outlives the call.
    let r = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
    if r == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.kind() == std::io::ErrorKind::WouldBlock {
        anyhow::bail!(
            "another tunefetch session is running (lock held on {})",
            path.display()
        );
    }
    Err(err).with_context(|| format!("lock {}", path.display()))
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File, _path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn second_holder_is_refused_until_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("session.lock");

        let first = StateLock::acquire(&path).unwrap();
        assert_eq!(first.path(), path);
        let err = StateLock::acquire(&path).unwrap_err();
        assert!(err.to_string().contains("another tunefetch session"), "{err:#}");

        drop(first);
        StateLock::acquire(&path).unwrap();
    }
}
