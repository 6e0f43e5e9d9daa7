use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Advisory lock on a config file, taken on `<file>.lock` next to it.
///
/// Every read-validate-write cycle runs while holding this guard. The OS lock
/// is released when the guard is dropped or the process dies, so a leftover
/// lock file never blocks later callers. The file itself stays in place.
#[derive(Debug)]
pub struct ConfLock {
    path: PathBuf,
    _file: File,
}

#[derive(Debug, Error)]
pub enum LockError {
    /// Another holder kept the lock past the timeout.
    #[error("timed out waiting for lock {}", .0.display())]
    Timeout(PathBuf),
    #[error("failed to open lock {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfLock {
    pub fn lock_path(conf_path: &Path) -> PathBuf {
        let mut name = conf_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        conf_path.with_file_name(name)
    }

    /// Take an exclusive lock on the lock file, retrying until `timeout` elapses.
    pub fn acquire(conf_path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let path = Self::lock_path(conf_path);
        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
        {
            Ok(file) => file,
            Err(source) => return Err(LockError::Io { path, source }),
        };
        let deadline = Instant::now() + timeout;
        let mut announced = false;

        loop {
            match file.try_lock() {
                Ok(()) => {
                    debug!(lock = %path.display(), "acquired config lock");
                    return Ok(Self { path, _file: file });
                }
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(LockError::Timeout(path));
                    }
                    if !announced {
                        debug!(lock = %path.display(), "waiting for config lock");
                        announced = true;
                    }
                    thread::sleep(RETRY_INTERVAL);
                }
                Err(TryLockError::Error(source)) => return Err(LockError::Io { path, source }),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
