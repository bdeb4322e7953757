//! One assistant per machine: a lock file holding the owner's PID.

use helpme_core::Error;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn default_lock_path() -> PathBuf {
    std::env::temp_dir().join("helpme.lock")
}

/// Held for the lifetime of a session; removes the lock file on drop.
#[derive(Debug)]
pub struct SessionGuard {
    path: PathBuf,
}

fn pid_is_alive(pid: u32) -> bool {
    if cfg!(target_os = "linux") {
        Path::new("/proc").join(pid.to_string()).exists()
    } else {
        // No cheap portable probe; assume the owner is still around.
        true
    }
}

fn lock_is_stale(path: &Path) -> bool {
    match std::fs::read_to_string(path) {
        Ok(s) => match s.trim().parse::<u32>() {
            Ok(pid) => pid != std::process::id() && !pid_is_alive(pid),
            Err(_) => true,
        },
        Err(_) => false,
    }
}

impl SessionGuard {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Io(format!("failed to create lock directory {}: {e}", parent.display()))
            })?;
        }

        for attempt in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = file.write_all(std::process::id().to_string().as_bytes());
                    tracing::debug!(path = %path.display(), "session lock acquired");
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if attempt == 0 && lock_is_stale(&path) {
                        tracing::warn!(path = %path.display(), "evicting stale session lock");
                        let _ = std::fs::remove_file(&path);
                        continue;
                    }
                    break;
                }
                Err(e) => {
                    return Err(Error::Io(format!(
                        "failed to create session lock {}: {e}",
                        path.display()
                    )));
                }
            }
        }
        Err(Error::AccessDenied(format!(
            "another helpme session holds {}",
            path.display()
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_drop() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("nested").join("helpme.lock");
        let g = SessionGuard::acquire(&lock).unwrap();
        assert_eq!(
            std::fs::read_to_string(&lock).unwrap(),
            std::process::id().to_string()
        );
        assert!(matches!(
            SessionGuard::acquire(&lock),
            Err(Error::AccessDenied(_))
        ));
        drop(g);
        assert!(!lock.exists());
        let _again = SessionGuard::acquire(&lock).unwrap();
    }

    #[test]
    fn unreadable_pid_is_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("helpme.lock");
        std::fs::write(&lock, "not-a-pid").unwrap();
        let g = SessionGuard::acquire(&lock).unwrap();
        assert_eq!(g.path(), lock.as_path());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn dead_owner_is_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("helpme.lock");
        // Above the default pid_max, so never a live process.
        std::fs::write(&lock, "4194305").unwrap();
        assert!(SessionGuard::acquire(&lock).is_ok());
    }
}
