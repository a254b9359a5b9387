#![forbid(unsafe_code)]

use anyhow::{Context, bail};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCK_FILE: &str = ".lock";

/// `$XDG_CONFIG_HOME/zap`, falling back to `~/.config/zap`.
pub fn user_config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .map(|dir| dir.join("zap"))
}

/// Exclusive lock that keeps two runs from signalling the same processes.
///
/// Released when dropped. The kernel also releases it if the process dies,
/// so a leftover lock file is never stale.
#[derive(Debug)]
pub struct InstanceLock {
    _file: Flock<File>,
}

impl InstanceLock {
    pub fn acquire(dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create lock directory {}", dir.display()))?;
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("failed to open lock file {}", path.display()))?;

        let mut file = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(file) => file,
            Err((_, Errno::EWOULDBLOCK)) => {
                let holder = fs::read_to_string(&path).unwrap_or_default();
                match holder.trim() {
                    "" => bail!("another zap instance is running"),
                    pid => bail!("another zap instance is running (PID {pid})"),
                }
            }
            Err((_, errno)) => {
                return Err(errno).with_context(|| format!("failed to lock {}", path.display()));
            }
        };

        file.set_len(0)?;
        file.rewind()?;
        writeln!(file, "{}", std::process::id())?;
        debug!(path = %path.display(), "instance lock acquired");
        Ok(Self { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_holder_is_refused_until_release() {
        let dir = tempdir().unwrap();
        let first = InstanceLock::acquire(dir.path()).unwrap();

        let err = InstanceLock::acquire(dir.path()).unwrap_err().to_string();
        assert_eq!(
            err,
            format!("another zap instance is running (PID {})", std::process::id())
        );

        drop(first);
        assert!(InstanceLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn missing_directory_is_created() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("zap");
        let _lock = InstanceLock::acquire(&nested).unwrap();
        let pid = fs::read_to_string(nested.join(LOCK_FILE)).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());
    }
}
