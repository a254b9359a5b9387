#![forbid(unsafe_code)]

use super::supervisor::{self, Supervisor};
use crate::resolver::{self, tool};
use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::{Pid, getpgid, getpgrp, geteuid};
use procfs::process::Process;
use std::time::Duration;
use tracing::trace;

const QUERY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// `SIGTERM`
    Graceful,
    /// `SIGKILL`
    Force,
}

impl From<StopSignal> for Signal {
    fn from(signal: StopSignal) -> Self {
        match signal {
            StopSignal::Graceful => Signal::SIGTERM,
            StopSignal::Force => Signal::SIGKILL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// No such process or group.
    Gone,
    PermissionDenied,
    Other(String),
}

impl From<Errno> for SignalError {
    fn from(errno: Errno) -> Self {
        match errno {
            Errno::ESRCH => Self::Gone,
            Errno::EPERM => Self::PermissionDenied,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Everything the termination engine needs from the operating system.
///
/// Zombies count as gone everywhere: they hold no sockets and will never
/// react to a signal.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    async fn is_alive(&self, pid: u32) -> bool;

    async fn process_group(&self, pid: u32) -> Option<u32>;

    /// Process group of the calling process.
    fn own_group(&self) -> Option<u32>;

    async fn group_size(&self, pgid: u32) -> Option<usize>;

    async fn group_alive(&self, pgid: u32) -> bool;

    async fn signal(&self, pid: u32, signal: StopSignal) -> Result<(), SignalError>;

    async fn signal_group(&self, pgid: u32, signal: StopSignal) -> Result<(), SignalError>;

    async fn owner_uid(&self, pid: u32) -> Option<u32>;

    /// Effective uid of the calling process.
    fn caller_uid(&self) -> u32;

    fn user_name(&self, uid: u32) -> Option<String> {
        resolver::user_name(uid)
    }

    /// Single-letter scheduler state (`R`, `S`, `D`, `Z`, ...).
    async fn scheduler_state(&self, pid: u32) -> Option<char>;

    async fn supervisor(&self, pid: u32) -> Option<Supervisor>;
}

/// procfs and nix, with `ps` where procfs cannot answer.
#[derive(Debug, Default)]
pub struct SystemProcessControl;

fn raw_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|pid| *pid > 0).map(Pid::from_raw)
}

async fn ps(args: &[&str]) -> Option<String> {
    tool::run("ps", args, QUERY_TIMEOUT).await.into_text()
}

impl SystemProcessControl {
    /// Live (non-zombie) members of a process group.
    fn group_members(pgid: i32) -> Option<usize> {
        let processes = procfs::process::all_processes().ok()?;
        let count = processes
            .flatten()
            .filter_map(|process| process.stat().ok())
            .filter(|stat| stat.pgrp == pgid && stat.state != 'Z')
            .count();
        Some(count)
    }

    async fn ps_group_members(pgid: u32) -> Option<usize> {
        let pgid = pgid.to_string();
        let output = ps(&["-o", "pid=", "-g", pgid.as_str()]).await?;
        Some(output.lines().filter(|line| !line.trim().is_empty()).count())
    }
}

#[async_trait]
impl ProcessControl for SystemProcessControl {
    async fn is_alive(&self, pid: u32) -> bool {
        let Some(target) = raw_pid(pid) else {
            return false;
        };
        match kill(target, None) {
            Ok(()) | Err(Errno::EPERM) => {}
            Err(_) => return false,
        }
        self.scheduler_state(pid).await != Some('Z')
    }

    async fn process_group(&self, pid: u32) -> Option<u32> {
        let pgid = getpgid(Some(raw_pid(pid)?)).ok()?;
        u32::try_from(pgid.as_raw()).ok()
    }

    fn own_group(&self) -> Option<u32> {
        u32::try_from(getpgrp().as_raw()).ok()
    }

    async fn group_size(&self, pgid: u32) -> Option<usize> {
        let raw = i32::try_from(pgid).ok()?;
        match Self::group_members(raw) {
            Some(count) => Some(count),
            None => Self::ps_group_members(pgid).await,
        }
    }

    async fn group_alive(&self, pgid: u32) -> bool {
        let Some(raw) = i32::try_from(pgid).ok().filter(|pgid| *pgid > 0) else {
            return false;
        };
        match Self::group_members(raw) {
            Some(count) => count > 0,
            None => killpg(Pid::from_raw(raw), None).is_ok(),
        }
    }

    async fn signal(&self, pid: u32, signal: StopSignal) -> Result<(), SignalError> {
        let target = raw_pid(pid).ok_or(SignalError::Gone)?;
        trace!(pid, ?signal, "signalling process");
        kill(target, Signal::from(signal)).map_err(SignalError::from)
    }

    async fn signal_group(&self, pgid: u32, signal: StopSignal) -> Result<(), SignalError> {
        let target = raw_pid(pgid).ok_or(SignalError::Gone)?;
        trace!(pgid, ?signal, "signalling process group");
        killpg(target, Signal::from(signal)).map_err(SignalError::from)
    }

    async fn owner_uid(&self, pid: u32) -> Option<u32> {
        if let Some(uid) = Process::new(raw_pid(pid)?.as_raw())
            .ok()
            .and_then(|process| process.uid().ok())
        {
            return Some(uid);
        }
        let pid = pid.to_string();
        ps(&["-p", pid.as_str(), "-o", "uid="]).await?.parse().ok()
    }

    fn caller_uid(&self) -> u32 {
        geteuid().as_raw()
    }

    async fn scheduler_state(&self, pid: u32) -> Option<char> {
        if let Some(state) = Process::new(raw_pid(pid)?.as_raw())
            .ok()
            .and_then(|process| process.stat().ok())
            .map(|stat| stat.state)
        {
            return Some(state);
        }
        let pid = pid.to_string();
        ps(&["-p", pid.as_str(), "-o", "state="]).await?.chars().next()
    }

    async fn supervisor(&self, pid: u32) -> Option<Supervisor> {
        supervisor::detect(pid).await
    }
}
