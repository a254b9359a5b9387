#![forbid(unsafe_code)]

//! Process detail lookup.
//!
//! Every field has its own ordered list of strategies (a `ps` format, a
//! dedicated tool, then procfs). The first one that yields something wins.
//! Failures never surface: a field nobody could read stays empty.

mod start_time;
pub(crate) mod tool;

pub use start_time::parse_start_time;

use crate::domain::ProcessDetails;
use async_trait::async_trait;
use nix::unistd::{Uid, User};
use procfs::WithCurrentSystemInfo;
use procfs::process::Process;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing::trace;

#[async_trait]
pub trait DetailResolver: Send + Sync {
    /// Describe `pid` as well as the system allows. Never fails.
    async fn resolve(&self, pid: u32) -> ProcessDetails;
}

#[derive(Debug, Clone)]
pub struct SystemResolver {
    timeout: Duration,
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl SystemResolver {
    /// `timeout` bounds each individual query, not the whole lookup.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn ps_field(&self, pid: &str, format: &str) -> Option<String> {
        tool::run("ps", &["-p", pid, "-o", format], self.timeout)
            .await
            .into_text()
    }

    async fn command_line(&self, pid: u32) -> Option<String> {
        let pid_arg = pid.to_string();
        // BSD spelling first, then GNU.
        for format in ["command=", "cmd="] {
            if let Some(line) = self.ps_field(&pid_arg, format).await {
                return Some(line);
            }
        }
        procfs_command_line(pid)
    }

    async fn owner(&self, pid: u32) -> Option<String> {
        let pid_arg = pid.to_string();
        for format in ["user=", "uid="] {
            if let Some(owner) = self.ps_field(&pid_arg, format).await {
                return Some(owner);
            }
        }
        let uid = Process::new(pid as i32).ok()?.uid().ok()?;
        Some(user_name(uid).unwrap_or_else(|| uid.to_string()))
    }

    async fn start_time(&self, pid: u32) -> Option<SystemTime> {
        let pid_arg = pid.to_string();
        // lstart is the BSD and procps long format; start is the short GNU one
        // and often only carries a time of day, which no layout accepts.
        for format in ["lstart=", "start="] {
            let Some(text) = self.ps_field(&pid_arg, format).await else {
                continue;
            };
            if let Some(start) = parse_start_time(&text) {
                return Some(start);
            }
            trace!(pid, %text, "unparsable start time");
        }
        procfs_start_time(pid)
    }

    async fn working_directory(&self, pid: u32) -> Option<PathBuf> {
        let pid_arg = pid.to_string();

        let lsof = tool::run(
            "lsof",
            &["-p", pid_arg.as_str(), "-a", "-d", "cwd", "-Fn"],
            self.timeout,
        )
        .await;
        if let Some(dir) = lsof.into_text().as_deref().and_then(parse_lsof_cwd) {
            return Some(dir);
        }

        let pwdx = tool::run("pwdx", &[pid_arg.as_str()], self.timeout).await;
        if let Some(dir) = pwdx.into_text().as_deref().and_then(parse_pwdx) {
            return Some(dir);
        }

        Process::new(pid as i32).ok()?.cwd().ok()
    }
}

#[async_trait]
impl DetailResolver for SystemResolver {
    async fn resolve(&self, pid: u32) -> ProcessDetails {
        if pid == 0 || i32::try_from(pid).is_err() {
            return ProcessDetails::default();
        }

        let (command_line, owner, start_time, working_directory) = tokio::join!(
            self.command_line(pid),
            self.owner(pid),
            self.start_time(pid),
            self.working_directory(pid),
        );

        let details = ProcessDetails {
            command_line,
            owner,
            start_time,
            working_directory,
        };
        trace!(pid, ?details, "resolved process details");
        details
    }
}

/// Name of the user with `uid`, if the user database knows it.
pub fn user_name(uid: u32) -> Option<String> {
    User::from_uid(Uid::from_raw(uid))
        .ok()
        .flatten()
        .map(|user| user.name)
}

/// Short process name from the kernel (`comm`).
pub fn process_name(pid: u32) -> Option<String> {
    let stat = Process::new(pid as i32).ok()?.stat().ok()?;
    Some(stat.comm)
}

fn procfs_command_line(pid: u32) -> Option<String> {
    let args = Process::new(pid as i32).ok()?.cmdline().ok()?;
    let line = args.join(" ");
    (!line.trim().is_empty()).then_some(line)
}

fn procfs_start_time(pid: u32) -> Option<SystemTime> {
    let stat = Process::new(pid as i32).ok()?.stat().ok()?;
    stat.starttime().get().ok().map(SystemTime::from)
}

/// `lsof -Fn` prints one field per line; the name field starts with `n`.
fn parse_lsof_cwd(output: &str) -> Option<PathBuf> {
    output
        .lines()
        .find_map(|line| line.strip_prefix('n'))
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
}

/// `pwdx` prints `PID: /path`.
fn parse_pwdx(output: &str) -> Option<PathBuf> {
    let (_, dir) = output.split_once(':')?;
    let dir = dir.trim();
    (dir.starts_with('/')).then(|| PathBuf::from(dir))
}
