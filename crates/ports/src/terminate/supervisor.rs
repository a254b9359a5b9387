#![forbid(unsafe_code)]

//! Detection of service managers that restart what was just stopped.

use procfs::process::Process;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Supervisor {
    pub manager: String,
    /// Command that stops the service for good.
    pub stop_hint: String,
}

/// The innermost systemd service the cgroup paths of a process place it in.
///
/// The per-user manager (`user@UID.service`) and login sessions are not
/// services in their own right and yield nothing.
pub fn systemd_unit<'a>(paths: impl IntoIterator<Item = &'a str>) -> Option<Supervisor> {
    paths.into_iter().find_map(|path| {
        let mut components = path.split('/').filter(|c| !c.is_empty());
        let unit = components.clone().rev().find(|c| c.ends_with(".service"))?;
        if unit.starts_with("user@") {
            return None;
        }
        let user_manager = components.any(|c| c.starts_with("user@"));
        let stop_hint = if user_manager {
            format!("systemctl --user stop {unit}")
        } else {
            format!("systemctl stop {unit}")
        };
        Some(Supervisor {
            manager: "systemd".into(),
            stop_hint,
        })
    })
}

fn supervisord_parent(pid: i32) -> Option<Supervisor> {
    let ppid = Process::new(pid).ok()?.stat().ok()?.ppid;
    let parent = Process::new(ppid).ok()?.stat().ok()?;
    (parent.comm == "supervisord").then(|| Supervisor {
        manager: "supervisor".into(),
        stop_hint: "supervisorctl stop <process-name>".into(),
    })
}

/// Look up who manages `pid`. Advisory only; never used to decide whether
/// a process may be stopped.
pub async fn detect(pid: u32) -> Option<Supervisor> {
    let pid = i32::try_from(pid).ok().filter(|pid| *pid > 0)?;
    let cgroups = Process::new(pid)
        .and_then(|process| process.cgroups())
        .map(|cgroups| cgroups.0)
        .unwrap_or_default();

    let found = systemd_unit(cgroups.iter().map(|cgroup| cgroup.pathname.as_str()))
        .or_else(|| supervisord_parent(pid));
    if let Some(supervisor) = &found {
        debug!(pid, manager = %supervisor.manager, "process is supervised");
    }
    found
}
