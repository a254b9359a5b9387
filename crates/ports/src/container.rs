#![forbid(unsafe_code)]

//! Container hints for a process, shown next to it as context.

use procfs::process::{Namespace, Process};
use std::ffi::OsStr;
use std::fmt;

const RUNTIMES: &[&str] = &["docker", "lxc", "kubepods", "containerd", "crio"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Containment {
    /// Container runtime named in the process's cgroup path.
    pub runtime: Option<&'static str>,
    /// The process sees a different mount namespace than PID 1.
    pub separate_mount_namespace: bool,
}

impl Containment {
    pub fn is_contained(&self) -> bool {
        self.runtime.is_some() || self.separate_mount_namespace
    }
}

impl fmt::Display for Containment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.runtime, self.separate_mount_namespace) {
            (Some(runtime), _) => write!(f, "in {runtime} container"),
            (None, true) => f.write_str("in separate mount namespace"),
            (None, false) => f.write_str("on host"),
        }
    }
}

/// Runtime named in any of a process's cgroup paths.
pub fn runtime_from_cgroups<'a>(paths: impl IntoIterator<Item = &'a str>) -> Option<&'static str> {
    paths.into_iter().find_map(|path| {
        RUNTIMES
            .iter()
            .copied()
            .find(|runtime| path.contains(runtime))
    })
}

fn mount_namespace(process: &Process) -> Option<Namespace> {
    process
        .namespaces()
        .ok()?
        .0
        .remove(OsStr::new("mnt"))
}

/// Best effort; anything unreadable reads as "on host".
pub fn inspect(pid: u32) -> Containment {
    let Some(process) = i32::try_from(pid)
        .ok()
        .filter(|pid| *pid > 0)
        .and_then(|pid| Process::new(pid).ok())
    else {
        return Containment::default();
    };
    let runtime = process.cgroups().ok().and_then(|cgroups| {
        runtime_from_cgroups(cgroups.0.iter().map(|cgroup| cgroup.pathname.as_str()))
    });
    let init = Process::new(1).ok();
    let separate_mount_namespace = match (
        mount_namespace(&process),
        init.as_ref().and_then(mount_namespace),
    ) {
        (Some(own), Some(init)) => own != init,
        _ => false,
    };
    Containment {
        runtime,
        separate_mount_namespace,
    }
}
