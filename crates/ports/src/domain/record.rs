#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Best-effort description of a live process.
///
/// Every field is optional: a probe that fails or times out leaves its field
/// empty instead of failing the whole lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessDetails {
    pub command_line: Option<String>,
    pub owner: Option<String>,
    /// `None` means unknown. It is never substituted with the epoch.
    pub start_time: Option<SystemTime>,
    pub working_directory: Option<PathBuf>,
}

impl ProcessDetails {
    pub fn is_empty(&self) -> bool {
        self.command_line.is_none()
            && self.owner.is_none()
            && self.start_time.is_none()
            && self.working_directory.is_none()
    }
}

/// A process observed listening on a port.
///
/// This is a snapshot. After any blocking operation (I/O, sleep, a prompt)
/// the PID may belong to a different process, so nothing acts on a record
/// without re-verifying it first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub port: u16,
    /// Short name from the process table or the listener tool.
    pub name: String,
    pub details: ProcessDetails,
}

impl ProcessRecord {
    pub fn new(pid: u32, port: u16, name: impl Into<String>) -> Self {
        Self {
            pid,
            port,
            name: name.into(),
            details: ProcessDetails::default(),
        }
    }

    pub fn with_details(mut self, details: ProcessDetails) -> Self {
        self.details = details;
        self
    }

    pub fn with_command_line(mut self, command_line: impl Into<String>) -> Self {
        self.details.command_line = Some(command_line.into());
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.details.working_directory = Some(dir.into());
        self
    }

    pub fn with_start_time(mut self, start: SystemTime) -> Self {
        self.details.start_time = Some(start);
        self
    }

    pub fn command_line(&self) -> Option<&str> {
        self.details.command_line.as_deref()
    }

    /// Time since the process started, when the start time is known.
    pub fn runtime(&self) -> Option<Duration> {
        self.runtime_at(SystemTime::now())
    }

    pub fn runtime_at(&self, now: SystemTime) -> Option<Duration> {
        let start = self.details.start_time?;
        now.duration_since(start).ok()
    }
}
