#![forbid(unsafe_code)]

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no port scanning tool found (lsof, ss or netstat); install one of them")]
    ToolUnavailable,

    #[error("timed out after {timeout:?} scanning port {port}")]
    ProbeTimeout { port: u16, timeout: Duration },

    #[error("{tool} failed on port {port}: {reason}")]
    ProbeFailed {
        port: u16,
        tool: &'static str,
        reason: String,
    },

    #[error("invalid port number: {0} (must be 1-65535)")]
    InvalidPort(u32),

    #[error("invalid port range: {0}")]
    InvalidPortRange(String),

    #[error("scan errors encountered: {0}")]
    ScanFailed(Box<Error>),

    #[error("operation cancelled")]
    Cancelled,

    #[error("Failed to read procfs info: {0}")]
    Procfs(#[from] procfs::ProcError),

    #[error("System call failed: {0}")]
    Nix(#[from] nix::Error),

    #[error("Failed to run system query: {0}")]
    Io(#[from] std::io::Error),
}
