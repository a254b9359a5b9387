#![forbid(unsafe_code)]

use super::parse::{parse_lsof, parse_netstat, parse_ss};
use crate::resolver::tool::{self, ToolOutput};
use async_trait::async_trait;
use procfs::net::TcpState;
use procfs::process::FDTarget;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::trace;

/// A PID holding a listening socket, with the name the tool reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    pub pid: u32,
    pub name: Option<String>,
}

impl Listener {
    pub fn new(pid: u32, name: Option<&str>) -> Self {
        Self {
            pid,
            name: name.filter(|n| !n.is_empty()).map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The strategy cannot run here; the next one should be tried.
    Unavailable,
    TimedOut,
    Failed(String),
}

/// One way of answering "who listens on this port".
///
/// An empty list means nothing is listening; that is not an error.
#[async_trait]
pub trait ListenerProbe: Send + Sync {
    fn name(&self) -> &'static str;

    async fn listeners(&self, port: u16, timeout: Duration) -> Result<Vec<Listener>, ProbeError>;
}

/// The strategies in the order they are tried.
pub fn default_probes() -> Vec<Box<dyn ListenerProbe>> {
    vec![
        Box::new(LsofProbe),
        Box::new(SsProbe),
        Box::new(NetstatProbe),
        Box::new(ProcfsProbe),
    ]
}

/// Map a tool run onto a probe result. `empty_exit` is the status the tool
/// uses for "no match".
fn interpret(
    output: ToolOutput,
    empty_exit: Option<i32>,
    parse: impl FnOnce(&str) -> Vec<Listener>,
) -> Result<Vec<Listener>, ProbeError> {
    match output {
        ToolOutput::Success(text) => Ok(parse(&text)),
        ToolOutput::Exit { code, .. } if code.is_some() && code == empty_exit => Ok(Vec::new()),
        ToolOutput::Exit { code, stderr } => Err(ProbeError::Failed(match code {
            Some(code) => format!("exit status {code}: {stderr}"),
            None => format!("terminated by signal: {stderr}"),
        })),
        ToolOutput::Missing => Err(ProbeError::Unavailable),
        ToolOutput::TimedOut => Err(ProbeError::TimedOut),
        ToolOutput::Failed(err) => Err(ProbeError::Failed(err.to_string())),
    }
}

#[derive(Debug, Default)]
pub struct LsofProbe;

#[async_trait]
impl ListenerProbe for LsofProbe {
    fn name(&self) -> &'static str {
        "lsof"
    }

    async fn listeners(&self, port: u16, timeout: Duration) -> Result<Vec<Listener>, ProbeError> {
        let filter = format!(":{port}");
        let output = tool::run(
            "lsof",
            &["-i", filter.as_str(), "-sTCP:LISTEN", "-P", "-n"],
            timeout,
        )
        .await;
        interpret(output, Some(1), parse_lsof)
    }
}

#[derive(Debug, Default)]
pub struct SsProbe;

#[async_trait]
impl ListenerProbe for SsProbe {
    fn name(&self) -> &'static str {
        "ss"
    }

    async fn listeners(&self, port: u16, timeout: Duration) -> Result<Vec<Listener>, ProbeError> {
        let filter = format!("sport = :{port}");
        let output = tool::run("ss", &["-tlnp", filter.as_str()], timeout).await;
        interpret(output, Some(1), parse_ss)
    }
}

#[derive(Debug, Default)]
pub struct NetstatProbe;

#[async_trait]
impl ListenerProbe for NetstatProbe {
    fn name(&self) -> &'static str {
        "netstat"
    }

    async fn listeners(&self, port: u16, timeout: Duration) -> Result<Vec<Listener>, ProbeError> {
        let output = tool::run("netstat", &["-tlnp"], timeout).await;
        interpret(output, None, |text| parse_netstat(text, port))
    }
}

/// Reads the kernel socket tables directly and maps listening socket inodes
/// to the processes holding them. Only sockets of processes whose `fd`
/// directory is readable can be attributed.
#[derive(Debug, Default)]
pub struct ProcfsProbe;

impl ProcfsProbe {
    fn scan(port: u16) -> Result<Vec<Listener>, ProbeError> {
        let mut entries = procfs::net::tcp().map_err(|err| ProbeError::Failed(err.to_string()))?;
        // IPv6 may be compiled out; IPv4 alone is still a valid answer.
        entries.extend(procfs::net::tcp6().unwrap_or_default());

        let inodes: BTreeSet<u64> = entries
            .iter()
            .filter(|entry| entry.state == TcpState::Listen && entry.local_address.port() == port)
            .map(|entry| entry.inode)
            .collect();
        if inodes.is_empty() {
            return Ok(Vec::new());
        }

        let processes =
            procfs::process::all_processes().map_err(|err| ProbeError::Failed(err.to_string()))?;
        let mut listeners = Vec::new();
        for process in processes.flatten() {
            let Ok(fds) = process.fd() else {
                continue;
            };
            let holds_socket = fds.flatten().any(|fd| {
                matches!(fd.target, FDTarget::Socket(inode) if inodes.contains(&inode))
            });
            if holds_socket {
                let name = process.stat().ok().map(|stat| stat.comm);
                listeners.push(Listener::new(process.pid as u32, name.as_deref()));
            }
        }
        trace!(port, count = listeners.len(), "procfs listeners");
        Ok(listeners)
    }
}

#[async_trait]
impl ListenerProbe for ProcfsProbe {
    fn name(&self) -> &'static str {
        "procfs"
    }

    async fn listeners(&self, port: u16, timeout: Duration) -> Result<Vec<Listener>, ProbeError> {
        if !cfg!(target_os = "linux") {
            return Err(ProbeError::Unavailable);
        }
        let task = tokio::task::spawn_blocking(move || Self::scan(port));
        match tokio::time::timeout(timeout, task).await {
            Err(_) => Err(ProbeError::TimedOut),
            Ok(Err(err)) => Err(ProbeError::Failed(err.to_string())),
            Ok(Ok(result)) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsof_exit_one_means_nothing_listening() {
        let output = ToolOutput::Exit {
            code: Some(1),
            stderr: String::new(),
        };
        assert_eq!(interpret(output, Some(1), parse_lsof), Ok(Vec::new()));
    }

    #[test]
    fn other_exit_codes_are_failures() {
        let output = ToolOutput::Exit {
            code: Some(2),
            stderr: "bad option".into(),
        };
        assert_eq!(
            interpret(output, Some(1), parse_lsof),
            Err(ProbeError::Failed("exit status 2: bad option".into()))
        );

        let netstat = ToolOutput::Exit {
            code: Some(1),
            stderr: String::new(),
        };
        assert!(matches!(
            interpret(netstat, None, |text| parse_netstat(text, 80)),
            Err(ProbeError::Failed(_))
        ));
    }

    #[test]
    fn missing_tool_defers_to_next_strategy() {
        assert_eq!(
            interpret(ToolOutput::Missing, Some(1), parse_lsof),
            Err(ProbeError::Unavailable)
        );
        assert_eq!(
            interpret(ToolOutput::TimedOut, Some(1), parse_lsof),
            Err(ProbeError::TimedOut)
        );
    }
}
