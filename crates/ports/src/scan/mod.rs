#![forbid(unsafe_code)]

mod listener;
mod parse;
mod range;

pub use listener::{
    Listener, ListenerProbe, LsofProbe, NetstatProbe, ProbeError, ProcfsProbe, SsProbe,
    default_probes,
};
pub use parse::{parse_lsof, parse_netstat, parse_ss};
pub use range::{PortList, parse_port_range};

use crate::domain::ProcessRecord;
use crate::error::Error;
use crate::resolver::{self, DetailResolver};
use crate::verify::command_base;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

const MAX_WORKERS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    pub probe_timeout: Duration,
    pub scan_timeout: Duration,
    pub workers: usize,
}

impl ScanSettings {
    pub fn new(config: &config::Scan) -> Self {
        Self {
            probe_timeout: config.probe_timeout,
            scan_timeout: config.scan_timeout,
            workers: config.max_workers.unwrap_or_else(default_workers).max(1),
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self::new(&config::Scan::default())
    }
}

/// Twice the available parallelism, capped at 20, never below one.
pub fn default_workers() -> usize {
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
    (cores * 2).clamp(1, MAX_WORKERS)
}

/// A port whose probe failed. The scan itself may still have succeeded.
#[derive(Debug)]
pub struct PortError {
    pub port: u16,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// One record per PID, in the order of the scanned port list.
    pub records: Vec<ProcessRecord>,
    pub errors: Vec<PortError>,
}

pub struct Scanner {
    probes: Vec<Box<dyn ListenerProbe>>,
    resolver: Arc<dyn DetailResolver>,
    settings: ScanSettings,
}

impl Scanner {
    pub fn new(settings: ScanSettings, resolver: Arc<dyn DetailResolver>) -> Self {
        Self::with_probes(settings, default_probes(), resolver)
    }

    pub fn with_probes(
        settings: ScanSettings,
        probes: Vec<Box<dyn ListenerProbe>>,
        resolver: Arc<dyn DetailResolver>,
    ) -> Self {
        Self {
            probes,
            resolver,
            settings,
        }
    }

    /// Find the processes listening on `ports`.
    ///
    /// Ports are probed concurrently on a bounded pool. A failure on one
    /// port is attached to the outcome; only a scan that found nothing and
    /// hit at least one error fails as a whole.
    pub async fn scan(
        &self,
        ports: &[u16],
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, Error> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        debug!(
            count = ports.len(),
            workers = self.settings.workers,
            "scanning ports"
        );

        // Written once per port by the worker that probed it, read only once
        // every worker is done or the scan ceiling fired.
        let mut slots: Vec<Option<Result<Vec<ProcessRecord>, Error>>> =
            std::iter::repeat_with(|| None).take(ports.len()).collect();

        let mut work = stream::iter(ports.iter().copied().enumerate())
            .map(|(index, port)| async move {
                if cancel.is_cancelled() {
                    return (index, Err(Error::Cancelled));
                }
                (index, self.probe_port(port).await)
            })
            .buffer_unordered(self.settings.workers);

        let drained = tokio::time::timeout(self.settings.scan_timeout, async {
            while let Some((index, result)) = work.next().await {
                slots[index] = Some(result);
            }
        })
        .await;
        drop(work);

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let ceiling = self.settings.scan_timeout;
        let timed_out = drained.is_err();
        if timed_out {
            warn!(?ceiling, "scan ceiling reached, keeping finished ports");
        }

        let mut records = Vec::new();
        let mut errors = Vec::new();
        for (port, slot) in ports.iter().copied().zip(slots) {
            match slot {
                Some(Ok(found)) => records.extend(found),
                None if timed_out => errors.push(PortError {
                    port,
                    error: Error::ProbeTimeout {
                        port,
                        timeout: ceiling,
                    },
                }),
                None | Some(Err(Error::Cancelled)) => {}
                Some(Err(error)) => {
                    warn!(port, %error, "port scan failed");
                    errors.push(PortError { port, error });
                }
            }
        }

        let found = records.len();
        let records = unique_by_pid(records);
        if records.len() != found {
            debug!(removed = found - records.len(), "dropped duplicate PIDs");
        }

        if records.is_empty()
            && let Some(first) = errors.drain(..).next()
        {
            return Err(Error::ScanFailed(Box::new(first.error)));
        }

        Ok(ScanOutcome { records, errors })
    }

    async fn probe_port(&self, port: u16) -> Result<Vec<ProcessRecord>, Error> {
        if port == 0 {
            return Err(Error::InvalidPort(0));
        }

        let timeout = self.settings.probe_timeout;
        let mut failure = None;
        for probe in &self.probes {
            match probe.listeners(port, timeout).await {
                Ok(listeners) => {
                    trace!(
                        port,
                        tool = probe.name(),
                        count = listeners.len(),
                        "probe answered"
                    );
                    return Ok(self.enrich(port, listeners).await);
                }
                Err(ProbeError::Unavailable) => continue,
                Err(ProbeError::TimedOut) => return Err(Error::ProbeTimeout { port, timeout }),
                Err(ProbeError::Failed(reason)) => {
                    debug!(port, tool = probe.name(), %reason, "probe failed, trying next");
                    failure = Some(Error::ProbeFailed {
                        port,
                        tool: probe.name(),
                        reason,
                    });
                }
            }
        }
        Err(failure.unwrap_or(Error::ToolUnavailable))
    }

    async fn enrich(&self, port: u16, listeners: Vec<Listener>) -> Vec<ProcessRecord> {
        let mut seen = BTreeSet::new();
        let mut records = Vec::with_capacity(listeners.len());
        for listener in listeners {
            if listener.pid == 0 || !seen.insert(listener.pid) {
                continue;
            }
            let details = self.resolver.resolve(listener.pid).await;
            let name = listener
                .name
                .or_else(|| resolver::process_name(listener.pid))
                .or_else(|| details.command_line.as_deref().map(command_base))
                .unwrap_or_default();
            records.push(ProcessRecord::new(listener.pid, port, name).with_details(details));
        }
        records
    }
}

/// Keep the first record of every PID. A process listening on several
/// ports is acted on once.
pub fn unique_by_pid(records: Vec<ProcessRecord>) -> Vec<ProcessRecord> {
    let mut seen = BTreeSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.pid))
        .collect()
}

/// Whether something is bound to `port` on all interfaces.
pub async fn is_port_in_use(port: u16) -> bool {
    tokio::net::TcpListener::bind(("0.0.0.0", port)).await.is_err()
}
