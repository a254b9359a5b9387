#![forbid(unsafe_code)]

use crate::approval::{Decision, Policy};
use crate::prompt::Confirmer;
use crate::report::{Reporter, batch_label};
use config::Config;
use ports::{
    Classification, ProcessRecord, Scanner, Tally, TerminationReport, Terminator, container,
    explain, is_port_in_use,
};
use std::io::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delay before checking whether a freed port was taken again.
const PORT_RELEASE_DELAY: Duration = Duration::from_millis(100);

/// Batches in the order they are handled.
const BATCH_ORDER: [Classification; 3] = [
    Classification::SafeDevServer,
    Classification::NeedsConfirmation,
    Classification::Protected,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub tally: Tally,
    /// Candidates reported as hypothetical in a dry run.
    pub would_terminate: usize,
    pub cancelled: bool,
}

/// One scan-classify-approve-terminate pass over a list of ports.
pub struct Session<W, C> {
    scanner: Scanner,
    terminator: Terminator,
    config: Config,
    policy: Policy,
    confirmer: C,
    reporter: Reporter<W>,
}

impl<W: Write, C: Confirmer> Session<W, C> {
    pub fn new(
        scanner: Scanner,
        terminator: Terminator,
        config: Config,
        policy: Policy,
        confirmer: C,
        out: W,
    ) -> Self {
        Self {
            scanner,
            terminator,
            config,
            policy,
            confirmer,
            reporter: Reporter::new(out),
        }
    }

    pub fn into_output(self) -> W {
        self.reporter.into_inner()
    }

    pub async fn run(
        &mut self,
        ports: &[u16],
        cancel: &CancellationToken,
    ) -> anyhow::Result<Summary> {
        self.reporter.scanning(ports.len())?;
        let outcome = self.scanner.scan(ports, cancel).await?;
        for error in &outcome.errors {
            warn!(port = error.port, error = %error.error, "port probe failed");
            self.reporter.scan_error(error)?;
        }

        let mut summary = Summary::default();
        if outcome.records.is_empty() {
            self.reporter.nothing_found()?;
            return Ok(summary);
        }

        let mut batches: [Vec<ProcessRecord>; 3] = Default::default();
        for record in outcome.records {
            let verdict = explain(&record, |port| self.config.is_port_protected(port));
            let containment = container::inspect(record.pid);
            self.reporter.found(&record, &verdict, &containment)?;
            let index = BATCH_ORDER
                .iter()
                .position(|class| *class == verdict.classification)
                .unwrap_or(BATCH_ORDER.len() - 1);
            batches[index].push(record);
        }

        for (classification, records) in BATCH_ORDER.into_iter().zip(batches) {
            if records.is_empty() {
                continue;
            }
            if cancel.is_cancelled() {
                summary.cancelled = true;
                summary.tally.skip(records.len());
                continue;
            }
            self.handle_batch(classification, &records, cancel, &mut summary)
                .await?;
        }

        summary.cancelled |= cancel.is_cancelled();
        self.reporter
            .summary(&summary.tally, summary.would_terminate, self.policy.dry_run)?;
        Ok(summary)
    }

    async fn handle_batch(
        &mut self,
        classification: Classification,
        records: &[ProcessRecord],
        cancel: &CancellationToken,
        summary: &mut Summary,
    ) -> anyhow::Result<()> {
        match self.policy.decide(classification) {
            Decision::Never => {
                for record in records {
                    self.reporter.skipped(record, "protected")?;
                }
                summary.tally.skip(records.len());
            }
            Decision::DryRun => {
                for record in records {
                    self.reporter.would_terminate(record)?;
                }
                summary.would_terminate += records.len();
            }
            Decision::Ask => {
                self.reporter.action(classification, records)?;
                let question = format!(
                    "Terminate {} {}?",
                    records.len(),
                    batch_label(classification)
                );
                if self.confirmer.confirm(&question) {
                    self.terminate(records, cancel, summary).await?;
                } else {
                    info!(%classification, count = records.len(), "batch declined");
                    for record in records {
                        self.reporter.skipped(record, "declined")?;
                    }
                    summary.tally.skip(records.len());
                }
            }
            Decision::Proceed => {
                self.reporter.action(classification, records)?;
                self.terminate(records, cancel, summary).await?;
            }
        }
        Ok(())
    }

    async fn terminate(
        &mut self,
        records: &[ProcessRecord],
        cancel: &CancellationToken,
        summary: &mut Summary,
    ) -> anyhow::Result<()> {
        let reports = self.terminator.terminate_batch(records, cancel).await;
        for report in &reports {
            self.reporter.outcome(report)?;
        }
        summary.tally.merge(reports.iter().collect());
        summary.tally.skip(records.len() - reports.len());
        check_port_release(&reports).await;
        Ok(())
    }
}

async fn check_port_release(reports: &[TerminationReport]) {
    let stopped: Vec<u16> = reports
        .iter()
        .filter(|report| report.outcome.stopped() && report.port != 0)
        .map(|report| report.port)
        .collect();
    if stopped.is_empty() {
        return;
    }
    tokio::time::sleep(PORT_RELEASE_DELAY).await;
    for port in stopped {
        if is_port_in_use(port).await {
            debug!(port, "port is bound again after stop");
        }
    }
}
