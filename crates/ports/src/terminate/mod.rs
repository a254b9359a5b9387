#![forbid(unsafe_code)]

//! Verified, escalating termination of listeners.
//!
//! Every attempt walks the same path: confirm the PID still is the process
//! that was observed, check ownership and scheduler state, then signal the
//! whole process group gracefully and escalate to a forced kill when the
//! group outlives its grace window. Nothing is signalled before identity
//! verification has passed in the same attempt.

mod control;
mod guard;
mod supervisor;

pub use control::{ProcessControl, SignalError, StopSignal, SystemProcessControl};
pub use guard::{check_ownership, check_state};
pub use supervisor::{Supervisor, systemd_unit};

use crate::domain::{ProcessRecord, TerminationOutcome};
use crate::resolver::DetailResolver;
use crate::verify::Verifier;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationSettings {
    pub grace_period: Duration,
    pub grace_per_member: Duration,
    pub grace_cap: Duration,
    pub poll_interval: Duration,
    pub force_wait: Duration,
    pub respawn_check_delay: Duration,
    pub verify_timeout: Duration,
}

impl TerminationSettings {
    pub fn new(config: &config::Termination) -> Self {
        Self {
            grace_period: config.grace_period,
            grace_per_member: config.grace_per_member,
            grace_cap: config.grace_cap,
            poll_interval: config.poll_interval,
            force_wait: config.force_wait,
            respawn_check_delay: config.respawn_check_delay,
            verify_timeout: config.verify_timeout,
        }
    }

    /// Grace window for a process group of `members` processes. Every
    /// member past the first adds `grace_per_member`.
    pub fn adaptive_grace(&self, members: usize) -> Duration {
        let extra = u32::try_from(members.saturating_sub(1)).unwrap_or(u32::MAX);
        self.grace_period
            .saturating_add(self.grace_per_member.saturating_mul(extra))
            .min(self.grace_cap)
            .max(self.grace_period)
    }
}

impl Default for TerminationSettings {
    fn default() -> Self {
        Self::new(&config::Termination::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    VerifyingIdentity,
    CheckingPermission,
    AttemptingGroupKill,
    SingleProcessFallback,
    WaitingGraceful,
    EscalatingForce,
    CheckingRespawn,
    Confirmed,
    Rejected,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of one termination attempt and the phases it went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationReport {
    pub pid: u32,
    pub port: u16,
    pub outcome: TerminationOutcome,
    pub phases: Vec<Phase>,
}

impl TerminationReport {
    pub fn visited(&self, phase: Phase) -> bool {
        self.phases.contains(&phase)
    }
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Process(u32),
    Group(u32),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process(pid) => write!(f, "process {pid}"),
            Self::Group(pgid) => write!(f, "process group {pgid}"),
        }
    }
}

struct Attempt {
    pid: u32,
    phases: Vec<Phase>,
}

impl Attempt {
    fn enter(&mut self, phase: Phase) {
        debug!(pid = self.pid, %phase, "termination phase");
        self.phases.push(phase);
    }
}

pub struct Terminator {
    control: Arc<dyn ProcessControl>,
    verifier: Verifier,
    settings: TerminationSettings,
}

impl Terminator {
    pub fn new(
        settings: TerminationSettings,
        control: Arc<dyn ProcessControl>,
        resolver: Arc<dyn DetailResolver>,
    ) -> Self {
        let verifier = Verifier::new(resolver, settings.verify_timeout);
        Self {
            control,
            verifier,
            settings,
        }
    }

    /// Stop the processes of `records` one after another.
    ///
    /// A failure on one PID never prevents the next from being attempted.
    /// Cancellation stops the batch between PIDs; records not attempted
    /// yet get no report.
    pub async fn terminate_batch(
        &self,
        records: &[ProcessRecord],
        cancel: &CancellationToken,
    ) -> Vec<TerminationReport> {
        let mut reports = Vec::with_capacity(records.len());
        for record in records {
            if cancel.is_cancelled() {
                warn!(remaining = records.len() - reports.len(), "termination cancelled");
                break;
            }
            reports.push(self.terminate(record).await);
        }
        reports
    }

    pub async fn terminate(&self, record: &ProcessRecord) -> TerminationReport {
        let mut attempt = Attempt {
            pid: record.pid,
            phases: vec![Phase::NotStarted],
        };
        let outcome = self.run(record, &mut attempt).await;
        attempt.enter(if outcome.is_success() {
            Phase::Confirmed
        } else {
            Phase::Rejected
        });

        if outcome.is_success() {
            info!(pid = record.pid, port = record.port, %outcome, "terminated");
        } else {
            warn!(pid = record.pid, port = record.port, %outcome, "not terminated");
        }
        TerminationReport {
            pid: record.pid,
            port: record.port,
            outcome,
            phases: attempt.phases,
        }
    }

    async fn run(&self, record: &ProcessRecord, attempt: &mut Attempt) -> TerminationOutcome {
        let pid = record.pid;
        if pid == 0 {
            return TerminationOutcome::Error("invalid PID 0".into());
        }
        if !self.control.is_alive(pid).await {
            return TerminationOutcome::AlreadyGone;
        }

        attempt.enter(Phase::VerifyingIdentity);
        let verification = self.verifier.verify(pid, record).await;
        if !verification.matches {
            if !self.control.is_alive(pid).await {
                return TerminationOutcome::AlreadyGone;
            }
            return TerminationOutcome::VerificationFailed(verification.reason);
        }

        attempt.enter(Phase::CheckingPermission);
        let owner = self.control.owner_uid(pid).await;
        let caller = self.control.caller_uid();
        if let Err(refusal) =
            guard::check_ownership(caller, owner, |uid| self.control.user_name(uid))
        {
            return refusal;
        }
        if let Err(refusal) = guard::check_state(self.control.scheduler_state(pid).await) {
            return refusal;
        }

        let outcome = self.stop(pid, attempt).await;
        if !outcome.stopped() {
            return outcome;
        }

        attempt.enter(Phase::CheckingRespawn);
        tokio::time::sleep(self.settings.respawn_check_delay).await;
        if !self.control.is_alive(pid).await {
            return outcome;
        }
        match self.control.supervisor(pid).await {
            Some(Supervisor { manager, stop_hint }) => {
                TerminationOutcome::RespawnedByManager { manager, stop_hint }
            }
            None => TerminationOutcome::Error(format!(
                "process {pid} is running again after termination (PID may have been reused)"
            )),
        }
    }

    /// Process group to signal for `pid`, unless signalling it would also
    /// hit this tool.
    async fn group_of(&self, pid: u32) -> Option<u32> {
        let pgid = self.control.process_group(pid).await?;
        if pgid <= 1 {
            return None;
        }
        if self.control.own_group() == Some(pgid) {
            debug!(pid, pgid, "target shares our process group, signalling it alone");
            return None;
        }
        Some(pgid)
    }

    async fn stop(&self, pid: u32, attempt: &mut Attempt) -> TerminationOutcome {
        if let Some(pgid) = self.group_of(pid).await {
            attempt.enter(Phase::AttemptingGroupKill);
            let members = self.control.group_size(pgid).await.unwrap_or(1);
            let window = self.settings.adaptive_grace(members);
            debug!(pid, pgid, members, ?window, "signalling process group");

            match self
                .control
                .signal_group(pgid, StopSignal::Graceful)
                .await
            {
                Ok(()) => return self.escalate(Target::Group(pgid), window, attempt).await,
                Err(err) => debug!(pid, pgid, ?err, "group signal failed, falling back"),
            }
        }

        attempt.enter(Phase::SingleProcessFallback);
        match self.control.signal(pid, StopSignal::Graceful).await {
            Ok(()) => {
                self.escalate(Target::Process(pid), self.settings.grace_period, attempt)
                    .await
            }
            Err(SignalError::Gone) => TerminationOutcome::AlreadyGone,
            Err(SignalError::PermissionDenied) => TerminationOutcome::PermissionDenied(format!(
                "not allowed to signal process {pid} - use sudo to stop it"
            )),
            Err(SignalError::Other(err)) => {
                if self.control.is_alive(pid).await {
                    TerminationOutcome::Error(format!("failed to signal process {pid}: {err}"))
                } else {
                    TerminationOutcome::AlreadyGone
                }
            }
        }
    }

    /// Wait out the grace window, then force.
    async fn escalate(
        &self,
        target: Target,
        window: Duration,
        attempt: &mut Attempt,
    ) -> TerminationOutcome {
        attempt.enter(Phase::WaitingGraceful);
        if self.wait_until_gone(target, window).await {
            return TerminationOutcome::GracefullyStopped;
        }

        attempt.enter(Phase::EscalatingForce);
        let forced = match target {
            Target::Process(pid) => self.control.signal(pid, StopSignal::Force).await,
            Target::Group(pgid) => self.control.signal_group(pgid, StopSignal::Force).await,
        };
        match forced {
            Ok(()) => {}
            Err(SignalError::Gone) => return TerminationOutcome::GracefullyStopped,
            Err(SignalError::PermissionDenied) => {
                return TerminationOutcome::PermissionDenied(format!(
                    "not allowed to force-stop {target}"
                ));
            }
            Err(SignalError::Other(err)) => {
                return TerminationOutcome::Error(format!("failed to force-stop {target}: {err}"));
            }
        }

        if self.wait_until_gone(target, self.settings.force_wait).await {
            TerminationOutcome::ForceStopped
        } else {
            TerminationOutcome::Error(format!("{target} did not terminate after force signal"))
        }
    }

    async fn is_running(&self, target: Target) -> bool {
        match target {
            Target::Process(pid) => self.control.is_alive(pid).await,
            Target::Group(pgid) => self.control.group_alive(pgid).await,
        }
    }

    /// Poll until `target` is gone or `window` has elapsed.
    async fn wait_until_gone(&self, target: Target, window: Duration) -> bool {
        let deadline = Instant::now() + window;
        loop {
            if !self.is_running(target).await {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(self.settings.poll_interval.min(deadline - now)).await;
        }
    }
}
