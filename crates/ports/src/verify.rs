#![forbid(unsafe_code)]

//! Re-identification of a PID right before it is signalled.

use crate::domain::{ProcessDetails, ProcessRecord};
use crate::resolver::DetailResolver;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;

const START_TIME_TOLERANCE: Duration = Duration::from_secs(1);

/// Which identity signals agree between the snapshot and the live process.
///
/// A signal that neither side could observe counts as agreeing; one that
/// only one side observed does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalAgreement {
    pub start_time: bool,
    pub working_directory: bool,
    pub command_base: bool,
}

impl SignalAgreement {
    pub fn count(&self) -> usize {
        [self.start_time, self.working_directory, self.command_base]
            .into_iter()
            .filter(|agrees| *agrees)
            .count()
    }

    /// Two of three, or working directory and start time regardless of the
    /// command, since a process may rewrite its own command line.
    pub fn is_same_process(&self) -> bool {
        self.count() >= 2 || (self.working_directory && self.start_time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub matches: bool,
    pub signals: SignalAgreement,
    pub reason: String,
}

impl VerificationResult {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            matches: false,
            signals: SignalAgreement::default(),
            reason: reason.into(),
        }
    }
}

/// Lowercased executable name of a command line, without path or arguments.
pub fn command_base(command: &str) -> String {
    let executable = command.split_whitespace().next().unwrap_or_default();
    executable
        .rsplit('/')
        .next()
        .unwrap_or(executable)
        .to_lowercase()
}

fn agree<T>(expected: Option<T>, current: Option<T>, same: impl FnOnce(T, T) -> bool) -> bool {
    match (expected, current) {
        (Some(expected), Some(current)) => same(expected, current),
        (None, None) => true,
        _ => false,
    }
}

fn within_tolerance(a: SystemTime, b: SystemTime) -> bool {
    let diff = a
        .duration_since(b)
        .or_else(|_| b.duration_since(a))
        .unwrap_or_default();
    diff <= START_TIME_TOLERANCE
}

/// Compare a snapshot with freshly resolved details of the same PID.
pub fn compare(expected: &ProcessDetails, current: &ProcessDetails) -> VerificationResult {
    if expected.command_line.is_some() && current.command_line.is_none() {
        return VerificationResult::rejected("cannot read the current command line");
    }

    let signals = SignalAgreement {
        start_time: agree(expected.start_time, current.start_time, within_tolerance),
        working_directory: agree(
            expected.working_directory.as_ref(),
            current.working_directory.as_ref(),
            |a, b| a == b,
        ),
        command_base: agree(
            expected.command_line.as_deref(),
            current.command_line.as_deref(),
            |a, b| command_base(a) == command_base(b),
        ),
    };

    let matches = signals.is_same_process();
    let reason = if matches {
        format!("{} of 3 identity signals agree", signals.count())
    } else {
        format!(
            "start_time_match={}, working_dir_match={}, command_match={}",
            signals.start_time, signals.working_directory, signals.command_base
        )
    };
    VerificationResult {
        matches,
        signals,
        reason,
    }
}

pub struct Verifier {
    resolver: Arc<dyn DetailResolver>,
    timeout: Duration,
}

impl Verifier {
    pub fn new(resolver: Arc<dyn DetailResolver>, timeout: Duration) -> Self {
        Self { resolver, timeout }
    }

    /// Whether `pid` is still the process described by `expected`.
    pub async fn verify(&self, pid: u32, expected: &ProcessRecord) -> VerificationResult {
        if pid == 0 {
            return VerificationResult::rejected("invalid PID 0");
        }

        let Ok(current) = tokio::time::timeout(self.timeout, self.resolver.resolve(pid)).await
        else {
            debug!(pid, timeout = ?self.timeout, "verification timed out");
            return VerificationResult::rejected(format!(
                "timed out after {:?} reading process details",
                self.timeout
            ));
        };

        let result = compare(&expected.details, &current);
        debug!(pid, matches = result.matches, reason = %result.reason, "verified identity");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
    }

    fn details(command: &str, dir: &str, start: SystemTime) -> ProcessDetails {
        ProcessDetails {
            command_line: Some(command.into()),
            owner: None,
            start_time: Some(start),
            working_directory: Some(PathBuf::from(dir)),
        }
    }

    #[test]
    fn base_command_strips_path_and_arguments() {
        assert_eq!(command_base("/usr/bin/Node server.js --port 3000"), "node");
        assert_eq!(command_base("python3"), "python3");
        assert_eq!(command_base(""), "");
    }

    #[test]
    fn reused_pid_is_rejected() {
        let expected = details("node server.js", "/app", at(0));
        let current = details("postgres", "/var/lib/pg", at(3600));
        let result = compare(&expected, &current);
        assert!(!result.matches);
        assert_eq!(result.signals, SignalAgreement::default());
    }

    #[test]
    fn rewritten_command_line_still_matches() {
        let expected = details("node server.js", "/app", at(0));
        let current = details("next-server (v14)", "/app", at(0));
        let result = compare(&expected, &current);
        assert!(result.matches);
        assert!(!result.signals.command_base);
    }

    #[test]
    fn start_time_tolerates_one_second() {
        let expected = details("node a.js", "/a", at(10));
        let current = details("node b.js", "/elsewhere", at(11));
        assert!(compare(&expected, &current).matches);

        let late = details("ruby", "/elsewhere", at(12));
        assert!(!compare(&expected, &late).matches);
    }

    #[test]
    fn unobservable_on_both_sides_does_not_disagree() {
        let expected = ProcessDetails {
            command_line: Some("vite".into()),
            ..Default::default()
        };
        let current = expected.clone();
        let result = compare(&expected, &current);
        assert!(result.matches);
        assert_eq!(result.signals.count(), 3);
    }

    #[test]
    fn unreadable_current_command_is_rejected() {
        let expected = details("node server.js", "/app", at(0));
        let mut current = expected.clone();
        current.command_line = None;
        assert!(!compare(&expected, &current).matches);
    }

    #[test]
    fn observed_on_one_side_only_is_not_agreement() {
        let expected = ProcessDetails {
            command_line: Some("node".into()),
            start_time: Some(at(0)),
            ..Default::default()
        };
        let current = ProcessDetails {
            command_line: Some("bash".into()),
            working_directory: Some(PathBuf::from("/tmp")),
            ..Default::default()
        };
        let result = compare(&expected, &current);
        assert_eq!(result.signals, SignalAgreement::default());
        assert!(!result.matches);
    }
}
