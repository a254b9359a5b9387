#![forbid(unsafe_code)]

use crate::domain::TerminationOutcome;
use crate::terminate::TerminationReport;
use std::fmt;

/// Per-batch counts shown in the summary line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub terminated: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Tally {
    pub fn record(&mut self, outcome: &TerminationOutcome) {
        if outcome.is_success() {
            self.terminated += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn skip(&mut self, count: usize) {
        self.skipped += count;
    }

    pub fn merge(&mut self, other: Tally) {
        self.terminated += other.terminated;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    pub fn total(&self) -> usize {
        self.terminated + self.failed + self.skipped
    }
}

impl<'a> FromIterator<&'a TerminationReport> for Tally {
    fn from_iter<I: IntoIterator<Item = &'a TerminationReport>>(reports: I) -> Self {
        let mut tally = Tally::default();
        for report in reports {
            tally.record(&report.outcome);
        }
        tally
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "terminated={} failed={} skipped={}",
            self.terminated, self.failed, self.skipped
        )
    }
}
