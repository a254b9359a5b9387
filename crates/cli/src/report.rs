#![forbid(unsafe_code)]

//! User-facing report lines, kept apart from tracing diagnostics.

use ports::container::Containment;
use ports::{Classification, PortError, ProcessRecord, Tally, TerminationReport, Verdict};
use std::io::{self, Write};
use std::time::Duration;

const COMMAND_PREVIEW: usize = 60;
const DIRECTORY_PREVIEW: usize = 40;

pub struct Reporter<W> {
    out: W,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn scanning(&mut self, count: usize) -> io::Result<()> {
        writeln!(self.out, "SCAN  checking {count} ports")
    }

    pub fn scan_error(&mut self, error: &PortError) -> io::Result<()> {
        writeln!(self.out, "WARN  :{} {}", error.port, error.error)
    }

    pub fn nothing_found(&mut self) -> io::Result<()> {
        writeln!(self.out, "OK    no listeners found")
    }

    pub fn found(
        &mut self,
        record: &ProcessRecord,
        verdict: &Verdict,
        containment: &Containment,
    ) -> io::Result<()> {
        write!(
            self.out,
            "FOUND :{} PID {} ({}) [{}]",
            record.port,
            record.pid,
            display_name(record),
            format_runtime(record.runtime())
        )?;
        if let Some(command) = record.command_line() {
            write!(self.out, " - {}", truncate(command, COMMAND_PREVIEW))?;
        }
        if let Some(dir) = &record.details.working_directory {
            let dir = dir.to_string_lossy();
            write!(self.out, " [{}]", truncate(&dir, DIRECTORY_PREVIEW))?;
        }
        write!(
            self.out,
            "\n      {} ({})",
            verdict.classification, verdict.rule
        )?;
        if containment.is_contained() {
            write!(self.out, ", {containment}")?;
        }
        writeln!(self.out)
    }

    pub fn skipped(&mut self, record: &ProcessRecord, reason: &str) -> io::Result<()> {
        writeln!(
            self.out,
            "SKIP  :{} PID {} ({}): {reason}",
            record.port,
            record.pid,
            display_name(record)
        )
    }

    pub fn action(
        &mut self,
        classification: Classification,
        records: &[ProcessRecord],
    ) -> io::Result<()> {
        writeln!(
            self.out,
            "ACTION {} {}:",
            records.len(),
            batch_label(classification)
        )?;
        for record in records {
            writeln!(
                self.out,
                "      :{} PID {} ({})",
                record.port,
                record.pid,
                display_name(record)
            )?;
        }
        Ok(())
    }

    pub fn would_terminate(&mut self, record: &ProcessRecord) -> io::Result<()> {
        writeln!(
            self.out,
            "STOP  :{} PID {} ({}) (would terminate)",
            record.port,
            record.pid,
            display_name(record)
        )
    }

    pub fn outcome(&mut self, report: &TerminationReport) -> io::Result<()> {
        let tag = if report.outcome.is_success() {
            "STOP"
        } else {
            "FAIL"
        };
        writeln!(
            self.out,
            "{tag:<5} :{} PID {}: {}",
            report.port, report.pid, report.outcome
        )
    }

    /// Totals of the run. A dry run is always labelled as hypothetical.
    pub fn summary(
        &mut self,
        tally: &Tally,
        would_terminate: usize,
        dry_run: bool,
    ) -> io::Result<()> {
        if dry_run {
            writeln!(
                self.out,
                "STATS would terminate={would_terminate} skipped={}",
                tally.skipped
            )
        } else {
            writeln!(self.out, "STATS {tally}")
        }
    }
}

/// Wording used for a batch in prompts and listings.
pub fn batch_label(classification: Classification) -> &'static str {
    match classification {
        Classification::SafeDevServer => "dev server(s)",
        Classification::NeedsConfirmation => "process(es) needing confirmation",
        Classification::Protected => "protected process(es)",
    }
}

fn display_name(record: &ProcessRecord) -> &str {
    if record.name.is_empty() {
        "unknown"
    } else {
        &record.name
    }
}

/// Coarse run time: seconds, minutes, hours or days. `?` when unknown.
pub fn format_runtime(runtime: Option<Duration>) -> String {
    let Some(runtime) = runtime else {
        return "?".to_owned();
    };
    match runtime.as_secs() {
        secs @ 0..60 => format!("{secs}s"),
        secs @ 60..3_600 => format!("{}m", secs / 60),
        secs @ 3_600..86_400 => format!("{}h", secs / 3_600),
        secs => format!("{}d", secs / 86_400),
    }
}

/// Shorten `text` to at most `max` characters, marking the cut with `...`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_owned();
    }
    let keep = max.saturating_sub(3);
    let mut short: String = text.chars().take(keep).collect();
    short.push_str("...");
    short
}
