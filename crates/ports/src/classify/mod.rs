#![forbid(unsafe_code)]

//! Safety classification of an observed listener.
//!
//! Pure: the verdict depends only on the record and the protected-ports
//! predicate, so it is recomputed freely and never stored.

mod rules;

pub use rules::{DEV_PORT_BAND, RULES, Rule};

use crate::domain::ProcessRecord;
use rules::Subject;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Classification {
    /// Listening on a protected port. Never touched.
    Protected,
    /// A recognised development server, safe to stop without asking.
    SafeDevServer,
    /// Infrastructure or unknown. Only stopped after an explicit yes.
    NeedsConfirmation,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Protected => "protected",
            Self::SafeDevServer => "safe dev server",
            Self::NeedsConfirmation => "needs confirmation",
        })
    }
}

/// A classification together with the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub classification: Classification,
    pub rule: &'static str,
}

pub fn classify(record: &ProcessRecord, is_protected: impl Fn(u16) -> bool) -> Classification {
    explain(record, is_protected).classification
}

pub fn explain(record: &ProcessRecord, is_protected: impl Fn(u16) -> bool) -> Verdict {
    if is_protected(record.port) {
        return Verdict {
            classification: Classification::Protected,
            rule: "protected port",
        };
    }

    let subject = Subject::new(record);
    RULES
        .iter()
        .find(|rule| (rule.matches)(&subject))
        .map_or(
            Verdict {
                classification: Classification::NeedsConfirmation,
                rule: "unknown",
            },
            |rule| Verdict {
                classification: rule.verdict,
                rule: rule.name,
            },
        )
}
