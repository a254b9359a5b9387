#![forbid(unsafe_code)]

use ports::Classification;

/// What to do with one classified batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Ask,
    /// Report as hypothetical, send nothing.
    DryRun,
    Never,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Policy {
    /// `--yes`
    pub assume_yes: bool,
    /// `auto_confirm_safe_actions` from the configuration.
    pub auto_confirm: bool,
    pub dry_run: bool,
}

impl Policy {
    /// Blanket approval only ever covers safe dev servers; everything else
    /// is asked for, and protected listeners are never touched.
    pub fn decide(&self, classification: Classification) -> Decision {
        match classification {
            Classification::Protected => Decision::Never,
            _ if self.dry_run => Decision::DryRun,
            Classification::SafeDevServer if self.assume_yes || self.auto_confirm => {
                Decision::Proceed
            }
            Classification::SafeDevServer | Classification::NeedsConfirmation => Decision::Ask,
        }
    }
}
