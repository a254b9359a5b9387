#![forbid(unsafe_code)]

mod outcome;
mod record;

pub use outcome::TerminationOutcome;
pub use record::{ProcessDetails, ProcessRecord};
