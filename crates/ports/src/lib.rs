#![forbid(unsafe_code)]

pub mod classify;
pub mod container;
pub mod domain;
pub mod error;
pub mod resolver;
pub mod scan;
pub mod tally;
pub mod terminate;
pub mod verify;

pub use classify::{Classification, Verdict, classify, explain};
pub use domain::{ProcessDetails, ProcessRecord, TerminationOutcome};
pub use error::Error;
pub use resolver::{DetailResolver, SystemResolver, parse_start_time};
pub use scan::{
    Listener, ListenerProbe, PortError, PortList, ProbeError, ScanOutcome, ScanSettings, Scanner,
    default_probes, is_port_in_use, parse_port_range, unique_by_pid,
};
pub use tally::Tally;
pub use terminate::{
    Phase, ProcessControl, SignalError, StopSignal, Supervisor, SystemProcessControl,
    TerminationReport, TerminationSettings, Terminator,
};
pub use verify::{SignalAgreement, VerificationResult, Verifier, command_base};

pub use config::DEFAULT_DEV_PORTS;
