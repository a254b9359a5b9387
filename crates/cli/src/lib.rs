#![forbid(unsafe_code)]

pub mod approval;
pub mod cli;
pub mod lock;
pub mod prompt;
pub mod report;
pub mod session;
pub mod signals;
