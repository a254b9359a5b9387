use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use ports::PortList;
use std::path::{Path, PathBuf};

/// zap: free up development ports
///
/// zap finds the processes listening on common development ports, tells
/// dev servers apart from databases and unknown processes, and stops the
/// ones you approve. Every PID is re-identified right before it is
/// signalled, so a recycled PID is never hit.
#[derive(Debug, Parser, Clone)]
#[command(about, long_about, version)]
pub struct Cli {
    /// Path to configuration file.
    ///
    /// If not provided, the default locations are checked. They are
    /// `/etc/zap/config.toml`, `/etc/zap/config.d/*.toml` and
    /// `$XDG_CONFIG_HOME/zap/config.toml` (or `~/.config/zap/config.toml`),
    /// later files overriding earlier ones. If none exist, the default
    /// configuration is used.
    #[arg(short, long, global = true, value_parser = validate_file)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Scan ports and stop the processes listening on them.
    #[command(visible_alias = "port")]
    Ports(PortsArgs),

    /// Print the effective configuration.
    Config,
}

#[derive(Debug, Args, Clone, Default)]
pub struct PortsArgs {
    /// Ports to scan, e.g. `3000-3010,8080,9000-9005`.
    ///
    /// Defaults to the configured scan list.
    #[arg(long, value_name = "RANGE")]
    pub ports: Option<PortList>,

    /// Stop safe dev servers without asking.
    ///
    /// Infrastructure and unknown processes are still confirmed one batch
    /// at a time.
    #[arg(short, long)]
    pub yes: bool,

    /// Show what would be stopped without sending any signal.
    #[arg(long)]
    pub dry_run: bool,
}

/// Check if the file exists.
#[inline(always)]
fn validate_file(file: &str) -> Result<PathBuf, String> {
    let path = Path::new(file);
    if path.exists() {
        Ok(path.to_owned())
    } else {
        Err(format!("File not found: {:?}", path))
    }
}
