use clap::Parser;
use config::Config;
use ports::{
    ScanSettings, Scanner, SystemProcessControl, SystemResolver, TerminationSettings, Terminator,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use zap::{
    approval::Policy,
    cli::{Cli, Command, PortsArgs},
    lock::{InstanceLock, user_config_dir},
    prompt::TerminalConfirmer,
    session::Session,
    signals::cancel_on_signal,
};

/// Conventional status for a run interrupted by SIGINT.
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // NOTE: The verbosity flag takes precedence over the environment variable.
    // `ZAP_LOG=warn zap -vvv ports` still logs at the trace level; the
    // variable only narrows levels per crate, e.g. `ZAP_LOG=ports=debug`.
    let env_filter = EnvFilter::builder()
        .with_env_var("ZAP_LOG")
        .from_env()?
        .add_directive(cli.verbosity.log_level_filter().as_str().parse()?);

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(layer)
        .with(env_filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => {
            let candidates = config_candidates()?;
            trace!(?candidates, "config file candidates");
            Config::load_multiple(candidates)?
        }
    };
    debug!(?config, ?cli);

    match cli.command {
        Command::Ports(args) => run_ports(config, args).await,
        Command::Config => {
            write!(io::stdout().lock(), "{}", config.to_toml()?)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_ports(config: Config, args: PortsArgs) -> anyhow::Result<ExitCode> {
    let Some(lock_dir) = user_config_dir() else {
        anyhow::bail!("cannot locate a config directory for the instance lock; set HOME");
    };
    let _lock = InstanceLock::acquire(&lock_dir)?;

    let ports = match args.ports {
        Some(list) => list.into_vec(),
        None => config.ports.scan_list(),
    };

    let cancel = CancellationToken::new();
    let signal_handle = tokio::spawn(cancel_on_signal(cancel.clone()));

    let resolver = Arc::new(SystemResolver::new(config.scan.resolve_timeout));
    let scanner = Scanner::new(ScanSettings::new(&config.scan), resolver.clone());
    let terminator = Terminator::new(
        TerminationSettings::new(&config.termination),
        Arc::new(SystemProcessControl),
        resolver,
    );
    let policy = Policy {
        assume_yes: args.yes,
        auto_confirm: config.auto_confirm_safe_actions,
        dry_run: args.dry_run,
    };

    let mut session = Session::new(
        scanner,
        terminator,
        config,
        policy,
        TerminalConfirmer,
        io::stdout(),
    );
    let result = session.run(&ports, &cancel).await;
    signal_handle.abort();

    match result {
        Ok(summary) if summary.cancelled => Ok(ExitCode::from(EXIT_CANCELLED)),
        Ok(summary) if summary.tally.failed > 0 => Ok(ExitCode::FAILURE),
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(err)
            if matches!(
                err.downcast_ref::<ports::Error>(),
                Some(ports::Error::Cancelled)
            ) =>
        {
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        Err(err) => Err(err),
    }
}

/// System-wide files first, the user's file last so it wins.
fn config_candidates() -> anyhow::Result<Vec<PathBuf>> {
    let mut candidates = vec![PathBuf::from("/etc/zap/config.toml")];
    candidates.extend(glob::glob("/etc/zap/config.d/*.toml")?.filter_map(Result::ok));

    if let Some(dir) = user_config_dir() {
        candidates.push(dir.join("config.toml"));
    }
    Ok(candidates)
}
