#![forbid(unsafe_code)]

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::trace;

/// Result of running one external system query.
#[derive(Debug)]
pub(crate) enum ToolOutput {
    /// Exit status zero; stdout as text.
    Success(String),
    /// Non-zero exit. `code` is `None` when killed by a signal.
    Exit { code: Option<i32>, stderr: String },
    /// The program is not on `PATH`.
    Missing,
    TimedOut,
    Failed(std::io::Error),
}

impl ToolOutput {
    /// Trimmed stdout of a successful, non-empty run.
    pub(crate) fn into_text(self) -> Option<String> {
        match self {
            Self::Success(text) => {
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_owned())
            }
            _ => None,
        }
    }
}

/// Run `program` with `args`, killing it once `timeout` elapses.
///
/// The C locale is forced so date and number formats are predictable.
pub(crate) async fn run(program: &'static str, args: &[&str], timeout: Duration) -> ToolOutput {
    let Ok(path) = which::which(program) else {
        return ToolOutput::Missing;
    };

    let mut command = Command::new(path);
    command
        .args(args)
        .env("LC_ALL", "C")
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Err(_) => {
            trace!(program, ?args, ?timeout, "system query timed out");
            return ToolOutput::TimedOut;
        }
        Ok(Err(err)) => return ToolOutput::Failed(err),
        Ok(Ok(output)) => output,
    };

    if output.status.success() {
        ToolOutput::Success(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        ToolOutput::Exit {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        }
    }
}
