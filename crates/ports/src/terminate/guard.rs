#![forbid(unsafe_code)]

//! Checks that run before any signal, independent of classification.

use crate::domain::TerminationOutcome;

const ROOT: u32 = 0;

/// Whether the caller may signal a process owned by `owner`.
///
/// `name` maps a uid to a user name for the refusal message.
pub fn check_ownership(
    caller: u32,
    owner: Option<u32>,
    name: impl Fn(u32) -> Option<String>,
) -> Result<(), TerminationOutcome> {
    let Some(owner) = owner else {
        return Err(TerminationOutcome::PermissionDenied(
            "could not determine the process owner".into(),
        ));
    };
    if caller == ROOT || caller == owner {
        return Ok(());
    }
    if owner == ROOT {
        return Err(TerminationOutcome::PermissionDenied(
            "process is owned by root/system - use sudo or contact your system administrator"
                .into(),
        ));
    }

    let display = |uid: u32| name(uid).unwrap_or_else(|| format!("uid {uid}"));
    Err(TerminationOutcome::PermissionDenied(format!(
        "process is owned by user '{}' (you are '{}') - use sudo to stop it",
        display(owner),
        display(caller)
    )))
}

/// Refuse processes stuck in uninterruptible sleep (`D`) or already defunct
/// (`Z`). Neither will act on a signal.
pub fn check_state(state: Option<char>) -> Result<(), TerminationOutcome> {
    match state {
        Some(state @ ('D' | 'Z')) => Err(TerminationOutcome::Unkillable(state)),
        _ => Ok(()),
    }
}
