#![forbid(unsafe_code)]

use dialoguer::Confirm;
use std::io::IsTerminal;
use tracing::debug;

/// Asks the user for a yes/no decision on one batch.
pub trait Confirmer {
    fn confirm(&mut self, question: &str) -> bool;
}

impl<F: FnMut(&str) -> bool> Confirmer for F {
    fn confirm(&mut self, question: &str) -> bool {
        self(question)
    }
}

/// Interactive prompt on the controlling terminal. Without one, every
/// question is answered with no.
///
/// Must run on the multi-threaded runtime: the worker thread is handed
/// over to the blocking prompt while it waits for input.
#[derive(Debug, Default)]
pub struct TerminalConfirmer;

impl Confirmer for TerminalConfirmer {
    fn confirm(&mut self, question: &str) -> bool {
        if !std::io::stdin().is_terminal() {
            debug!(question, "stdin is not a terminal, declining");
            return false;
        }
        off_runtime(|| {
            Confirm::new()
                .with_prompt(question)
                .default(false)
                .interact()
                .unwrap_or(false)
        })
    }
}

/// Run a blocking prompt while the runtime keeps driving other tasks.
fn off_runtime<T>(prompt: impl FnOnce() -> T) -> T {
    tokio::task::block_in_place(prompt)
}
