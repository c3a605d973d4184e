//! Reporting of errors that were isolated instead of raised.

use log::error;

use crate::errors::Error;

pub trait ErrorReporter: Send + Sync {
    /// `context` says what was being attempted, e.g. "market data import".
    fn report(&self, context: &str, error: &Error);
}

/// Sends reports to the log.
#[derive(Debug, Clone, Default)]
pub struct LogErrorReporter;

impl ErrorReporter for LogErrorReporter {
    fn report(&self, context: &str, err: &Error) {
        error!(
            "{} failed [{:?}]: {}",
            context,
            err.category(),
            err
        );
    }
}
