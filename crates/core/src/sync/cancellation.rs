//! Cooperative cancellation for sync runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::errors::{Error, Result};

/// Stop signal checked between sync phases.
///
/// Cloning shares the flag: cancelling any clone cancels them all. A deadline,
/// when set, cancels the token once it passes.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<DateTime<Utc>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: DateTime<Utc>) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn with_deadline_from_now(duration: std::time::Duration) -> Self {
        let duration = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        let deadline = Utc::now()
            .checked_add_signed(duration)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::with_deadline(deadline)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.deadline_passed()
    }

    /// `Err(Error::Cancelled)` once cancelled. `phase` names what would have
    /// run next.
    pub fn checkpoint(&self, phase: &str) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(Error::Cancelled(format!("stop requested before {}", phase)));
        }
        if self.deadline_passed() {
            return Err(Error::Cancelled(format!("deadline exceeded before {}", phase)));
        }
        Ok(())
    }

    fn deadline_passed(&self) -> bool {
        matches!(self.deadline, Some(deadline) if Utc::now() >= deadline)
    }
}
