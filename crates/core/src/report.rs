//! Per-unit outcome aggregation.
//!
//! Collections and record-set files are independent units of work. A failure
//! in one is recorded here instead of aborting the others; the caller decides
//! at the end whether the run as a whole succeeded.

use crate::{BackupError, Result};

/// Outcomes of a batch of independent units (collections or files).
#[derive(Debug)]
pub struct Report<T> {
    unit: &'static str,
    pub succeeded: Vec<(String, T)>,
    pub failed: Vec<(String, BackupError)>,
}

impl<T> Report<T> {
    /// `unit` names what is being counted, e.g. "collection" or "file".
    pub fn new(unit: &'static str) -> Self {
        Self {
            unit,
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn unit(&self) -> &'static str {
        self.unit
    }

    pub fn record(&mut self, name: impl Into<String>, outcome: Result<T>) {
        let name = name.into();
        match outcome {
            Ok(value) => self.succeeded.push((name, value)),
            Err(err) => {
                tracing::warn!("{} '{}' failed: {}", self.unit, name, err);
                self.failed.push((name, err));
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Take the first systemic failure out of the report, if any.
    pub fn take_systemic(&mut self) -> Option<BackupError> {
        let pos = self.failed.iter().position(|(_, err)| err.is_systemic())?;
        Some(self.failed.remove(pos).1)
    }

    /// Describe the failures without consuming the report.
    pub fn partial_failure(&self) -> Option<BackupError> {
        if self.failed.is_empty() {
            return None;
        }
        Some(BackupError::PartialFailure {
            unit: self.unit,
            succeeded: self.succeeded.len(),
            failed: self
                .failed
                .iter()
                .map(|(name, err)| format!("{name}: {err}"))
                .collect(),
        })
    }

    /// `Ok(self)` when every unit succeeded, `PartialFailure` otherwise.
    pub fn into_result(self) -> Result<Self> {
        match self.partial_failure() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "{} {}(s) succeeded, {} failed",
            self.succeeded.len(),
            self.unit,
            self.failed.len()
        )
    }
}
