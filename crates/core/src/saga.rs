//! Step log for multi-write batches.
//!
//! Batches are not transactional. Each write is recorded in order so that a
//! failure part way through reports exactly what was applied before it.

use tracing::{debug, warn};
use types::{SagaReport, SagaStep, StepOutcome};

use crate::error::Result;

#[derive(Debug, Default)]
pub struct Saga {
    report: SagaReport,
}

impl Saga {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of one step and pass errors through unchanged.
    pub fn track(&mut self, label: impl Into<String>, result: Result<StepOutcome>) -> Result<()> {
        let label = label.into();
        match result {
            Ok(outcome) => {
                debug!(step = %label, ?outcome, "saga step");
                self.report.steps.push(SagaStep { label, outcome });
                Ok(())
            }
            Err(e) => {
                warn!(step = %label, error = %e, "saga step failed");
                self.report.steps.push(SagaStep {
                    label,
                    outcome: StepOutcome::Failed {
                        message: e.to_string(),
                    },
                });
                Err(e)
            }
        }
    }

    pub fn applied_count(&self) -> usize {
        self.report
            .steps
            .iter()
            .filter(|s| !matches!(s.outcome, StepOutcome::Failed { .. }))
            .count()
    }

    pub fn into_report(self) -> SagaReport {
        self.report
    }
}
