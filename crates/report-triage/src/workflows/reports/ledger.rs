use serde::{Deserialize, Serialize};

use super::collaborators::CollaboratorError;
use super::domain::ReporterId;

/// Lifetime outcome tally for one reporter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRecord {
    pub resolved_valid: u32,
    pub invalid: u32,
}

impl TrustRecord {
    pub fn total(&self) -> u32 {
        self.resolved_valid.saturating_add(self.invalid)
    }

    pub fn apply(&mut self, outcome: ReportOutcome) {
        match outcome {
            ReportOutcome::ResolvedValid => {
                self.resolved_valid = self.resolved_valid.saturating_add(1)
            }
            ReportOutcome::Invalid => self.invalid = self.invalid.saturating_add(1),
        }
    }
}

/// Terminal outcome credited to a reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportOutcome {
    ResolvedValid,
    Invalid,
}

/// Ledger write that must commit together with the terminal transition producing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerUpdate {
    pub reporter_id: ReporterId,
    pub outcome: ReportOutcome,
}

/// Per-reporter history of resolved-valid and invalid reports.
pub trait ReporterTrustLedger: Send + Sync {
    /// Unknown reporters yield an empty record.
    fn lookup(&self, reporter_id: &ReporterId) -> Result<TrustRecord, CollaboratorError>;

    fn record(
        &self,
        reporter_id: &ReporterId,
        outcome: ReportOutcome,
    ) -> Result<TrustRecord, CollaboratorError>;
}
