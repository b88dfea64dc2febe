use chrono::{DateTime, Utc};

use super::domain::{EvidenceSummary, LocationKey, ReportId};

/// Failure of an external lookup the engine depends on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{collaborator} unavailable: {reason}")]
    Unavailable {
        collaborator: &'static str,
        reason: String,
    },
    #[error("{0} lookup timed out")]
    Timeout(&'static str),
}

impl CollaboratorError {
    pub fn unavailable(collaborator: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            collaborator,
            reason: reason.into(),
        }
    }
}

/// Answers whether location identifiers exist in the reference hierarchy.
pub trait LocationResolver: Send + Sync {
    fn resolve(&self, location: &LocationKey) -> Result<bool, CollaboratorError>;
}

/// Reads attachment metadata for a stored report.
pub trait EvidenceSource: Send + Sync {
    /// `Ok(None)` means the source holds nothing for the report, so the
    /// summary captured at submission stays authoritative.
    fn evidence_summary(
        &self,
        report_id: &ReportId,
    ) -> Result<Option<EvidenceSummary>, CollaboratorError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
