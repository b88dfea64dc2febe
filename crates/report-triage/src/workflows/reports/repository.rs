use super::domain::{Report, ReportId};
use super::ledger::LedgerUpdate;

/// Compare-and-swap write of a report.
///
/// The stored report must still carry `expected_version`; the optional ledger
/// update is applied in the same atomic step as the report write.
#[derive(Debug, Clone)]
pub struct ReportCommit {
    pub report: Report,
    pub expected_version: u64,
    pub ledger: Option<LedgerUpdate>,
}

impl ReportCommit {
    pub fn new(report: Report, expected_version: u64) -> Self {
        Self {
            report,
            expected_version,
            ledger: None,
        }
    }

    pub fn with_ledger(mut self, ledger: Option<LedgerUpdate>) -> Self {
        self.ledger = ledger;
        self
    }
}

/// Storage abstraction so the service module can be exercised in isolation.
pub trait ReportStore: Send + Sync {
    fn insert(&self, report: Report) -> Result<Report, RepositoryError>;
    fn fetch(&self, id: &ReportId) -> Result<Option<Report>, RepositoryError>;
    /// Returns the stored report with its bumped version.
    fn commit(&self, commit: ReportCommit) -> Result<Report, RepositoryError>;
    fn open_reports(&self) -> Result<Vec<Report>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("report already exists")]
    Conflict,
    #[error("report not found")]
    NotFound,
    #[error("report version changed (expected {expected}, found {found})")]
    VersionMismatch { expected: u64, found: u64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
