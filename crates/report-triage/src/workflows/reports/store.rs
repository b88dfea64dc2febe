use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::collaborators::CollaboratorError;
use super::domain::{Report, ReportId, ReporterId};
use super::ledger::{ReportOutcome, ReporterTrustLedger, TrustRecord};
use super::repository::{RepositoryError, ReportCommit, ReportStore};

#[derive(Debug, Default)]
struct StoreState {
    reports: HashMap<ReportId, Report>,
    ledger: HashMap<ReporterId, TrustRecord>,
}

/// Report records and the reporter trust ledger behind a single lock, so a
/// terminal transition and its ledger credit land together or not at all.
#[derive(Debug, Default)]
pub struct InMemoryReportStore {
    state: Mutex<StoreState>,
}

impl InMemoryReportStore {
    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("report store lock poisoned".to_string()))
    }
}

impl ReportStore for InMemoryReportStore {
    fn insert(&self, report: Report) -> Result<Report, RepositoryError> {
        let mut state = self.lock()?;
        if state.reports.contains_key(&report.id) {
            return Err(RepositoryError::Conflict);
        }
        state.reports.insert(report.id.clone(), report.clone());
        Ok(report)
    }

    fn fetch(&self, id: &ReportId) -> Result<Option<Report>, RepositoryError> {
        let state = self.lock()?;
        Ok(state.reports.get(id).cloned())
    }

    fn commit(&self, commit: ReportCommit) -> Result<Report, RepositoryError> {
        let mut state = self.lock()?;
        let found = state
            .reports
            .get(&commit.report.id)
            .map(|current| current.version)
            .ok_or(RepositoryError::NotFound)?;
        if found != commit.expected_version {
            return Err(RepositoryError::VersionMismatch {
                expected: commit.expected_version,
                found,
            });
        }

        let mut report = commit.report;
        report.version = found + 1;
        if let Some(update) = commit.ledger {
            state
                .ledger
                .entry(update.reporter_id)
                .or_default()
                .apply(update.outcome);
        }
        state.reports.insert(report.id.clone(), report.clone());
        Ok(report)
    }

    fn open_reports(&self) -> Result<Vec<Report>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .reports
            .values()
            .filter(|report| !report.is_terminal())
            .cloned()
            .collect())
    }
}

impl ReporterTrustLedger for InMemoryReportStore {
    fn lookup(&self, reporter_id: &ReporterId) -> Result<TrustRecord, CollaboratorError> {
        let state = self
            .lock()
            .map_err(|err| CollaboratorError::unavailable("trust ledger", err.to_string()))?;
        Ok(state.ledger.get(reporter_id).copied().unwrap_or_default())
    }

    fn record(
        &self,
        reporter_id: &ReporterId,
        outcome: ReportOutcome,
    ) -> Result<TrustRecord, CollaboratorError> {
        let mut state = self
            .lock()
            .map_err(|err| CollaboratorError::unavailable("trust ledger", err.to_string()))?;
        let record = state.ledger.entry(reporter_id.clone()).or_default();
        record.apply(outcome);
        Ok(*record)
    }
}
