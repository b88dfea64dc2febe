use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use super::collaborators::{
    Clock, CollaboratorError, EvidenceSource, LocationResolver, SystemClock,
};
use super::corroboration::{CorroborationEntry, CorroborationIndex, TimeWindow};
use super::domain::{
    Actor, LocationKey, LocationResolution, Report, ReportDraft, ReportId, ReportStatus,
    ReporterId, ReporterStanding, ReviewQueueEntry,
};
use super::ledger::ReporterTrustLedger;
use super::repository::{RepositoryError, ReportCommit, ReportStore};
use super::scoring::{CorroborationLookup, CredibilityScorer, ScoreFactor, ScoringPolicy};
use super::workflow::{ReportWorkflow, WorkflowError};
use crate::config::TriageSettings;

static REPORT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_report_id() -> ReportId {
    let id = REPORT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ReportId(format!("rpt-{id:06}"))
}

/// Stateless lookups the engine reads from but does not own.
#[derive(Clone)]
pub struct Collaborators {
    pub locations: Arc<dyn LocationResolver>,
    pub evidence: Arc<dyn EvidenceSource>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    pub fn new(locations: Arc<dyn LocationResolver>, evidence: Arc<dyn EvidenceSource>) -> Self {
        Self {
            locations,
            evidence,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Counts from a corroboration follow-up pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RescoreSummary {
    pub examined: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

const DEADLINE_RUNNING: u8 = 0;
const DEADLINE_COMMITTING: u8 = 1;
const DEADLINE_EXPIRED: u8 = 2;

/// Time budget for one service call, shared between the worker running the
/// call and the caller waiting on it.
///
/// A write only reaches the store after [`Deadline::begin_commit`] succeeds,
/// and the caller may only report a timeout after [`Deadline::expire`]
/// succeeds, so the two sides never disagree about whether a write landed.
#[derive(Debug, Clone)]
pub struct Deadline {
    budget: Duration,
    expires_at: Option<Instant>,
    state: Arc<AtomicU8>,
}

impl Deadline {
    pub fn unbounded() -> Self {
        Self {
            budget: Duration::MAX,
            expires_at: None,
            state: Arc::new(AtomicU8::new(DEADLINE_RUNNING)),
        }
    }

    pub fn after(budget: Duration) -> Self {
        Self {
            budget,
            expires_at: Instant::now().checked_add(budget),
            state: Arc::new(AtomicU8::new(DEADLINE_RUNNING)),
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Claim the right to write. Fails once the budget is spent or the
    /// caller has given up.
    pub fn begin_commit(&self) -> Result<(), TriageError> {
        let elapsed = self
            .expires_at
            .map(|expires_at| Instant::now() >= expires_at)
            .unwrap_or(false);
        if elapsed {
            self.expire();
        }

        match self.state.compare_exchange(
            DEADLINE_RUNNING,
            DEADLINE_COMMITTING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(DEADLINE_COMMITTING) => Ok(()),
            Err(_) => Err(TriageError::Timeout(self.budget)),
        }
    }

    /// Hand the claim back after a lost compare-and-swap so the caller can
    /// still time out while the write is re-prepared.
    fn end_commit(&self) {
        let _ = self.state.compare_exchange(
            DEADLINE_COMMITTING,
            DEADLINE_RUNNING,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Give up on the call. Returns `false` when a write is already under way,
    /// in which case its outcome must be awaited instead.
    pub fn expire(&self) -> bool {
        match self.state.compare_exchange(
            DEADLINE_RUNNING,
            DEADLINE_EXPIRED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(current) => current == DEADLINE_EXPIRED,
        }
    }
}

/// Façade composing the scorer, workflow, store and corroboration index.
pub struct TriageService<S, I> {
    store: Arc<S>,
    index: Arc<I>,
    collaborators: Collaborators,
    scorer: Arc<CredibilityScorer>,
    settings: TriageSettings,
    rescore_permits: Arc<Semaphore>,
}

impl<S, I> TriageService<S, I>
where
    S: ReportStore + ReporterTrustLedger + 'static,
    I: CorroborationIndex + 'static,
{
    pub fn new(
        store: Arc<S>,
        index: Arc<I>,
        collaborators: Collaborators,
        policy: ScoringPolicy,
    ) -> Self {
        Self::with_settings(
            store,
            index,
            collaborators,
            policy,
            TriageSettings::default(),
        )
    }

    pub fn with_settings(
        store: Arc<S>,
        index: Arc<I>,
        collaborators: Collaborators,
        policy: ScoringPolicy,
        settings: TriageSettings,
    ) -> Self {
        let rescore_permits = Arc::new(Semaphore::new(settings.rescore_concurrency.max(1)));

        Self {
            store,
            index,
            collaborators,
            scorer: Arc::new(CredibilityScorer::new(policy)),
            settings,
            rescore_permits,
        }
    }

    pub fn scorer(&self) -> &CredibilityScorer {
        &self.scorer
    }

    pub fn settings(&self) -> &TriageSettings {
        &self.settings
    }

    pub fn request_timeout(&self) -> Duration {
        self.settings.request_timeout
    }

    /// Create, score and index a new report in `Pending`.
    pub fn submit(&self, draft: ReportDraft) -> Result<Report, TriageError> {
        self.submit_within(draft, &Deadline::unbounded())
    }

    pub fn submit_within(
        &self,
        draft: ReportDraft,
        deadline: &Deadline,
    ) -> Result<Report, TriageError> {
        let now = self.now();
        if draft.incident_at > now {
            return Err(TriageError::Validation(
                "incident timestamp is later than submission".to_string(),
            ));
        }

        let location_resolution = self.resolve_location(&draft.location);
        let reporter_standing = self.reporter_standing(draft.reporter_id.as_ref());
        let mut report = ReportWorkflow::open(
            next_report_id(),
            draft,
            now,
            location_resolution,
            reporter_standing,
        );
        self.rescore(&mut report, false);

        deadline.begin_commit()?;
        let stored = self.store.insert(report)?;

        if let Some(entry) = CorroborationEntry::from_report(&stored, now) {
            if let Err(error) = self.index.index(entry) {
                warn!(report_id = %stored.id, %error, "report not indexed for corroboration");
            }
        }

        info!(
            report_id = %stored.id,
            category = ?stored.category,
            total = stored.score().total,
            tier = ?stored.score().tier,
            partial = stored.score().breakdown.partial,
            "report submitted"
        );
        Ok(stored)
    }

    pub fn get(&self, report_id: &ReportId) -> Result<Report, TriageError> {
        let report = self
            .store
            .fetch(report_id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(report)
    }

    /// Apply an admin status change through the workflow.
    pub fn update_status(
        &self,
        report_id: &ReportId,
        target: ReportStatus,
        actor: Actor,
        notes: Option<String>,
    ) -> Result<Report, TriageError> {
        self.update_status_within(report_id, target, actor, notes, &Deadline::unbounded())
    }

    pub fn update_status_within(
        &self,
        report_id: &ReportId,
        target: ReportStatus,
        actor: Actor,
        notes: Option<String>,
        deadline: &Deadline,
    ) -> Result<Report, TriageError> {
        let stored = self.commit_with_retry(report_id, deadline, |current| {
            let plan =
                ReportWorkflow::transition(current, target, actor.clone(), notes.clone(), self.now())?;
            let mut report = plan.report;
            if plan.requires_rescore {
                let evidence_degraded = !self.refresh_evidence_inputs(&mut report);
                self.rescore(&mut report, evidence_degraded);
            }

            Ok(Some(
                ReportCommit::new(report, current.version()).with_ledger(plan.ledger),
            ))
        })?;

        info!(
            report_id = %stored.id,
            status = stored.status().tag(),
            history = stored.history().len(),
            "report status changed"
        );
        Ok(stored)
    }

    /// Re-read attachment metadata and fully rescore a non-terminal report.
    pub fn refresh_evidence(&self, report_id: &ReportId) -> Result<Report, TriageError> {
        self.refresh_evidence_within(report_id, &Deadline::unbounded())
    }

    pub fn refresh_evidence_within(
        &self,
        report_id: &ReportId,
        deadline: &Deadline,
    ) -> Result<Report, TriageError> {
        self.commit_with_retry(report_id, deadline, |current| {
            if current.is_terminal() {
                return Err(TriageError::TerminalReport(current.id.clone()));
            }

            let mut report = current.clone();
            let evidence_degraded = !self.refresh_evidence_inputs(&mut report);
            self.rescore(&mut report, evidence_degraded);
            Ok(Some(ReportCommit::new(report, current.version())))
        })
    }

    /// Retry the collaborator lookups behind a partial score.
    pub fn retry_partial_score(&self, report_id: &ReportId) -> Result<Report, TriageError> {
        self.retry_partial_score_within(report_id, &Deadline::unbounded())
    }

    pub fn retry_partial_score_within(
        &self,
        report_id: &ReportId,
        deadline: &Deadline,
    ) -> Result<Report, TriageError> {
        self.commit_with_retry(report_id, deadline, |current| {
            let breakdown = &current.score().breakdown;
            if !breakdown.partial {
                return Ok(None);
            }
            if current.is_terminal() {
                debug!(report_id = %current.id, "terminal report keeps its partial score");
                return Ok(None);
            }

            let mut report = current.clone();
            if report.location_resolution == LocationResolution::Unknown {
                report.location_resolution = self.resolve_location(&report.location);
            }
            if report.reporter_standing == ReporterStanding::Unavailable {
                report.reporter_standing = self.reporter_standing(report.reporter_id.as_ref());
            }
            let evidence_degraded = breakdown.is_degraded(ScoreFactor::Evidence)
                && !self.refresh_evidence_inputs(&mut report);
            self.rescore(&mut report, evidence_degraded);
            Ok(Some(ReportCommit::new(report, current.version())))
        })
    }

    /// Attach an administrative note. Terminal reports accept notes too.
    pub fn annotate(
        &self,
        report_id: &ReportId,
        author: Actor,
        note: String,
    ) -> Result<Report, TriageError> {
        self.annotate_within(report_id, author, note, &Deadline::unbounded())
    }

    pub fn annotate_within(
        &self,
        report_id: &ReportId,
        author: Actor,
        note: String,
        deadline: &Deadline,
    ) -> Result<Report, TriageError> {
        if note.trim().is_empty() {
            return Err(TriageError::Validation("note must not be empty".to_string()));
        }

        self.commit_with_retry(report_id, deadline, |current| {
            let report = ReportWorkflow::annotate(current, author.clone(), note.clone(), self.now());
            Ok(Some(ReportCommit::new(report, current.version())))
        })
    }

    /// Recompute only the similarity factor of open reports that may now
    /// corroborate with `submitted`. Best effort: lost races are skipped.
    pub fn rescore_affected_by_submission(
        &self,
        submitted: &Report,
    ) -> Result<RescoreSummary, TriageError> {
        let candidates = self.corroboration_lookup(submitted)?;
        let mut summary = RescoreSummary::default();

        for candidate in candidates
            .iter()
            .filter(|candidate| candidate.report_id != submitted.id)
        {
            summary.examined += 1;

            let Some(existing) = self.store.fetch(&candidate.report_id)? else {
                summary.skipped += 1;
                continue;
            };
            if existing.is_terminal() {
                summary.skipped += 1;
                continue;
            }

            let similarity = self
                .scorer
                .similarity(&existing, &self.corroboration_lookup(&existing));
            let breakdown = self
                .scorer
                .with_similarity(&existing.score().breakdown, similarity);
            if breakdown == existing.score().breakdown {
                summary.unchanged += 1;
                continue;
            }

            let mut updated = existing.clone();
            updated.score = self.scorer.grade(breakdown);
            match self
                .store
                .commit(ReportCommit::new(updated, existing.version()))
            {
                Ok(_) => summary.updated += 1,
                Err(RepositoryError::VersionMismatch { .. }) => {
                    debug!(report_id = %existing.id, "similarity rescore lost a race; skipping");
                    summary.skipped += 1;
                }
                Err(other) => return Err(other.into()),
            }
        }

        debug!(
            report_id = %submitted.id,
            examined = summary.examined,
            updated = summary.updated,
            "corroboration follow-up finished"
        );
        Ok(summary)
    }

    /// Open reports, most credible first, oldest first within a score.
    pub fn review_queue(&self, limit: usize) -> Result<Vec<ReviewQueueEntry>, TriageError> {
        let mut open = self.store.open_reports()?;
        open.sort_by(|a, b| {
            b.score()
                .tier
                .cmp(&a.score().tier)
                .then_with(|| b.score().total.cmp(&a.score().total))
                .then_with(|| a.submitted_at.cmp(&b.submitted_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(open
            .iter()
            .take(limit)
            .map(Report::queue_entry)
            .collect())
    }

    pub fn expire_corroboration(&self) -> Result<usize, TriageError> {
        let evicted = self.index.expire(self.now())?;
        if evicted > 0 {
            info!(evicted, "expired corroboration entries");
        }
        Ok(evicted)
    }

    /// Permit for a background follow-up; `None` means the pool is saturated
    /// and the follow-up should be dropped.
    pub fn try_reserve_rescore(&self) -> Option<OwnedSemaphorePermit> {
        self.rescore_permits.clone().try_acquire_owned().ok()
    }

    fn now(&self) -> DateTime<Utc> {
        self.collaborators.clock.now()
    }

    fn commit_with_retry<F>(
        &self,
        report_id: &ReportId,
        deadline: &Deadline,
        mut prepare: F,
    ) -> Result<Report, TriageError>
    where
        F: FnMut(&Report) -> Result<Option<ReportCommit>, TriageError>,
    {
        let attempts = self.settings.max_transition_attempts.max(1);

        for attempt in 1..=attempts {
            let current = self.get(report_id)?;
            let Some(commit) = prepare(&current)? else {
                return Ok(current);
            };

            deadline.begin_commit()?;
            match self.store.commit(commit) {
                Ok(stored) => return Ok(stored),
                Err(RepositoryError::VersionMismatch { expected, found }) => {
                    deadline.end_commit();
                    warn!(
                        report_id = %report_id,
                        attempt,
                        expected,
                        found,
                        "concurrent modification detected; retrying against fresh state"
                    );
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(TriageError::ConcurrentModification {
            report_id: report_id.clone(),
            attempts,
        })
    }

    fn resolve_location(&self, location: &LocationKey) -> LocationResolution {
        if !location.has_identifiers() {
            return LocationResolution::Unresolved;
        }

        match self.collaborators.locations.resolve(location) {
            Ok(true) => LocationResolution::Resolved,
            Ok(false) => LocationResolution::Unresolved,
            Err(error) => {
                warn!(%error, "location lookup failed; scoring without it");
                LocationResolution::Unknown
            }
        }
    }

    fn reporter_standing(&self, reporter_id: Option<&ReporterId>) -> ReporterStanding {
        let Some(reporter_id) = reporter_id else {
            return ReporterStanding::Anonymous;
        };

        match self.store.lookup(reporter_id) {
            Ok(record) => ReporterStanding::Known(record),
            Err(error) => {
                warn!(reporter_id = %reporter_id.0, %error, "trust ledger lookup failed");
                ReporterStanding::Unavailable
            }
        }
    }

    /// Returns `false` when the evidence collaborator failed and the old summary was kept.
    fn refresh_evidence_inputs(&self, report: &mut Report) -> bool {
        match self.collaborators.evidence.evidence_summary(&report.id) {
            Ok(Some(summary)) => {
                report.evidence = summary;
                true
            }
            Ok(None) => {
                debug!(report_id = %report.id, "no recorded attachments; keeping submitted summary");
                true
            }
            Err(error) => {
                warn!(report_id = %report.id, %error, "evidence lookup failed; keeping previous summary");
                false
            }
        }
    }

    fn corroboration_lookup(&self, report: &Report) -> CorroborationLookup {
        let Some(bucket) = report.location.bucket() else {
            return Ok(Vec::new());
        };
        let window = TimeWindow::around(
            report.incident_at,
            self.scorer.policy().corroboration.window(),
        );

        self.index
            .query(report.category, &bucket, window)
            .map_err(|error| {
                warn!(report_id = %report.id, %error, "corroboration lookup failed");
                error
            })
    }

    fn rescore(&self, report: &mut Report, evidence_degraded: bool) {
        debug_assert!(
            !report.is_terminal(),
            "terminal report {} must not be rescored",
            report.id
        );

        let lookup = self.corroboration_lookup(report);
        let mut breakdown = self.scorer.score(report, &lookup);
        if evidence_degraded {
            breakdown.mark_degraded(ScoreFactor::Evidence);
        }
        report.score = self.scorer.grade(breakdown);
    }
}

/// Error raised by the triage service.
#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("invalid report draft: {0}")]
    Validation(String),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error("report {report_id} was modified concurrently; gave up after {attempts} attempts")]
    ConcurrentModification { report_id: ReportId, attempts: u32 },
    #[error("report {0} is terminal and can no longer be rescored")]
    TerminalReport(ReportId),
    #[error("triage request timed out after {0:?}")]
    Timeout(Duration),
    #[error("triage task failed: {0}")]
    TaskFailed(String),
}
