use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::reports::collaborators::{
    Clock, CollaboratorError, EvidenceSource, LocationResolver,
};
use crate::workflows::reports::corroboration::{
    CorroborationEntry, CorroborationIndex, InMemoryCorroborationIndex, TimeWindow,
};
use crate::workflows::reports::domain::{
    Actor, EvidenceSummary, LocationBucket, LocationKey, LocationResolution, Report,
    ReportCategory, ReportDraft, ReportId, ReportStatus, ReporterId, ReporterRelation,
    ReporterStanding,
};
use crate::workflows::reports::ledger::{ReportOutcome, ReporterTrustLedger, TrustRecord};
use crate::workflows::reports::repository::{RepositoryError, ReportCommit, ReportStore};
use crate::workflows::reports::store::InMemoryReportStore;
use crate::workflows::reports::workflow::ReportWorkflow;
use crate::config::TriageSettings;
use crate::workflows::reports::{Collaborators, ScoringPolicy, TriageService};

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0)
        .single()
        .expect("valid fixture instant")
}

pub(super) fn location() -> LocationKey {
    LocationKey {
        province_id: Some("32".to_string()),
        city_id: Some("32.73".to_string()),
        district_id: Some("32.73.01".to_string()),
        specific_location: "SDN 1 Cibeunying".to_string(),
        latitude: None,
        longitude: None,
    }
}

pub(super) fn bucket() -> LocationBucket {
    location().bucket().expect("fixture location has identifiers")
}

/// Distinct sentences so the text never trips repeated-sentence detection.
pub(super) fn narrative(min_chars: usize) -> String {
    let mut text = String::new();
    let mut index = 1;
    while text.chars().count() < min_chars {
        text.push_str(&format!(
            "Observation {index}: students in class {index} reported stomach pain after lunch. "
        ));
        index += 1;
    }
    text.trim_end().to_string()
}

pub(super) fn draft() -> ReportDraft {
    ReportDraft {
        category: ReportCategory::Poisoning,
        incident_at: now() - Duration::days(1),
        location: location(),
        description: narrative(600),
        evidence: EvidenceSummary {
            count: 2,
            timestamp_matches: true,
        },
        reporter_id: Some(ReporterId("teacher-ani".to_string())),
        relation: ReporterRelation::Teacher,
    }
}

pub(super) fn anonymous_draft() -> ReportDraft {
    ReportDraft {
        category: ReportCategory::Quality,
        incident_at: now() - Duration::hours(6),
        location: LocationKey {
            specific_location: "somewhere".to_string(),
            ..LocationKey::default()
        },
        description: "the rice smelled off".to_string(),
        evidence: EvidenceSummary::default(),
        reporter_id: None,
        relation: ReporterRelation::Other,
    }
}

/// Report built directly through the workflow, for scorer tests.
pub(super) fn report_from(
    id: &str,
    draft: ReportDraft,
    resolution: LocationResolution,
    standing: ReporterStanding,
) -> Report {
    ReportWorkflow::open(ReportId(id.to_string()), draft, now(), resolution, standing)
}

pub(super) fn first_time_standing() -> ReporterStanding {
    ReporterStanding::Known(TrustRecord::default())
}

pub(super) fn entry(
    id: &str,
    reporter: Option<&str>,
    site: &str,
    incident_at: DateTime<Utc>,
) -> CorroborationEntry {
    CorroborationEntry {
        report_id: ReportId(id.to_string()),
        reporter_id: reporter.map(|r| ReporterId(r.to_string())),
        category: ReportCategory::Poisoning,
        bucket: bucket(),
        specific_location: site.to_string(),
        coordinates: None,
        incident_at,
        indexed_at: now(),
    }
}

pub(super) struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub(super) fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(super) fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock mutex poisoned") = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

#[derive(Default)]
pub(super) struct StubLocations {
    unknown_locations: AtomicBool,
    offline: AtomicBool,
    delay: Mutex<Option<StdDuration>>,
}

impl StubLocations {
    pub(super) fn set_delay(&self, delay: StdDuration) {
        *self.delay.lock().expect("delay mutex poisoned") = Some(delay);
    }

    pub(super) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(super) fn set_unknown(&self, unknown: bool) {
        self.unknown_locations.store(unknown, Ordering::SeqCst);
    }
}

impl LocationResolver for StubLocations {
    fn resolve(&self, _location: &LocationKey) -> Result<bool, CollaboratorError> {
        let delay = *self.delay.lock().expect("delay mutex poisoned");
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(CollaboratorError::unavailable("location resolver", "offline"));
        }
        Ok(!self.unknown_locations.load(Ordering::SeqCst))
    }
}

/// Holds nothing until a test records a summary or an outage.
pub(super) struct StubEvidence {
    summary: Mutex<Result<Option<EvidenceSummary>, CollaboratorError>>,
}

impl Default for StubEvidence {
    fn default() -> Self {
        Self {
            summary: Mutex::new(Ok(None)),
        }
    }
}

impl StubEvidence {
    pub(super) fn set(&self, summary: Result<EvidenceSummary, CollaboratorError>) {
        *self.summary.lock().expect("evidence mutex poisoned") = summary.map(Some);
    }
}

impl EvidenceSource for StubEvidence {
    fn evidence_summary(
        &self,
        _report_id: &ReportId,
    ) -> Result<Option<EvidenceSummary>, CollaboratorError> {
        self.summary.lock().expect("evidence mutex poisoned").clone()
    }
}

pub(super) struct OfflineIndex;

impl CorroborationIndex for OfflineIndex {
    fn index(&self, _entry: CorroborationEntry) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::Timeout("corroboration index"))
    }

    fn query(
        &self,
        _category: ReportCategory,
        _bucket: &LocationBucket,
        _window: TimeWindow,
    ) -> Result<Vec<CorroborationEntry>, CollaboratorError> {
        Err(CollaboratorError::Timeout("corroboration index"))
    }

    fn expire(&self, _now: DateTime<Utc>) -> Result<usize, CollaboratorError> {
        Err(CollaboratorError::Timeout("corroboration index"))
    }
}

/// Store where another admin sneaks in a write right before ours.
#[derive(Default)]
pub(super) struct ContendedStore {
    pub(super) inner: InMemoryReportStore,
    interfering: Mutex<Vec<ReportStatus>>,
    always_conflict: AtomicBool,
    pub(super) commits_attempted: AtomicU32,
}

impl ContendedStore {
    pub(super) fn interfere_with(&self, status: ReportStatus) {
        self.interfering
            .lock()
            .expect("interference mutex poisoned")
            .push(status);
    }

    pub(super) fn always_conflict(&self) {
        self.always_conflict.store(true, Ordering::SeqCst);
    }
}

impl ReportStore for ContendedStore {
    fn insert(&self, report: Report) -> Result<Report, RepositoryError> {
        self.inner.insert(report)
    }

    fn fetch(&self, id: &ReportId) -> Result<Option<Report>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn commit(&self, commit: ReportCommit) -> Result<Report, RepositoryError> {
        self.commits_attempted.fetch_add(1, Ordering::SeqCst);
        if self.always_conflict.load(Ordering::SeqCst) {
            return Err(RepositoryError::VersionMismatch {
                expected: commit.expected_version,
                found: commit.expected_version + 1,
            });
        }

        let interference = self
            .interfering
            .lock()
            .expect("interference mutex poisoned")
            .pop();
        if let Some(status) = interference {
            let current = self
                .inner
                .fetch(&commit.report.id)?
                .ok_or(RepositoryError::NotFound)?;
            let plan = ReportWorkflow::transition(
                &current,
                status,
                Actor::Admin("rival".to_string()),
                None,
                now(),
            )
            .expect("rival transition is legal");
            self.inner.commit(
                ReportCommit::new(plan.report, current.version()).with_ledger(plan.ledger),
            )?;
        }

        self.inner.commit(commit)
    }

    fn open_reports(&self) -> Result<Vec<Report>, RepositoryError> {
        self.inner.open_reports()
    }
}

impl ReporterTrustLedger for ContendedStore {
    fn lookup(&self, reporter_id: &ReporterId) -> Result<TrustRecord, CollaboratorError> {
        self.inner.lookup(reporter_id)
    }

    fn record(
        &self,
        reporter_id: &ReporterId,
        outcome: ReportOutcome,
    ) -> Result<TrustRecord, CollaboratorError> {
        self.inner.record(reporter_id, outcome)
    }
}

pub(super) struct Harness<S, I> {
    pub(super) service: TriageService<S, I>,
    pub(super) store: Arc<S>,
    pub(super) index: Arc<I>,
    pub(super) clock: Arc<FixedClock>,
    pub(super) locations: Arc<StubLocations>,
    pub(super) evidence: Arc<StubEvidence>,
}

pub(super) fn harness_with<S, I>(store: S, index: I) -> Harness<S, I>
where
    S: ReportStore + ReporterTrustLedger + 'static,
    I: CorroborationIndex + 'static,
{
    harness_with_settings(store, index, TriageSettings::default())
}

pub(super) fn harness_with_settings<S, I>(
    store: S,
    index: I,
    settings: TriageSettings,
) -> Harness<S, I>
where
    S: ReportStore + ReporterTrustLedger + 'static,
    I: CorroborationIndex + 'static,
{
    let store = Arc::new(store);
    let index = Arc::new(index);
    let clock = Arc::new(FixedClock::at(now()));
    let locations = Arc::new(StubLocations::default());
    let evidence = Arc::new(StubEvidence::default());
    let collaborators = Collaborators::new(locations.clone(), evidence.clone())
        .with_clock(clock.clone());
    let service = TriageService::with_settings(
        store.clone(),
        index.clone(),
        collaborators,
        ScoringPolicy::default(),
        settings,
    );

    Harness {
        service,
        store,
        index,
        clock,
        locations,
        evidence,
    }
}

pub(super) fn harness() -> Harness<InMemoryReportStore, InMemoryCorroborationIndex> {
    harness_with(InMemoryReportStore::default(), fresh_index())
}

pub(super) fn fresh_index() -> InMemoryCorroborationIndex {
    InMemoryCorroborationIndex::new(ScoringPolicy::default().corroboration.retention())
}

pub(super) fn admin() -> Actor {
    Actor::Admin("admin-rina".to_string())
}

/// Walk a report through the given statuses, returning the final state.
pub(super) fn advance<S, I>(
    service: &TriageService<S, I>,
    id: &ReportId,
    path: &[ReportStatus],
) -> Report
where
    S: ReportStore + ReporterTrustLedger + 'static,
    I: CorroborationIndex + 'static,
{
    let mut report = service.get(id).expect("report exists");
    for status in path {
        report = service
            .update_status(id, *status, admin(), None)
            .unwrap_or_else(|err| panic!("transition to {status:?} failed: {err}"));
    }
    report
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
