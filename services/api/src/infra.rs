use metrics_exporter_prometheus::PrometheusHandle;
use report_triage::workflows::reports::{
    CollaboratorError, Collaborators, EvidenceSource, EvidenceSummary, InMemoryCorroborationIndex,
    InMemoryReportStore, LocationKey, LocationResolver, ReportId, TriageService,
};
use report_triage::{config::TriageSettings, workflows::reports::ScoringPolicy};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

pub(crate) type TriageEngine = TriageService<InMemoryReportStore, InMemoryCorroborationIndex>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Districts known to the bundled reference hierarchy (Kota Bandung).
const BANDUNG_DISTRICTS: [&str; 6] = [
    "32.73.01", "32.73.02", "32.73.03", "32.73.04", "32.73.05", "32.73.06",
];

/// Location resolver backed by a static district catalog.
///
/// A key resolves when the district exists and its identifiers nest, i.e. the
/// district id extends the city id which extends the province id.
#[derive(Debug, Clone)]
pub(crate) struct CatalogLocationResolver {
    districts: HashSet<String>,
}

impl CatalogLocationResolver {
    pub(crate) fn new<I, S>(districts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            districts: districts.into_iter().map(Into::into).collect(),
        }
    }

    pub(crate) fn bandung() -> Self {
        Self::new(BANDUNG_DISTRICTS)
    }
}

impl LocationResolver for CatalogLocationResolver {
    fn resolve(&self, location: &LocationKey) -> Result<bool, CollaboratorError> {
        let (Some(province), Some(city), Some(district)) = (
            location.province_id.as_deref(),
            location.city_id.as_deref(),
            location.district_id.as_deref(),
        ) else {
            return Ok(false);
        };

        let nested = city.starts_with(&format!("{province}."))
            && district.starts_with(&format!("{city}."));
        Ok(nested && self.districts.contains(district))
    }
}

/// Attachment metadata recorded by the upload surface, keyed by report.
#[derive(Default, Clone)]
pub(crate) struct InMemoryEvidenceSource {
    summaries: Arc<Mutex<HashMap<ReportId, EvidenceSummary>>>,
}

impl InMemoryEvidenceSource {
    pub(crate) fn attach(
        &self,
        report_id: &ReportId,
        summary: EvidenceSummary,
    ) -> Result<(), CollaboratorError> {
        let mut guard = self.summaries.lock().map_err(|_| poisoned())?;
        guard.insert(report_id.clone(), summary);
        Ok(())
    }
}

fn poisoned() -> CollaboratorError {
    CollaboratorError::unavailable("evidence store", "mutex poisoned")
}

impl EvidenceSource for InMemoryEvidenceSource {
    fn evidence_summary(
        &self,
        report_id: &ReportId,
    ) -> Result<Option<EvidenceSummary>, CollaboratorError> {
        let guard = self.summaries.lock().map_err(|_| poisoned())?;
        Ok(guard.get(report_id).copied())
    }
}

/// Wire the engine with process-local storage and the bundled collaborators.
pub(crate) fn build_engine(
    policy: ScoringPolicy,
    settings: TriageSettings,
    evidence: Arc<InMemoryEvidenceSource>,
) -> TriageEngine {
    let retention = policy.corroboration.retention();
    let collaborators = Collaborators::new(Arc::new(CatalogLocationResolver::bandung()), evidence);

    TriageService::with_settings(
        Arc::new(InMemoryReportStore::default()),
        Arc::new(InMemoryCorroborationIndex::new(retention)),
        collaborators,
        policy,
        settings,
    )
}
