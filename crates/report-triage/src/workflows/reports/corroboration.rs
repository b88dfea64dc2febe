use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::collaborators::CollaboratorError;
use super::domain::{LocationBucket, Report, ReportCategory, ReportId, ReporterId};

/// Lightweight projection of a report kept for cluster lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorroborationEntry {
    pub report_id: ReportId,
    pub reporter_id: Option<ReporterId>,
    pub category: ReportCategory,
    pub bucket: LocationBucket,
    pub specific_location: String,
    pub coordinates: Option<(f64, f64)>,
    pub incident_at: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
}

impl CorroborationEntry {
    /// Returns `None` when the report lacks district identifiers and cannot be bucketed.
    pub fn from_report(report: &Report, indexed_at: DateTime<Utc>) -> Option<Self> {
        Some(Self {
            report_id: report.id.clone(),
            reporter_id: report.reporter_id.clone(),
            category: report.category,
            bucket: report.location.bucket()?,
            specific_location: report.location.specific_location.clone(),
            coordinates: report.location.coordinates(),
            incident_at: report.incident_at,
            indexed_at,
        })
    }

    /// Anonymous reports each count as their own independent source.
    pub(crate) fn independence_key(&self) -> String {
        match &self.reporter_id {
            Some(reporter) => format!("reporter:{}", reporter.0),
            None => format!("report:{}", self.report_id.0),
        }
    }
}

/// Closed interval of incident instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Saturates at the representable range instead of overflowing.
    pub fn around(center: DateTime<Utc>, radius: Duration) -> Self {
        Self {
            start: center
                .checked_sub_signed(radius)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            end: center
                .checked_add_signed(radius)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// Spatiotemporal index of recent reports.
///
/// Lookups are approximate by district bucket; callers refine the candidates.
pub trait CorroborationIndex: Send + Sync {
    /// Inserting the same report twice replaces the earlier entry.
    fn index(&self, entry: CorroborationEntry) -> Result<(), CollaboratorError>;

    fn query(
        &self,
        category: ReportCategory,
        bucket: &LocationBucket,
        window: TimeWindow,
    ) -> Result<Vec<CorroborationEntry>, CollaboratorError>;

    /// Evict entries past retention, returning how many were removed.
    fn expire(&self, now: DateTime<Utc>) -> Result<usize, CollaboratorError>;
}

type BucketKey = (ReportCategory, LocationBucket);

/// Process-local index keyed by category and district bucket.
#[derive(Debug)]
pub struct InMemoryCorroborationIndex {
    retention: Duration,
    buckets: RwLock<HashMap<BucketKey, Vec<CorroborationEntry>>>,
}

impl InMemoryCorroborationIndex {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.buckets
            .read()
            .map(|buckets| buckets.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> CollaboratorError {
    CollaboratorError::unavailable("corroboration index", "lock poisoned")
}

impl CorroborationIndex for InMemoryCorroborationIndex {
    fn index(&self, entry: CorroborationEntry) -> Result<(), CollaboratorError> {
        let mut buckets = self.buckets.write().map_err(|_| poisoned())?;
        let entries = buckets
            .entry((entry.category, entry.bucket.clone()))
            .or_default();
        entries.retain(|existing| existing.report_id != entry.report_id);
        entries.push(entry);
        Ok(())
    }

    fn query(
        &self,
        category: ReportCategory,
        bucket: &LocationBucket,
        window: TimeWindow,
    ) -> Result<Vec<CorroborationEntry>, CollaboratorError> {
        let buckets = self.buckets.read().map_err(|_| poisoned())?;
        let mut matches: Vec<CorroborationEntry> = buckets
            .get(&(category, bucket.clone()))
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| window.contains(entry.incident_at))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        matches.sort_by(|a, b| b.incident_at.cmp(&a.incident_at));
        Ok(matches)
    }

    fn expire(&self, now: DateTime<Utc>) -> Result<usize, CollaboratorError> {
        let cutoff = now
            .checked_sub_signed(self.retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut buckets = self.buckets.write().map_err(|_| poisoned())?;

        let mut evicted = 0;
        buckets.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|entry| entry.indexed_at >= cutoff);
            evicted += before - entries.len();
            !entries.is_empty()
        });

        debug!(evicted, %cutoff, "corroboration index expiry sweep");
        Ok(evicted)
    }
}
