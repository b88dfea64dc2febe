use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ledger::TrustRecord;
use super::scoring::{CredibilityScore, CredibilityTier};

/// Identifier wrapper for submitted reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReportId(pub String);

impl std::fmt::Display for ReportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a registered reporter. Anonymous reports carry none.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReporterId(pub String);

/// Who caused a history entry or note to be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    System,
    Admin(String),
}

/// Incident categories accepted by intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportCategory {
    Poisoning,
    Kitchen,
    Quality,
    Policy,
    Implementation,
    Social,
}

/// Declared relationship between the reporter and the feeding program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReporterRelation {
    Parent,
    Teacher,
    Principal,
    Supplier,
    Student,
    Community,
    Other,
}

/// Canonical six-state workflow vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Analyzing,
    NeedsEvidence,
    Invalid,
    InProgress,
    Resolved,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 6] = [
        ReportStatus::Pending,
        ReportStatus::Analyzing,
        ReportStatus::NeedsEvidence,
        ReportStatus::Invalid,
        ReportStatus::InProgress,
        ReportStatus::Resolved,
    ];

    pub const fn tag(self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Analyzing => "analyzing",
            ReportStatus::NeedsEvidence => "needs_evidence",
            ReportStatus::Invalid => "invalid",
            ReportStatus::InProgress => "in_progress",
            ReportStatus::Resolved => "resolved",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, ReportStatus::Invalid | ReportStatus::Resolved)
    }
}

/// Deprecated five-state vocabulary still emitted by older surfaces.
///
/// It is a view over [`ReportStatus`], never a second state machine: reads are
/// mapped onto the canonical states and writes always go through the canonical
/// workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyStatus {
    Pending,
    Verified,
    InProgress,
    Resolved,
    Rejected,
}

impl From<ReportStatus> for LegacyStatus {
    fn from(status: ReportStatus) -> Self {
        match status {
            ReportStatus::Pending | ReportStatus::Analyzing | ReportStatus::NeedsEvidence => {
                LegacyStatus::Pending
            }
            ReportStatus::InProgress => LegacyStatus::InProgress,
            ReportStatus::Resolved => LegacyStatus::Resolved,
            ReportStatus::Invalid => LegacyStatus::Rejected,
        }
    }
}

/// Composite location reference pointing into the province/city/district hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationKey {
    pub province_id: Option<String>,
    pub city_id: Option<String>,
    pub district_id: Option<String>,
    #[serde(default)]
    pub specific_location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl LocationKey {
    /// All three hierarchy identifiers are present and non-blank.
    pub fn has_identifiers(&self) -> bool {
        [&self.province_id, &self.city_id, &self.district_id]
            .iter()
            .all(|id| id.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false))
    }

    /// District-level bucket used for corroboration lookups.
    pub fn bucket(&self) -> Option<LocationBucket> {
        if !self.has_identifiers() {
            return None;
        }

        Some(LocationBucket {
            province_id: self.province_id.clone().unwrap_or_default(),
            city_id: self.city_id.clone().unwrap_or_default(),
            district_id: self.district_id.clone().unwrap_or_default(),
        })
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationBucket {
    pub province_id: String,
    pub city_id: String,
    pub district_id: String,
}

/// Outcome of asking the location collaborator about a [`LocationKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationResolution {
    Resolved,
    Unresolved,
    /// The resolver could not be reached; the score is partial until retried.
    Unknown,
}

/// Attachment facts supplied by the file-metadata collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSummary {
    pub count: u32,
    pub timestamp_matches: bool,
}

/// Ledger snapshot captured when the report was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReporterStanding {
    Anonymous,
    Known(TrustRecord),
    Unavailable,
}

/// Validated intake payload handed over by the API layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDraft {
    pub category: ReportCategory,
    pub incident_at: DateTime<Utc>,
    pub location: LocationKey,
    pub description: String,
    #[serde(default)]
    pub evidence: EvidenceSummary,
    #[serde(default)]
    pub reporter_id: Option<ReporterId>,
    pub relation: ReporterRelation,
}

/// Immutable audit record of one status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub from_status: Option<ReportStatus>,
    pub to_status: ReportStatus,
    pub notes: Option<String>,
    pub changed_by: Actor,
    pub timestamp: DateTime<Utc>,
}

/// Free-form administrative annotation. Allowed in every status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminNote {
    pub author: Actor,
    pub note: String,
    pub timestamp: DateTime<Utc>,
}

/// A citizen-submitted incident report together with its triage state.
///
/// Status, history and score are only ever changed by the workflow and the
/// triage service, so they are exposed read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub category: ReportCategory,
    pub incident_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub location: LocationKey,
    pub location_resolution: LocationResolution,
    pub description: String,
    pub evidence: EvidenceSummary,
    pub reporter_id: Option<ReporterId>,
    pub relation: ReporterRelation,
    pub reporter_standing: ReporterStanding,
    pub(crate) status: ReportStatus,
    pub(crate) score: CredibilityScore,
    pub(crate) history: Vec<HistoryEntry>,
    #[serde(default)]
    pub(crate) admin_notes: Vec<AdminNote>,
    pub(crate) version: u64,
}

impl Report {
    pub fn status(&self) -> ReportStatus {
        self.status
    }

    pub fn legacy_status(&self) -> LegacyStatus {
        self.status.into()
    }

    pub fn score(&self) -> &CredibilityScore {
        &self.score
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn admin_notes(&self) -> &[AdminNote] {
        &self.admin_notes
    }

    /// Optimistic-concurrency token bumped by every committed write.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn queue_entry(&self) -> ReviewQueueEntry {
        ReviewQueueEntry {
            report_id: self.id.clone(),
            category: self.category,
            status: self.status,
            tier: self.score.tier,
            total: self.score.total,
            partial: self.score.breakdown.partial,
            submitted_at: self.submitted_at,
        }
    }
}

/// Projection listed in the admin review queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewQueueEntry {
    pub report_id: ReportId,
    pub category: ReportCategory,
    pub status: ReportStatus,
    pub tier: CredibilityTier,
    pub total: u8,
    pub partial: bool,
    pub submitted_at: DateTime<Utc>,
}
