//! Citizen report triage: credibility scoring, corroboration and the
//! review workflow that carries a report from submission to resolution.

pub mod collaborators;
pub mod corroboration;
pub mod domain;
pub mod ledger;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;
pub mod store;
pub mod workflow;

#[cfg(test)]
mod tests;

pub use collaborators::{Clock, CollaboratorError, EvidenceSource, LocationResolver, SystemClock};
pub use corroboration::{
    CorroborationEntry, CorroborationIndex, InMemoryCorroborationIndex, TimeWindow,
};
pub use domain::{
    Actor, AdminNote, EvidenceSummary, HistoryEntry, LegacyStatus, LocationBucket, LocationKey,
    LocationResolution, Report, ReportCategory, ReportDraft, ReportId, ReportStatus, ReporterId,
    ReporterRelation, ReporterStanding, ReviewQueueEntry,
};
pub use ledger::{LedgerUpdate, ReportOutcome, ReporterTrustLedger, TrustRecord};
pub use repository::{RepositoryError, ReportCommit, ReportStore};
pub use router::{report_router, NoteRequest, QueueParams, StatusChangeRequest};
pub use scoring::{
    CorroborationLookup, CredibilityScore, CredibilityScorer, CredibilityTier, PolicyError,
    ScoreBreakdown, ScoreFactor, ScoringPolicy, TierTable,
};
pub use service::{Collaborators, Deadline, RescoreSummary, TriageError, TriageService};
pub use store::InMemoryReportStore;
pub use workflow::{ReportWorkflow, TransitionPlan, WorkflowError};
