use chrono::{DateTime, Utc};

use super::domain::{
    Actor, AdminNote, HistoryEntry, LocationResolution, Report, ReportDraft, ReportId,
    ReportStatus, ReporterStanding,
};
use super::ledger::{LedgerUpdate, ReportOutcome};
use super::scoring::CredibilityScore;

/// Adjacency table of permitted status changes. Terminal states have no exits.
const TRANSITIONS: [(ReportStatus, &[ReportStatus]); 6] = [
    (ReportStatus::Pending, &[ReportStatus::Analyzing]),
    (
        ReportStatus::Analyzing,
        &[
            ReportStatus::NeedsEvidence,
            ReportStatus::Invalid,
            ReportStatus::InProgress,
        ],
    ),
    (ReportStatus::NeedsEvidence, &[ReportStatus::Analyzing]),
    (ReportStatus::InProgress, &[ReportStatus::Resolved]),
    (ReportStatus::Invalid, &[]),
    (ReportStatus::Resolved, &[]),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("cannot move report from {} to {}", .from.tag(), .to.tag())]
    IllegalTransition {
        from: ReportStatus,
        to: ReportStatus,
    },
    #[error("report is {} (terminal) and cannot move to {}", .from.tag(), .to.tag())]
    InvalidTransition {
        from: ReportStatus,
        to: ReportStatus,
    },
}

/// Everything a successful transition wants written, committed as one unit.
#[derive(Debug, Clone)]
pub struct TransitionPlan {
    pub report: Report,
    pub ledger: Option<LedgerUpdate>,
    /// Evidence may have changed, so the whole score must be recomputed.
    pub requires_rescore: bool,
}

/// Status state machine for reports.
pub struct ReportWorkflow;

impl ReportWorkflow {
    pub fn allowed_targets(from: ReportStatus) -> &'static [ReportStatus] {
        TRANSITIONS
            .iter()
            .find(|(status, _)| *status == from)
            .map(|(_, targets)| *targets)
            .unwrap_or(&[])
    }

    pub fn is_allowed(from: ReportStatus, to: ReportStatus) -> bool {
        Self::allowed_targets(from).contains(&to)
    }

    /// Build a freshly submitted report in `Pending` with its opening history entry.
    pub fn open(
        id: ReportId,
        draft: ReportDraft,
        submitted_at: DateTime<Utc>,
        location_resolution: LocationResolution,
        reporter_standing: ReporterStanding,
    ) -> Report {
        Report {
            id,
            category: draft.category,
            incident_at: draft.incident_at,
            submitted_at,
            location: draft.location,
            location_resolution,
            description: draft.description,
            evidence: draft.evidence,
            reporter_id: draft.reporter_id,
            relation: draft.relation,
            reporter_standing,
            status: ReportStatus::Pending,
            score: CredibilityScore::default(),
            history: vec![HistoryEntry {
                from_status: None,
                to_status: ReportStatus::Pending,
                notes: None,
                changed_by: Actor::System,
                timestamp: submitted_at,
            }],
            admin_notes: Vec::new(),
            version: 0,
        }
    }

    pub fn transition(
        report: &Report,
        target: ReportStatus,
        actor: Actor,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TransitionPlan, WorkflowError> {
        let from = report.status;
        if from.is_terminal() {
            return Err(WorkflowError::InvalidTransition { from, to: target });
        }
        if !Self::is_allowed(from, target) {
            return Err(WorkflowError::IllegalTransition { from, to: target });
        }

        let mut next = report.clone();
        next.history.push(HistoryEntry {
            from_status: Some(from),
            to_status: target,
            notes,
            changed_by: actor,
            timestamp: Self::next_timestamp(report, now),
        });
        next.status = target;

        let outcome = match target {
            ReportStatus::Resolved => Some(ReportOutcome::ResolvedValid),
            ReportStatus::Invalid => Some(ReportOutcome::Invalid),
            _ => None,
        };
        let ledger = outcome.and_then(|outcome| {
            report.reporter_id.clone().map(|reporter_id| LedgerUpdate {
                reporter_id,
                outcome,
            })
        });

        Ok(TransitionPlan {
            report: next,
            ledger,
            requires_rescore: from == ReportStatus::NeedsEvidence
                && target == ReportStatus::Analyzing,
        })
    }

    /// Append an administrative note; permitted in every status.
    pub fn annotate(report: &Report, author: Actor, note: String, now: DateTime<Utc>) -> Report {
        let mut next = report.clone();
        next.admin_notes.push(AdminNote {
            author,
            note,
            timestamp: now,
        });
        next
    }

    // History timestamps never go backwards, even if the clock does.
    fn next_timestamp(report: &Report, now: DateTime<Utc>) -> DateTime<Utc> {
        report
            .history
            .last()
            .map(|entry| entry.timestamp.max(now))
            .unwrap_or(now)
    }
}
