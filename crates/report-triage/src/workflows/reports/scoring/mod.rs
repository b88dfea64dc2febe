mod config;
mod rules;

pub use config::{
    CorroborationPolicy, LocationTimePolicy, NarrativePolicy, PolicyError, ReporterHistoryPolicy,
    ScoringPolicy, TierTable,
};

use serde::{Deserialize, Serialize};

use super::collaborators::CollaboratorError;
use super::corroboration::CorroborationEntry;
use super::domain::{Report, ReportId};

pub const MAX_FACTOR_SCORE: u8 = 3;
pub const MAX_TOTAL_SCORE: u8 = MAX_FACTOR_SCORE * 6;

/// Result of asking the corroboration index for candidates around a report.
pub type CorroborationLookup = Result<Vec<CorroborationEntry>, CollaboratorError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFactor {
    Relation,
    LocationTime,
    Evidence,
    Narrative,
    ReporterHistory,
    Similarity,
}

/// Six-factor credibility breakdown, each factor within `[0, 3]`.
///
/// `partial` is set whenever a factor fell back to its neutral value because a
/// collaborator could not be reached; `degraded` names those factors so the
/// caller knows what to retry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub relation: u8,
    pub location_time: u8,
    pub evidence: u8,
    pub narrative: u8,
    pub reporter_history: u8,
    pub similarity: u8,
    pub partial: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<ScoreFactor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corroborating_reports: Vec<ReportId>,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u8 {
        self.factors().iter().map(|(_, value)| *value).sum()
    }

    pub fn factors(&self) -> [(ScoreFactor, u8); 6] {
        [
            (ScoreFactor::Relation, self.relation),
            (ScoreFactor::LocationTime, self.location_time),
            (ScoreFactor::Evidence, self.evidence),
            (ScoreFactor::Narrative, self.narrative),
            (ScoreFactor::ReporterHistory, self.reporter_history),
            (ScoreFactor::Similarity, self.similarity),
        ]
    }

    pub fn is_degraded(&self, factor: ScoreFactor) -> bool {
        self.degraded.contains(&factor)
    }

    pub(crate) fn mark_degraded(&mut self, factor: ScoreFactor) {
        self.mark(factor, true);
    }

    fn mark(&mut self, factor: ScoreFactor, degraded: bool) {
        self.degraded.retain(|existing| *existing != factor);
        if degraded {
            self.degraded.push(factor);
        }
        self.partial = !self.degraded.is_empty();
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CredibilityTier {
    #[default]
    Low,
    Medium,
    High,
}

/// Breakdown with its aggregate total and derived tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredibilityScore {
    pub breakdown: ScoreBreakdown,
    pub total: u8,
    pub tier: CredibilityTier,
}

/// Similarity factor computed on its own for corroboration follow-ups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimilarityScore {
    pub value: u8,
    pub corroborating_reports: Vec<ReportId>,
    pub degraded: bool,
}

/// Stateless scorer applying a [`ScoringPolicy`] to a report.
///
/// Scoring is a pure function of the report and the corroboration lookup: the
/// reporter's ledger standing is read from the snapshot stored on the report.
#[derive(Debug, Clone)]
pub struct CredibilityScorer {
    policy: ScoringPolicy,
}

impl CredibilityScorer {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    pub fn score(&self, report: &Report, corroboration: &CorroborationLookup) -> ScoreBreakdown {
        let location_time = rules::location_time_score(report, &self.policy.location_time);
        let reporter_history =
            rules::reporter_history_score(&report.reporter_standing, &self.policy.reporter_history);
        let similarity = self.similarity(report, corroboration);

        let mut breakdown = ScoreBreakdown {
            relation: self.policy.relation_weight(report.relation),
            location_time: location_time.value,
            evidence: rules::evidence_score(&report.evidence),
            narrative: rules::narrative_score(&report.description, &self.policy.narrative),
            reporter_history: reporter_history.value,
            similarity: similarity.value,
            partial: false,
            degraded: Vec::new(),
            corroborating_reports: similarity.corroborating_reports,
        };
        breakdown.mark(ScoreFactor::LocationTime, location_time.degraded);
        breakdown.mark(ScoreFactor::ReporterHistory, reporter_history.degraded);
        breakdown.mark(ScoreFactor::Similarity, similarity.degraded);
        breakdown
    }

    pub fn similarity(
        &self,
        report: &Report,
        corroboration: &CorroborationLookup,
    ) -> SimilarityScore {
        match corroboration {
            Ok(candidates) => {
                let matches =
                    rules::similarity_score(report, candidates, &self.policy.corroboration);
                SimilarityScore {
                    value: matches.value,
                    corroborating_reports: matches.corroborating,
                    degraded: false,
                }
            }
            Err(_) => SimilarityScore {
                value: 0,
                corroborating_reports: Vec::new(),
                degraded: true,
            },
        }
    }

    /// Replace only the similarity factor of an existing breakdown.
    pub fn with_similarity(
        &self,
        breakdown: &ScoreBreakdown,
        similarity: SimilarityScore,
    ) -> ScoreBreakdown {
        let mut updated = breakdown.clone();
        updated.similarity = similarity.value;
        updated.corroborating_reports = similarity.corroborating_reports;
        updated.mark(ScoreFactor::Similarity, similarity.degraded);
        updated
    }

    pub fn tier(&self, total: u8) -> CredibilityTier {
        self.policy.tiers.tier(total)
    }

    pub fn grade(&self, breakdown: ScoreBreakdown) -> CredibilityScore {
        let total = breakdown.total();
        CredibilityScore {
            tier: self.tier(total),
            total,
            breakdown,
        }
    }
}
