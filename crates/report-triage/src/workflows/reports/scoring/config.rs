use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::ReporterRelation;
use super::{CredibilityTier, MAX_FACTOR_SCORE, MAX_TOTAL_SCORE};

/// 2025-01-06T00:00:00Z, first day meals were served.
const DEFAULT_PROGRAM_START_EPOCH_SECS: i64 = 1_736_121_600;

/// Single tunable table backing every weight and threshold the scorer uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub relation_weights: BTreeMap<ReporterRelation, u8>,
    pub location_time: LocationTimePolicy,
    pub narrative: NarrativePolicy,
    pub reporter_history: ReporterHistoryPolicy,
    pub corroboration: CorroborationPolicy,
    pub tiers: TierTable,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        let relation_weights = BTreeMap::from([
            (ReporterRelation::Principal, 3),
            (ReporterRelation::Teacher, 3),
            (ReporterRelation::Supplier, 3),
            (ReporterRelation::Parent, 2),
            (ReporterRelation::Student, 2),
            (ReporterRelation::Community, 1),
            (ReporterRelation::Other, 0),
        ]);

        Self {
            relation_weights,
            location_time: LocationTimePolicy::default(),
            narrative: NarrativePolicy::default(),
            reporter_history: ReporterHistoryPolicy::default(),
            corroboration: CorroborationPolicy::default(),
            tiers: TierTable::default(),
        }
    }
}

impl ScoringPolicy {
    pub fn from_json_file(path: &Path) -> Result<Self, PolicyError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, PolicyError> {
        let policy: ScoringPolicy = serde_json::from_str(raw)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn relation_weight(&self, relation: ReporterRelation) -> u8 {
        self.relation_weights
            .get(&relation)
            .copied()
            .unwrap_or(0)
            .min(MAX_FACTOR_SCORE)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if let Some((relation, weight)) = self
            .relation_weights
            .iter()
            .find(|(_, weight)| **weight > MAX_FACTOR_SCORE)
        {
            return Err(PolicyError::Invalid(format!(
                "relation weight for {relation:?} is {weight}, maximum is {MAX_FACTOR_SCORE}"
            )));
        }

        let narrative = &self.narrative;
        if !(narrative.short_chars < narrative.medium_chars
            && narrative.medium_chars < narrative.long_chars)
        {
            return Err(PolicyError::Invalid(
                "narrative thresholds must be strictly ascending".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&narrative.specific_diversity) {
            return Err(PolicyError::Invalid(
                "narrative specific_diversity must be within [0, 1]".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.reporter_history.trusted_ratio) {
            return Err(PolicyError::Invalid(
                "reporter_history trusted_ratio must be within [0, 1]".to_string(),
            ));
        }

        if self.corroboration.window_hours == 0 || self.corroboration.retention_days == 0 {
            return Err(PolicyError::Invalid(
                "corroboration window and retention must be positive".to_string(),
            ));
        }

        self.tiers.validate()
    }
}

/// Plausibility rules for the incident time relative to submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationTimePolicy {
    pub program_start: DateTime<Utc>,
    pub max_incident_age_days: u32,
}

impl Default for LocationTimePolicy {
    fn default() -> Self {
        Self {
            program_start: DateTime::from_timestamp(DEFAULT_PROGRAM_START_EPOCH_SECS, 0)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            max_incident_age_days: 30,
        }
    }
}

/// Character-count thresholds and the lexical specificity dial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativePolicy {
    pub short_chars: usize,
    pub medium_chars: usize,
    pub long_chars: usize,
    pub specific_diversity: f32,
    pub min_words_for_diversity: usize,
}

impl Default for NarrativePolicy {
    fn default() -> Self {
        Self {
            short_chars: 50,
            medium_chars: 150,
            long_chars: 500,
            specific_diversity: 0.75,
            min_words_for_diversity: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterHistoryPolicy {
    pub trusted_ratio: f32,
    pub trusted_min_resolved: u32,
}

impl Default for ReporterHistoryPolicy {
    fn default() -> Self {
        Self {
            trusted_ratio: 0.8,
            trusted_min_resolved: 3,
        }
    }
}

/// Spatiotemporal window used by the corroboration index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorroborationPolicy {
    pub window_hours: u32,
    pub retention_days: u32,
    pub same_site_radius_meters: f64,
}

impl Default for CorroborationPolicy {
    fn default() -> Self {
        Self {
            window_hours: 48,
            retention_days: 30,
            same_site_radius_meters: 250.0,
        }
    }
}

impl CorroborationPolicy {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.window_hours))
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

/// Total-to-tier mapping. The only place tier thresholds live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierTable {
    pub high_min: u8,
    pub medium_min: u8,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            high_min: 13,
            medium_min: 7,
        }
    }
}

impl TierTable {
    pub fn tier(&self, total: u8) -> CredibilityTier {
        if total >= self.high_min {
            CredibilityTier::High
        } else if total >= self.medium_min {
            CredibilityTier::Medium
        } else {
            CredibilityTier::Low
        }
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.medium_min > self.high_min {
            return Err(PolicyError::Invalid(format!(
                "tier medium_min ({}) must not exceed high_min ({})",
                self.medium_min, self.high_min
            )));
        }
        if self.high_min > MAX_TOTAL_SCORE {
            return Err(PolicyError::Invalid(format!(
                "tier high_min ({}) is unreachable, maximum total is {MAX_TOTAL_SCORE}",
                self.high_min
            )));
        }
        Ok(())
    }
}

/// Failure to load or validate a scoring policy.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("unable to read scoring policy '{path}'")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("scoring policy is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
    #[error("scoring policy rejected: {0}")]
    Invalid(String),
}
