use std::collections::HashSet;

use super::super::corroboration::CorroborationEntry;
use super::super::domain::{
    EvidenceSummary, LocationResolution, Report, ReportId, ReporterStanding,
};
use super::config::{
    CorroborationPolicy, LocationTimePolicy, NarrativePolicy, ReporterHistoryPolicy,
};

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Factor value plus whether it had to fall back because a collaborator failed.
pub(crate) struct FactorScore {
    pub value: u8,
    pub degraded: bool,
}

impl FactorScore {
    fn exact(value: u8) -> Self {
        Self {
            value,
            degraded: false,
        }
    }

    fn degraded(value: u8) -> Self {
        Self {
            value,
            degraded: true,
        }
    }
}

pub(crate) fn location_time_score(report: &Report, policy: &LocationTimePolicy) -> FactorScore {
    match report.location_resolution {
        LocationResolution::Unknown => FactorScore::degraded(0),
        LocationResolution::Unresolved => FactorScore::exact(0),
        LocationResolution::Resolved if !report.location.has_identifiers() => {
            FactorScore::exact(0)
        }
        LocationResolution::Resolved => {
            let max_age = chrono::Duration::days(i64::from(policy.max_incident_age_days));
            // Measured against submission, not the wall clock, so rescoring stays stable.
            let plausible = report.incident_at <= report.submitted_at
                && report.incident_at >= policy.program_start
                && report.submitted_at - report.incident_at <= max_age;
            FactorScore::exact(if plausible { 3 } else { 1 })
        }
    }
}

pub(crate) fn evidence_score(evidence: &EvidenceSummary) -> u8 {
    match (evidence.count, evidence.timestamp_matches) {
        (0, _) => 0,
        (_, false) => 1,
        (1, true) => 2,
        (_, true) => 3,
    }
}

pub(crate) fn narrative_score(description: &str, policy: &NarrativePolicy) -> u8 {
    let text = description.trim();
    let length = text.chars().count();

    if length < policy.short_chars {
        return 0;
    }
    if has_repeated_sentences(text) {
        return 1;
    }
    if length > policy.long_chars {
        return 3;
    }
    if length >= policy.medium_chars {
        return if is_highly_specific(text, policy) { 3 } else { 2 };
    }
    1
}

fn normalized_words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
}

fn has_repeated_sentences(text: &str) -> bool {
    let mut seen = HashSet::new();
    text.split(['.', '!', '?', '\n'])
        .map(|sentence| normalized_words(sentence).collect::<Vec<_>>().join(" "))
        .filter(|sentence| sentence.split(' ').count() >= 3)
        .any(|sentence| !seen.insert(sentence))
}

/// Concrete details (numbers, times, quantities) with a varied vocabulary.
fn is_highly_specific(text: &str, policy: &NarrativePolicy) -> bool {
    let words: Vec<String> = normalized_words(text).collect();
    if words.len() < policy.min_words_for_diversity {
        return false;
    }

    let unique = words.iter().collect::<HashSet<_>>().len();
    let diversity = unique as f32 / words.len() as f32;
    let has_detail = text.chars().any(|c| c.is_ascii_digit());

    diversity >= policy.specific_diversity && has_detail
}

pub(crate) fn reporter_history_score(
    standing: &ReporterStanding,
    policy: &ReporterHistoryPolicy,
) -> FactorScore {
    let record = match standing {
        ReporterStanding::Anonymous => return FactorScore::exact(1),
        ReporterStanding::Unavailable => return FactorScore::degraded(1),
        ReporterStanding::Known(record) => record,
    };

    if record.total() == 0 {
        return FactorScore::exact(1);
    }
    if record.invalid > record.resolved_valid {
        return FactorScore::exact(0);
    }
    if record.invalid == record.resolved_valid {
        return FactorScore::exact(1);
    }

    let ratio = record.resolved_valid as f32 / record.total() as f32;
    if ratio >= policy.trusted_ratio && record.resolved_valid >= policy.trusted_min_resolved {
        FactorScore::exact(3)
    } else {
        FactorScore::exact(2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchStrength {
    /// Same district, different site.
    Loose,
    /// Same district and same site.
    Strong,
}

pub(crate) struct SimilarityMatches {
    pub value: u8,
    pub corroborating: Vec<ReportId>,
}

pub(crate) fn similarity_score(
    report: &Report,
    candidates: &[CorroborationEntry],
    policy: &CorroborationPolicy,
) -> SimilarityMatches {
    let Some(bucket) = report.location.bucket() else {
        return SimilarityMatches {
            value: 0,
            corroborating: Vec::new(),
        };
    };
    let window = policy.window();

    let mut matches: Vec<(MatchStrength, &CorroborationEntry)> = candidates
        .iter()
        .filter(|candidate| candidate.report_id != report.id)
        .filter(|candidate| candidate.category == report.category && candidate.bucket == bucket)
        .filter(|candidate| (candidate.incident_at - report.incident_at).abs() <= window)
        // A reporter cannot corroborate themselves.
        .filter(|candidate| match (&report.reporter_id, &candidate.reporter_id) {
            (Some(own), Some(other)) => own != other,
            _ => true,
        })
        .map(|candidate| (match_strength(report, candidate, policy), candidate))
        .collect();

    // Strongest first; the most recent incident wins ties.
    matches.sort_by(|(a_strength, a), (b_strength, b)| {
        b_strength
            .cmp(a_strength)
            .then_with(|| b.incident_at.cmp(&a.incident_at))
            .then_with(|| a.report_id.cmp(&b.report_id))
    });

    let strong_sources: HashSet<String> = matches
        .iter()
        .filter(|(strength, _)| *strength == MatchStrength::Strong)
        .map(|(_, candidate)| candidate.independence_key())
        .collect();

    let value = match matches.first() {
        None => 0,
        Some(_) if strong_sources.len() >= 2 => 3,
        Some((MatchStrength::Strong, _)) => 2,
        Some((MatchStrength::Loose, _)) => 1,
    };

    SimilarityMatches {
        value,
        corroborating: matches
            .into_iter()
            .map(|(_, candidate)| candidate.report_id.clone())
            .collect(),
    }
}

fn match_strength(
    report: &Report,
    candidate: &CorroborationEntry,
    policy: &CorroborationPolicy,
) -> MatchStrength {
    if let (Some(own), Some(other)) = (report.location.coordinates(), candidate.coordinates) {
        return if haversine_meters(own, other) <= policy.same_site_radius_meters {
            MatchStrength::Strong
        } else {
            MatchStrength::Loose
        };
    }

    let own_site = normalize_site(&report.location.specific_location);
    if !own_site.is_empty() && own_site == normalize_site(&candidate.specific_location) {
        MatchStrength::Strong
    } else {
        MatchStrength::Loose
    }
}

fn normalize_site(site: &str) -> String {
    normalized_words(site).collect::<Vec<_>>().join(" ")
}

fn haversine_meters((lat1, lon1): (f64, f64), (lat2, lon2): (f64, f64)) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
}
