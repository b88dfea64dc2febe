use crate::infra::{build_engine, InMemoryEvidenceSource, TriageEngine};
use chrono::{Duration, Utc};
use clap::Args;
use report_triage::config::TriageSettings;
use report_triage::error::AppError;
use report_triage::workflows::reports::{
    Actor, EvidenceSummary, LocationKey, Report, ReportCategory, ReportDraft, ReportStatus,
    ReporterId, ReporterRelation, ScoringPolicy, TriageError,
};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Stop after the review queue instead of walking reports to a verdict.
    #[arg(long)]
    pub(crate) skip_resolution: bool,
    /// Print the final state of the first report as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

const TEACHER_ACCOUNT: &str =
    "At 11:40 roughly 23 pupils from class 4B vomited shortly after eating the rice and \
     chicken delivered by the central kitchen on Jalan Merdeka. The school nurse called \
     puskesmas Cibeunying, whose staff arrived within 30 minutes; two children were referred \
     to the district hospital for observation. Leftover portions were sealed and kept in the \
     staff room fridge for sampling.";

const PARENT_ACCOUNT: &str =
    "My son came home from SDN 1 Cibeunying with stomach cramps and fever after the free \
     lunch today. Three other parents in our class group chat said their children were sick \
     too.";

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let evidence = Arc::new(InMemoryEvidenceSource::default());
    let engine = build_engine(
        ScoringPolicy::default(),
        TriageSettings::default(),
        evidence.clone(),
    );
    let incident_at = Utc::now() - Duration::hours(3);

    println!("Report triage demo");
    let teacher = submit(
        &engine,
        "teacher",
        ReportDraft {
            category: ReportCategory::Poisoning,
            incident_at,
            location: school_location(),
            description: TEACHER_ACCOUNT.to_string(),
            evidence: EvidenceSummary {
                count: 2,
                timestamp_matches: true,
            },
            reporter_id: Some(ReporterId("teacher-ani".to_string())),
            relation: ReporterRelation::Teacher,
        },
    )?;
    let parent = submit(
        &engine,
        "parent",
        ReportDraft {
            category: ReportCategory::Poisoning,
            incident_at: incident_at + Duration::minutes(50),
            location: school_location(),
            description: PARENT_ACCOUNT.to_string(),
            evidence: EvidenceSummary {
                count: 1,
                timestamp_matches: true,
            },
            reporter_id: Some(ReporterId("parent-budi".to_string())),
            relation: ReporterRelation::Parent,
        },
    )?;
    let anonymous = submit(
        &engine,
        "anonymous",
        ReportDraft {
            category: ReportCategory::Quality,
            incident_at,
            location: LocationKey {
                specific_location: "somewhere in Bandung".to_string(),
                ..LocationKey::default()
            },
            description: "the food is always bad".to_string(),
            evidence: EvidenceSummary::default(),
            reporter_id: None,
            relation: ReporterRelation::Other,
        },
    )?;

    print_queue(&engine)?;
    if args.skip_resolution {
        return Ok(());
    }

    println!("\nWalking {} through review", teacher.id);
    let admin = Actor::Admin("admin-rina".to_string());
    engine.update_status(&teacher.id, ReportStatus::Analyzing, admin.clone(), None)?;
    engine.update_status(
        &teacher.id,
        ReportStatus::NeedsEvidence,
        admin.clone(),
        Some("please upload photos of the sealed portions".to_string()),
    )?;
    evidence.attach(
        &teacher.id,
        EvidenceSummary {
            count: 4,
            timestamp_matches: true,
        },
    )
    .map_err(TriageError::from)?;
    let reentered = engine.update_status(
        &teacher.id,
        ReportStatus::Analyzing,
        admin.clone(),
        Some("photos received".to_string()),
    )?;
    println!(
        "- evidence re-entry rescored to {} ({:?})",
        reentered.score().total,
        reentered.score().tier
    );
    engine.update_status(&teacher.id, ReportStatus::InProgress, admin.clone(), None)?;
    let resolved = engine.update_status(
        &teacher.id,
        ReportStatus::Resolved,
        admin.clone(),
        Some("kitchen suspended pending inspection".to_string()),
    )?;
    print_history(&resolved);

    engine.annotate(
        &anonymous.id,
        admin.clone(),
        "no identifiable school or date".to_string(),
    )?;
    engine.update_status(&anonymous.id, ReportStatus::Analyzing, admin.clone(), None)?;
    let rejected = engine.update_status(&anonymous.id, ReportStatus::Invalid, admin, None)?;
    println!(
        "\n{} closed as {} (legacy view: {:?}) with {} admin note(s)",
        rejected.id,
        rejected.status().tag(),
        rejected.legacy_status(),
        rejected.admin_notes().len()
    );

    let follow_up = submit(
        &engine,
        "teacher follow-up",
        ReportDraft {
            category: ReportCategory::Kitchen,
            incident_at: Utc::now() - Duration::hours(1),
            location: school_location(),
            description: TEACHER_ACCOUNT.to_string(),
            evidence: EvidenceSummary::default(),
            reporter_id: Some(ReporterId("teacher-ani".to_string())),
            relation: ReporterRelation::Teacher,
        },
    )?;
    println!(
        "- reporter history factor moved from {} to {} after the resolved report",
        teacher.score().breakdown.reporter_history,
        follow_up.score().breakdown.reporter_history
    );

    print_queue(&engine)?;

    if args.json {
        let current = engine.get(&parent.id)?;
        match serde_json::to_string_pretty(&current) {
            Ok(json) => println!("\nReport payload:\n{json}"),
            Err(err) => println!("\nReport payload unavailable: {err}"),
        }
    }

    Ok(())
}

fn school_location() -> LocationKey {
    LocationKey {
        province_id: Some("32".to_string()),
        city_id: Some("32.73".to_string()),
        district_id: Some("32.73.01".to_string()),
        specific_location: "SDN 1 Cibeunying".to_string(),
        latitude: Some(-6.8915),
        longitude: Some(107.6255),
    }
}

fn submit(engine: &TriageEngine, label: &str, draft: ReportDraft) -> Result<Report, AppError> {
    let report = engine.submit(draft)?;
    let summary = engine.rescore_affected_by_submission(&report)?;
    let breakdown = &report.score().breakdown;

    println!(
        "- {label} report {} -> {} ({:?}){}",
        report.id,
        report.score().total,
        report.score().tier,
        if breakdown.partial { " [partial]" } else { "" }
    );
    println!(
        "  relation {} | location/time {} | evidence {} | narrative {} | history {} | similarity {}",
        breakdown.relation,
        breakdown.location_time,
        breakdown.evidence,
        breakdown.narrative,
        breakdown.reporter_history,
        breakdown.similarity
    );
    if summary.updated > 0 {
        println!(
            "  corroboration raised {} earlier report(s)",
            summary.updated
        );
    }
    Ok(report)
}

fn print_queue(engine: &TriageEngine) -> Result<(), AppError> {
    println!("\nReview queue");
    let queue = engine.review_queue(10)?;
    if queue.is_empty() {
        println!("  (empty)");
    }
    for entry in queue {
        println!(
            "  - {} {:?} {:?} total {} [{}]",
            entry.report_id,
            entry.tier,
            entry.category,
            entry.total,
            entry.status.tag()
        );
    }
    Ok(())
}

fn print_history(report: &Report) {
    println!("  History:");
    for entry in report.history() {
        let from = entry.from_status.map(ReportStatus::tag).unwrap_or("-");
        println!(
            "    {} {} -> {} by {:?}{}",
            entry.timestamp.format("%H:%M:%S"),
            from,
            entry.to_status.tag(),
            entry.changed_by,
            entry
                .notes
                .as_deref()
                .map(|notes| format!(" ({notes})"))
                .unwrap_or_default()
        );
    }
}
