use chrono::Duration;

use super::common::*;
use crate::workflows::reports::corroboration::{
    CorroborationEntry, CorroborationIndex, InMemoryCorroborationIndex, TimeWindow,
};
use crate::workflows::reports::domain::{LocationBucket, LocationResolution, ReportCategory};

fn index() -> InMemoryCorroborationIndex {
    InMemoryCorroborationIndex::new(Duration::days(30))
}

#[test]
fn query_filters_by_category_bucket_and_window() {
    let index = index();
    let at = now() - Duration::days(1);

    index
        .index(entry("rpt-in", Some("parent-a"), "SDN 1 Cibeunying", at))
        .expect("index");
    index
        .index(entry(
            "rpt-late",
            Some("parent-b"),
            "SDN 1 Cibeunying",
            at + Duration::hours(60),
        ))
        .expect("index");

    let mut other_category = entry("rpt-kitchen", Some("parent-c"), "SDN 1 Cibeunying", at);
    other_category.category = ReportCategory::Kitchen;
    index.index(other_category).expect("index");

    let mut other_district = entry("rpt-far", Some("parent-d"), "SDN 2 Coblong", at);
    other_district.bucket = LocationBucket {
        district_id: "32.73.02".to_string(),
        ..bucket()
    };
    index.index(other_district).expect("index");

    let window = TimeWindow::around(at, Duration::hours(48));
    let found = index
        .query(ReportCategory::Poisoning, &bucket(), window)
        .expect("query");

    let ids: Vec<&str> = found.iter().map(|entry| entry.report_id.0.as_str()).collect();
    assert_eq!(ids, vec!["rpt-in"]);
    assert_eq!(index.len(), 4);
}

#[test]
fn query_returns_most_recent_incidents_first() {
    let index = index();
    let at = now() - Duration::days(1);
    for (id, offset) in [("rpt-1", 5), ("rpt-2", 1), ("rpt-3", 9)] {
        index
            .index(entry(id, None, "SDN 1 Cibeunying", at - Duration::hours(offset)))
            .expect("index");
    }

    let found = index
        .query(
            ReportCategory::Poisoning,
            &bucket(),
            TimeWindow::around(at, Duration::hours(48)),
        )
        .expect("query");
    let ids: Vec<&str> = found.iter().map(|entry| entry.report_id.0.as_str()).collect();
    assert_eq!(ids, vec!["rpt-2", "rpt-1", "rpt-3"]);
}

#[test]
fn reindexing_replaces_previous_entry() {
    let index = index();
    let at = now() - Duration::days(1);

    index
        .index(entry("rpt-same", Some("parent-a"), "SDN 1 Cibeunying", at))
        .expect("index");
    index
        .index(entry("rpt-same", Some("parent-a"), "Dapur Umum", at))
        .expect("index");

    let found = index
        .query(
            ReportCategory::Poisoning,
            &bucket(),
            TimeWindow::around(at, Duration::hours(1)),
        )
        .expect("query");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].specific_location, "Dapur Umum");
}

#[test]
fn expire_evicts_entries_past_retention() {
    let index = index();
    let at = now() - Duration::days(1);

    let mut stale = entry("rpt-stale", None, "SDN 1 Cibeunying", at);
    stale.indexed_at = now() - Duration::days(31);
    index.index(stale).expect("index");
    index
        .index(entry("rpt-fresh", None, "SDN 1 Cibeunying", at))
        .expect("index");

    assert_eq!(index.expire(now()).expect("expire"), 1);
    assert_eq!(index.len(), 1);
    assert_eq!(index.expire(now()).expect("expire"), 0);
    assert_eq!(index.expire(now() + Duration::days(31)).expect("expire"), 1);
    assert!(index.is_empty());
}

#[test]
fn reports_without_district_are_not_indexable() {
    let report = report_from(
        "rpt-unbucketed",
        anonymous_draft(),
        LocationResolution::Unresolved,
        crate::workflows::reports::domain::ReporterStanding::Anonymous,
    );
    assert!(CorroborationEntry::from_report(&report, now()).is_none());

    let located = report_from(
        "rpt-bucketed",
        draft(),
        LocationResolution::Resolved,
        first_time_standing(),
    );
    let entry = CorroborationEntry::from_report(&located, now()).expect("bucketed entry");
    assert_eq!(entry.bucket, bucket());
    assert_eq!(entry.indexed_at, now());
}

#[test]
fn window_saturates_at_the_representable_range() {
    let radius = Duration::hours(72);

    let earliest = TimeWindow::around(chrono::DateTime::<chrono::Utc>::MIN_UTC, radius);
    assert_eq!(earliest.start, chrono::DateTime::<chrono::Utc>::MIN_UTC);
    assert!(earliest.contains(chrono::DateTime::<chrono::Utc>::MIN_UTC));

    let latest = TimeWindow::around(chrono::DateTime::<chrono::Utc>::MAX_UTC, radius);
    assert_eq!(latest.end, chrono::DateTime::<chrono::Utc>::MAX_UTC);
}
