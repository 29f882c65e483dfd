use chrono::{DateTime, Duration, NaiveDate};
use famcal::components::calendar::aggregate::{aggregate, SourceBatch, SourcePriority};
use famcal::components::calendar::conflicts::{find_conflicts, ConflictRules, DurationRule};
use famcal::components::calendar::dedup::DedupCache;
use famcal::components::calendar::filters::{filter_by_date, upcoming, CalendarView, MemberSelector};
use famcal::components::calendar::identity::{authoritative_key, signature};
use famcal::components::calendar::models::{
    EventSource, FamilyMember, MemberRole, RawEvent, UNTITLED_EVENT,
};
use famcal::components::calendar::normalize::{normalize, NormalizeOptions};
use famcal::components::calendar::CanonicalEvent;
use famcal::config::Config;
use famcal::error::provider_error;
use serde_json::json;
use std::collections::{HashMap, HashSet};

fn member(id: &str, name: &str, role: MemberRole) -> FamilyMember {
    FamilyMember {
        id: id.to_string(),
        name: name.to_string(),
        role,
        picture_ref: Some(format!("{}.png", id)),
    }
}

/// Two parents and two children
fn family() -> Vec<FamilyMember> {
    vec![
        member("p1", "Anna", MemberRole::Parent),
        member("p2", "Ben", MemberRole::Parent),
        member("c1", "Mia", MemberRole::Child),
        member("c2", "Leo", MemberRole::Child),
    ]
}

fn opts() -> NormalizeOptions {
    NormalizeOptions::default().with_now(DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z").unwrap())
}

fn batch(name: &str, priority: SourcePriority, source: EventSource, value: serde_json::Value) -> SourceBatch {
    SourceBatch::ok(name, priority, source, RawEvent::parse_batch(value))
}

fn one(value: serde_json::Value) -> CanonicalEvent {
    let raw: RawEvent = serde_json::from_value(value).unwrap();
    normalize(&raw, EventSource::Manual, &opts())
}

/// Smoke test to verify that the config can be built from variables
#[tokio::test]
async fn test_config_loads() {
    let vars: HashMap<&str, &str> = [
        ("FAMCAL_FAMILY_ID", "fam-1"),
        ("FAMCAL_PRINCIPAL_ID", "user-1"),
        ("FAMCAL_TIMEZONE", "Europe/Helsinki"),
    ]
    .into_iter()
    .collect();

    let config = Config::from_sources(
        |key| vars.get(key).map(|v| v.to_string()),
        Some("conflict_duration = \"actual\"\nupcoming_limit = 3\n"),
    )
    .unwrap();

    assert_eq!(config.family_id, "fam-1");
    assert_eq!(config.refresh_interval_secs, 30);
    assert_eq!(config.settings.upcoming_limit, 3);
    assert_eq!(config.conflict_rules().duration, DurationRule::Actual);
    assert!(config.is_component_enabled("calendar_sync"));
}

#[test]
fn test_scenario_cross_source_dedup() {
    let provider = batch(
        "google",
        SourcePriority::Provider,
        EventSource::Google,
        json!([{ "id": "g-77", "summary": "Dentist", "start": { "date": "2024-05-01" }, "childName": "Mia" }]),
    );
    let chat = batch(
        "chat",
        SourcePriority::UserAuthored,
        EventSource::Chat,
        json!([{ "title": "Dentist", "date": "2024-05-01", "childName": "Mia" }]),
    );

    let mut cache = DedupCache::new();
    let events = aggregate(vec![chat, provider], &mut cache, &family(), &opts());

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].title, "Dentist");
    assert_eq!(events[0].source, EventSource::Google);
}

#[test]
fn test_scenario_conflict_detection() {
    let a = one(json!({ "id": "a", "title": "Swim", "dateTime": "2024-05-01T14:00:00Z" }));
    let b = one(json!({ "id": "b", "title": "Piano", "dateTime": "2024-05-01T14:30:00Z" }));
    let c = one(json!({ "id": "c", "title": "Dinner", "dateTime": "2024-05-01T17:00:00Z" }));
    let pool = vec![a.clone(), b.clone(), c.clone()];
    let rules = ConflictRules::default();

    let titles = |events: Vec<CanonicalEvent>| events.into_iter().map(|e| e.title).collect::<Vec<_>>();

    assert_eq!(titles(find_conflicts(&a, &pool, &rules)), vec!["Piano"]);
    assert_eq!(titles(find_conflicts(&b, &pool, &rules)), vec!["Swim"]);
    assert!(find_conflicts(&c, &pool, &rules).is_empty());
}

#[test]
fn test_scenario_meeting_attendees() {
    let meeting = batch(
        "meeting",
        SourcePriority::SystemMeeting,
        EventSource::System,
        json!([{ "title": "Family Meeting - Week 2", "category": "meeting", "date": "2024-05-05" }]),
    );

    let mut cache = DedupCache::new();
    let events = aggregate(vec![meeting], &mut cache, &family(), &opts());

    assert_eq!(events[0].attendees.len(), 4);
    let ids: HashSet<&str> = events[0].attendees.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, ["p1", "p2", "c1", "c2"].into_iter().collect());
}

#[test]
fn test_scenario_missing_directory_match() {
    let appointment = batch(
        "manual",
        SourcePriority::UserAuthored,
        EventSource::Manual,
        json!([{ "title": "Haircut", "date": "2024-05-01", "childId": "missing-1", "childName": "Sam" }]),
    );

    let mut cache = DedupCache::new();
    let events = aggregate(vec![appointment], &mut cache, &family(), &opts());

    assert_eq!(events[0].attendees.len(), 1);
    let sam = &events[0].attendees[0];
    assert_eq!(sam.name, "Sam");
    assert_eq!(sam.role, MemberRole::Child);
    assert_eq!(sam.picture_ref, None);
}

#[test]
fn test_aggregate_is_idempotent_within_a_session() {
    let make = || {
        vec![
            batch(
                "google",
                SourcePriority::Provider,
                EventSource::Google,
                json!([
                    { "summary": "Soccer", "start": { "dateTime": "2024-05-02T16:00:00+03:00" } },
                    { "summary": "Soccer", "start": { "dateTime": "2024-05-02T18:00:00+03:00" } }
                ]),
            ),
            SourceBatch::failed(
                "outlook",
                SourcePriority::Provider,
                EventSource::Outlook,
                provider_error("timeout"),
            ),
        ]
    };

    let mut cache = DedupCache::new();
    let first = aggregate(make(), &mut cache, &family(), &opts());
    assert_eq!(first.len(), 1);

    let second = aggregate(make(), &mut cache, &family(), &opts());
    assert!(second.is_empty());

    let signatures: HashSet<String> = first.iter().map(signature).collect();
    assert_eq!(signatures.len(), first.len());
}

#[test]
fn test_malformed_records_still_normalize() {
    let events: Vec<CanonicalEvent> = RawEvent::parse_batch(json!([
        {},
        { "title": null, "summary": 12, "start": "tomorrow" },
        { "dateTime": "not a date", "endDateTime": "2020-01-01T00:00:00Z" },
        42
    ]))
    .iter()
    .map(|raw| normalize(raw, EventSource::Parser, &opts()))
    .collect();

    assert_eq!(events.len(), 4);
    for event in &events {
        assert_eq!(event.title, UNTITLED_EVENT);
        assert!(event.inferred_date);
        assert!(event.start_at <= event.end_at);
        assert_eq!(event.end_at - event.start_at, Duration::hours(1));
    }

    // Events without a real date never show up on a day
    let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    assert!(filter_by_date(&events, day).is_empty());
}

#[test]
fn test_identity_split() {
    let provider = one(json!({ "id": "g-1", "title": "Dentist", "date": "2024-05-01", "childName": "Mia" }));
    let mut edited = provider.clone();
    edited.title = "Dentist (rescheduled)".to_string();

    // Content changed, so the signature changes, but the key follows the id
    assert_ne!(signature(&provider), signature(&edited));
    assert_eq!(authoritative_key(&provider), authoritative_key(&edited));

    let unsaved = one(json!({ "title": "Field  Trip", "date": "2024-05-01", "childName": "Leo" }));
    assert_eq!(authoritative_key(&unsaved), "field-trip-2024-05-01-leo");
}

#[test]
fn test_upcoming_for_one_child() {
    let events = vec![
        one(json!({ "title": "Swim", "childName": "Mia", "dateTime": "2024-05-02T09:00:00Z" })),
        one(json!({ "title": "Chess", "childName": "Leo", "dateTime": "2024-05-02T10:00:00Z" })),
        one(json!({ "title": "Dentist", "childName": "Mia", "category": "medical", "dateTime": "2024-05-03T09:00:00Z" })),
    ];
    let now = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z").unwrap();

    let mia = MemberSelector::Member("Mia".to_string());
    let next = upcoming(&events, now, CalendarView::All, &mia, 5);
    assert_eq!(next.iter().map(|e| e.title.as_str()).collect::<Vec<_>>(), vec!["Swim", "Dentist"]);

    let medical = upcoming(&events, now, CalendarView::Appointments, &mia, 5);
    assert_eq!(medical.len(), 1);
}
