//! Two identities for one event.
//!
//! The content signature says whether two records describe the same logical
//! event and works before anything has been persisted. The authoritative key
//! says whether a particular event was already acted upon and prefers durable
//! ids, so it survives edits to the content fields.

use super::models::CanonicalEvent;

const DATE_PART: &str = "%Y-%m-%d";

/// Content identity: `child-title-date-type`, lower-cased.
///
/// Whitespace is kept as-is, so titles differing only by trailing spaces
/// produce different signatures.
pub fn signature(event: &CanonicalEvent) -> String {
    format!(
        "{}-{}-{}-{}",
        event.child_name().unwrap_or(""),
        event.title,
        event.start_at.format(DATE_PART),
        event.event_type.as_str()
    )
    .to_lowercase()
}

/// State identity: internal id, then external or linked id, then the
/// content key.
pub fn authoritative_key(event: &CanonicalEvent) -> String {
    match event
        .internal_id
        .as_deref()
        .or(event.external_id.as_deref())
        .or(event.linked_entity.as_ref().map(|l| l.id.as_str()))
    {
        Some(id) => hyphenate(id),
        None => content_key(event),
    }
}

/// `title-date-child` compound, the key of an event that has no id yet
pub fn content_key(event: &CanonicalEvent) -> String {
    let mut key = event.title.clone();
    key.push('-');
    key.push_str(&event.start_at.format(DATE_PART).to_string());
    if let Some(child) = event.child_name() {
        key.push('-');
        key.push_str(child);
    }
    hyphenate(&key)
}

/// Lower-case with whitespace runs as hyphens
fn hyphenate(key: &str) -> String {
    key.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::calendar::models::{EventSource, LinkedEntity, RawEvent};
    use crate::components::calendar::normalize::{normalize, NormalizeOptions};
    use serde_json::json;

    fn event(value: serde_json::Value) -> CanonicalEvent {
        let raw: RawEvent = serde_json::from_value(value).unwrap();
        normalize(&raw, EventSource::Manual, &NormalizeOptions::default())
    }

    #[test]
    fn test_signature_shape() {
        let e = event(json!({
            "title": "Dentist",
            "date": "2024-05-01",
            "childName": "Mia",
            "eventType": "Appointment"
        }));
        assert_eq!(signature(&e), "mia-dentist-2024-05-01-appointment");

        let e = event(json!({ "title": "Soccer", "dateTime": "2024-05-01T18:00:00Z" }));
        assert_eq!(signature(&e), "-soccer-2024-05-01-general");
    }

    #[test]
    fn test_signature_ignores_source_and_ids() {
        let a = event(json!({
            "id": "google-1",
            "title": "Dentist",
            "date": "2024-05-01",
            "childName": "Mia",
            "source": "google"
        }));
        let b = event(json!({
            "firestoreId": "doc-9",
            "title": "DENTIST",
            "dateTime": "2024-05-01T09:30:00Z",
            "childName": "mia",
            "source": "chat"
        }));
        assert_eq!(signature(&a), signature(&b));
    }

    #[test]
    fn test_signature_keeps_whitespace_differences() {
        let a = event(json!({ "title": "Dentist", "date": "2024-05-01" }));
        let b = event(json!({ "title": "Dentist ", "date": "2024-05-01" }));
        assert_ne!(signature(&a), signature(&b));
    }

    #[test]
    fn test_authoritative_key_preference() {
        let mut e = event(json!({
            "firestoreId": "Doc 1",
            "id": "ext-1",
            "title": "Swim Class",
            "date": "2024-05-01",
            "childName": "Leo"
        }));
        assert_eq!(authoritative_key(&e), "doc-1");

        e.internal_id = None;
        assert_eq!(authoritative_key(&e), "ext-1");

        e.external_id = None;
        e.linked_entity = Some(LinkedEntity::new("task", "Task 7"));
        assert_eq!(authoritative_key(&e), "task-7");

        e.linked_entity = None;
        assert_eq!(authoritative_key(&e), "swim-class-2024-05-01-leo");
    }

    #[test]
    fn test_authoritative_key_survives_content_edits() {
        let mut e = event(json!({ "firestoreId": "abc", "title": "Dentist", "date": "2024-05-01" }));
        let before = authoritative_key(&e);
        let before_signature = signature(&e);

        e.title = "Orthodontist".to_string();
        assert_eq!(authoritative_key(&e), before);
        assert_ne!(signature(&e), before_signature);
    }
}
