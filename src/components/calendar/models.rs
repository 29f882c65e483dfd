use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use tracing::warn;

/// Title used when a record carries neither a title nor a summary
pub const UNTITLED_EVENT: &str = "Untitled Event";

/// Start or end block of a provider event (`{ "dateTime": .. }` or `{ "date": .. }`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawEventTime {
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// AI metadata as found nested under `extraDetails`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawExtraDetails {
    #[serde(
        rename = "parsedWithAI",
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub parsed_with_ai: Option<bool>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub extraction_confidence: Option<f64>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub parsed_from_image: Option<bool>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub creation_source: Option<String>,
}

/// Record as it arrives from any source, before normalization.
///
/// Every field is optional and ill-typed values are dropped field by field,
/// so one odd record never fails a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawEvent {
    /// Provider-side id
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Persisted id, when the record came back from our own store
    #[serde(
        alias = "firestoreId",
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub internal_id: Option<String>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub start: Option<RawEventTime>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub end: Option<RawEventTime>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub end_date_time: Option<String>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub child_id: Option<String>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub child_name: Option<String>,
    #[serde(deserialize_with = "lenient_vec", skip_serializing_if = "Vec::is_empty")]
    pub sibling_ids: Vec<String>,
    #[serde(deserialize_with = "lenient_vec", skip_serializing_if = "Vec::is_empty")]
    pub sibling_names: Vec<String>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub attending_parent_id: Option<String>,
    #[serde(
        alias = "hostParent",
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub host_parent_name: Option<String>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub assigned_to_name: Option<String>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub linked_entity: Option<LinkedEntity>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(
        rename = "parsedWithAI",
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub parsed_with_ai: Option<bool>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub extraction_confidence: Option<f64>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub parsed_from_image: Option<bool>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub extra_details: Option<RawExtraDetails>,
}

impl RawEvent {
    /// Parse a JSON array of records. Entries that are not objects become empty records.
    pub fn parse_batch(value: serde_json::Value) -> Vec<RawEvent> {
        match value {
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| {
                    serde_json::from_value(item).unwrap_or_else(|e| {
                        warn!("Unreadable event record, keeping an empty one: {}", e);
                        RawEvent::default()
                    })
                })
                .collect(),
            other => {
                warn!("Expected an array of events, got {}", json_kind(&other));
                Vec::new()
            }
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Keep the value if it has the expected type, drop it otherwise
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Ids arrive both as strings and as numbers (meeting week numbers)
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

/// Reference back to the record an event was derived from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedEntity {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(deserialize_with = "required_id")]
    pub id: String,
}

fn required_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_string(deserializer)?.ok_or_else(|| serde::de::Error::custom("id must be a string or number"))
}

impl LinkedEntity {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

/// Where an event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventSource {
    #[default]
    Manual,
    Chat,
    Parser,
    Document,
    System,
    TaskSystem,
    Google,
    Apple,
    Outlook,
}

impl EventSource {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "chat" => Some(Self::Chat),
            "parser" => Some(Self::Parser),
            "document" => Some(Self::Document),
            "system" => Some(Self::System),
            "task-system" | "task_system" | "tasksystem" => Some(Self::TaskSystem),
            "google" => Some(Self::Google),
            "apple" => Some(Self::Apple),
            "outlook" => Some(Self::Outlook),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Chat => "chat",
            Self::Parser => "parser",
            Self::Document => "document",
            Self::System => "system",
            Self::TaskSystem => "task-system",
            Self::Google => "google",
            Self::Apple => "apple",
            Self::Outlook => "outlook",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event category vocabulary. Unknown labels are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventCategory {
    #[default]
    General,
    Appointment,
    Medical,
    Activity,
    Birthday,
    Meeting,
    Task,
    Homework,
    Other(String),
}

impl EventCategory {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "" | "general" => Self::General,
            "appointment" => Self::Appointment,
            "medical" => Self::Medical,
            "activity" => Self::Activity,
            "birthday" => Self::Birthday,
            "meeting" => Self::Meeting,
            "task" => Self::Task,
            "homework" => Self::Homework,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::General => "general",
            Self::Appointment => "appointment",
            Self::Medical => "medical",
            Self::Activity => "activity",
            Self::Birthday => "birthday",
            Self::Meeting => "meeting",
            Self::Task => "task",
            Self::Homework => "homework",
            Self::Other(label) => label,
        }
    }

    /// Categories that invite the whole family
    pub fn is_family_wide(&self) -> bool {
        matches!(self, Self::Meeting | Self::General)
    }
}

impl From<String> for EventCategory {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

impl From<EventCategory> for String {
    fn from(category: EventCategory) -> Self {
        category.as_str().to_string()
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which parent goes along
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum AttendingParent {
    #[default]
    None,
    Specific(String),
    Both,
    Undecided,
}

impl AttendingParent {
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Self::None,
            Some(value) if value.eq_ignore_ascii_case("both") => Self::Both,
            Some(value) if value.eq_ignore_ascii_case("undecided") => Self::Undecided,
            Some(id) => Self::Specific(id.to_string()),
        }
    }
}

/// Role of a family member or derived attendee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Parent,
    Child,
    Host,
}

/// Entry of the family directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyMember {
    pub id: String,
    pub name: String,
    pub role: MemberRole,
    #[serde(default, alias = "profilePicture")]
    pub picture_ref: Option<String>,
}

/// Derived attendee of an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub id: String,
    pub name: String,
    pub picture_ref: Option<String>,
    pub role: MemberRole,
}

impl From<&FamilyMember> for Attendee {
    fn from(member: &FamilyMember) -> Self {
        Self {
            id: member.id.clone(),
            name: member.name.clone(),
            picture_ref: member.picture_ref.clone(),
            role: member.role,
        }
    }
}

/// Child an event is about
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChildRef {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// AI metadata in canonical shape
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraDetails {
    #[serde(rename = "parsedWithAI")]
    pub parsed_with_ai: bool,
    pub extraction_confidence: Option<f64>,
    pub parsed_from_image: bool,
    pub creation_source: EventSource,
}

/// Normalized, source-agnostic event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEvent {
    pub internal_id: Option<String>,
    pub external_id: Option<String>,
    pub linked_entity: Option<LinkedEntity>,
    pub title: String,
    pub summary: String,
    pub description: String,
    pub location: String,
    pub start_at: DateTime<FixedOffset>,
    pub end_at: DateTime<FixedOffset>,
    /// Set when no usable date was found and "now" was substituted
    pub inferred_date: bool,
    pub category: EventCategory,
    pub event_type: EventCategory,
    pub child: Option<ChildRef>,
    pub sibling_ids: Vec<String>,
    pub sibling_names: Vec<String>,
    pub attending_parent: AttendingParent,
    pub host_parent_name: Option<String>,
    pub assigned_to: Option<String>,
    pub assigned_to_name: Option<String>,
    pub attendees: Vec<Attendee>,
    pub source: EventSource,
    pub extra_details: ExtraDetails,
}

impl CanonicalEvent {
    pub fn child_id(&self) -> Option<&str> {
        self.child.as_ref().and_then(|c| c.id.as_deref())
    }

    pub fn child_name(&self) -> Option<&str> {
        self.child.as_ref().and_then(|c| c.name.as_deref())
    }

    /// Calendar day of the start, in the event's own offset
    pub fn calendar_day(&self) -> NaiveDate {
        self.start_at.date_naive()
    }

    pub fn has_category(&self, category: &EventCategory) -> bool {
        &self.category == category || &self.event_type == category
    }
}

/// Partial update applied through the repository
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_at: Option<DateTime<FixedOffset>>,
    pub end_at: Option<DateTime<FixedOffset>>,
    pub category: Option<EventCategory>,
    pub child: Option<ChildRef>,
    pub attending_parent: Option<AttendingParent>,
    pub host_parent_name: Option<String>,
}

/// Outcome of persisting an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEventOutcome {
    pub success: bool,
    pub event_id: Option<String>,
    #[serde(default)]
    pub is_mock: bool,
    /// The store already held an event with the same signature
    #[serde(default)]
    pub is_duplicate: bool,
}

/// Family task, the input of due-date events
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FamilyTask {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub assigned_to: Option<String>,
    pub assigned_to_name: Option<String>,
    pub completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_event_drops_ill_typed_fields() {
        let raw: RawEvent = serde_json::from_value(json!({
            "id": 42,
            "title": ["not", "a", "string"],
            "summary": "Swim practice",
            "parsedWithAI": "yes",
            "siblingIds": ["a", 7, null],
            "start": { "dateTime": "2024-05-01T14:00:00Z" },
            "linkedEntity": { "type": "meeting", "id": 12 }
        }))
        .unwrap();

        assert_eq!(raw.id.as_deref(), Some("42"));
        assert_eq!(raw.title, None);
        assert_eq!(raw.summary.as_deref(), Some("Swim practice"));
        assert_eq!(raw.parsed_with_ai, None);
        assert_eq!(raw.sibling_ids, vec!["a".to_string(), "7".to_string()]);
        assert_eq!(raw.linked_entity, Some(LinkedEntity::new("meeting", "12")));
    }

    #[test]
    fn test_parse_batch_keeps_bad_entries_as_empty_records() {
        let batch = RawEvent::parse_batch(json!([{ "title": "A" }, "garbage", { "title": "B" }]));
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[1], RawEvent::default());

        assert!(RawEvent::parse_batch(json!({ "items": [] })).is_empty());
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(EventCategory::from_label("Meeting"), EventCategory::Meeting);
        assert_eq!(EventCategory::from_label(""), EventCategory::General);
        assert_eq!(
            EventCategory::from_label("sports"),
            EventCategory::Other("sports".to_string())
        );
        assert!(EventCategory::General.is_family_wide());
        assert!(!EventCategory::Birthday.is_family_wide());
    }

    #[test]
    fn test_attending_parent_from_raw() {
        assert_eq!(AttendingParent::from_raw(None), AttendingParent::None);
        assert_eq!(AttendingParent::from_raw(Some("both")), AttendingParent::Both);
        assert_eq!(AttendingParent::from_raw(Some("undecided")), AttendingParent::Undecided);
        assert_eq!(
            AttendingParent::from_raw(Some("p1")),
            AttendingParent::Specific("p1".to_string())
        );
    }

    #[test]
    fn test_source_labels() {
        assert_eq!(EventSource::from_label("task-system"), Some(EventSource::TaskSystem));
        assert_eq!(EventSource::from_label("Google"), Some(EventSource::Google));
        assert_eq!(EventSource::from_label("fax"), None);
        assert_eq!(EventSource::TaskSystem.to_string(), "task-system");
    }
}
