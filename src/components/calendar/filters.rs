use super::models::{CanonicalEvent, EventCategory};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

/// Views offered by the calendar widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CalendarView {
    #[default]
    All,
    Appointments,
    Activities,
    Tasks,
    Meetings,
    AiParsed,
}

impl CalendarView {
    pub fn matches(&self, event: &CanonicalEvent) -> bool {
        match self {
            Self::All => true,
            Self::Appointments => {
                event.category == EventCategory::Medical
                    || event.event_type == EventCategory::Appointment
            }
            Self::Activities => event.has_category(&EventCategory::Activity),
            Self::Tasks => {
                event.has_category(&EventCategory::Task)
                    || event.event_type == EventCategory::Homework
            }
            Self::Meetings => event.has_category(&EventCategory::Meeting),
            Self::AiParsed => event.extra_details.parsed_with_ai,
        }
    }
}

/// Member selection; `All` disables member filtering
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MemberSelector {
    #[default]
    All,
    /// Matches a member id or name
    Member(String),
}

impl MemberSelector {
    pub fn matches(&self, event: &CanonicalEvent) -> bool {
        let wanted = match self {
            Self::All => return true,
            Self::Member(wanted) => wanted.as_str(),
        };

        let is = |value: Option<&str>| value == Some(wanted);

        is(event.child_id())
            || is(event.child_name())
            || is(event.assigned_to.as_deref())
            || is(event.assigned_to_name.as_deref())
            || event
                .attendees
                .iter()
                .any(|a| a.id == wanted || a.name == wanted)
    }
}

/// Events on `day`, ignoring time. Events with a fabricated date are left out.
pub fn filter_by_date(events: &[CanonicalEvent], day: NaiveDate) -> Vec<CanonicalEvent> {
    events
        .iter()
        .filter(|e| !e.inferred_date && e.calendar_day() == day)
        .cloned()
        .collect()
}

pub fn filter_by_view(events: &[CanonicalEvent], view: CalendarView) -> Vec<CanonicalEvent> {
    events.iter().filter(|e| view.matches(e)).cloned().collect()
}

pub fn filter_by_member(events: &[CanonicalEvent], selector: &MemberSelector) -> Vec<CanonicalEvent> {
    events
        .iter()
        .filter(|e| selector.matches(e))
        .cloned()
        .collect()
}

/// Next `limit` events starting at or after `now`, earliest first
pub fn upcoming(
    events: &[CanonicalEvent],
    now: DateTime<FixedOffset>,
    view: CalendarView,
    selector: &MemberSelector,
    limit: usize,
) -> Vec<CanonicalEvent> {
    let mut selected: Vec<CanonicalEvent> = events
        .iter()
        .filter(|e| !e.inferred_date && e.start_at >= now)
        .filter(|e| view.matches(e) && selector.matches(e))
        .cloned()
        .collect();

    selected.sort_by_key(|e| e.start_at);
    selected.truncate(limit);
    selected
}
