use super::models::{AttendingParent, CanonicalEvent, FamilyMember, MemberRole};
use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How long an event is assumed to last when checking for conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DurationRule {
    /// Every event lasts exactly one hour, whatever its end says
    #[default]
    SyntheticHour,
    /// Use the event's own end
    Actual,
}

/// Parameters of the conflict check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictRules {
    pub duration: DurationRule,
    /// Slack added on both sides of each window
    pub buffer: Duration,
}

impl Default for ConflictRules {
    fn default() -> Self {
        Self {
            duration: DurationRule::SyntheticHour,
            buffer: Duration::hours(1),
        }
    }
}

impl ConflictRules {
    /// Implied window `[start, end]` of an event under this rule
    pub fn window(&self, event: &CanonicalEvent) -> (DateTime<FixedOffset>, DateTime<FixedOffset>) {
        let end = match self.duration {
            DurationRule::SyntheticHour => event.start_at + Duration::hours(1),
            DurationRule::Actual => event.end_at.max(event.start_at),
        };
        (event.start_at, end)
    }

    /// Whether two events clash. Symmetric in its arguments.
    pub fn overlaps(&self, a: &CanonicalEvent, b: &CanonicalEvent) -> bool {
        if a.calendar_day() != b.calendar_day() {
            return false;
        }

        let (a_start, a_end) = self.window(a);
        let (b_start, b_end) = self.window(b);

        a_start <= b_end + self.buffer && b_start <= a_end + self.buffer
    }
}

fn same_identity(a: &CanonicalEvent, b: &CanonicalEvent) -> bool {
    let same_internal = matches!((&a.internal_id, &b.internal_id), (Some(x), Some(y)) if x == y);
    let same_external = matches!((&a.external_id, &b.external_id), (Some(x), Some(y)) if x == y);
    same_internal || same_external
}

/// Events in `pool` that clash with `target`, excluding `target` itself
pub fn find_conflicts(
    target: &CanonicalEvent,
    pool: &[CanonicalEvent],
    rules: &ConflictRules,
) -> Vec<CanonicalEvent> {
    pool.iter()
        .filter(|other| !same_identity(target, other))
        .filter(|other| !std::ptr::eq(*other, target))
        .filter(|other| rules.overlaps(target, other))
        .cloned()
        .collect()
}

/// Whether a family member is free given a set of conflicting events
#[derive(Debug, Clone, PartialEq)]
pub struct Availability {
    pub available: bool,
    /// Title of the event that keeps the member busy
    pub conflicting_event: Option<String>,
}

/// Mark members busy when a conflicting event involves them
pub fn family_availability(
    conflicts: &[CanonicalEvent],
    directory: &[FamilyMember],
) -> BTreeMap<String, Availability> {
    let mut availability: BTreeMap<String, Availability> = directory
        .iter()
        .map(|m| {
            (
                m.id.clone(),
                Availability {
                    available: true,
                    conflicting_event: None,
                },
            )
        })
        .collect();

    let mut mark_busy = |id: &str, event: &CanonicalEvent| {
        if let Some(entry) = availability.get_mut(id) {
            entry.available = false;
            entry.conflicting_event = Some(event.title.clone());
        }
    };

    for event in conflicts {
        if let Some(child_id) = event.child_id() {
            mark_busy(child_id, event);

            match &event.attending_parent {
                AttendingParent::Specific(parent_id) => mark_busy(parent_id, event),
                AttendingParent::Both => directory
                    .iter()
                    .filter(|m| m.role == MemberRole::Parent)
                    .for_each(|m| mark_busy(&m.id, event)),
                AttendingParent::Undecided | AttendingParent::None => {}
            }
        }

        for attendee in &event.attendees {
            mark_busy(&attendee.id, event);
        }
    }

    availability
}
