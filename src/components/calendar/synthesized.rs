use super::models::{FamilyTask, LinkedEntity, RawEvent, RawEventTime};
use super::time::{localize, next_sunday_evening, parse_timestamp};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, SecondsFormat};
use chrono_tz::Tz;
use tracing::debug;

/// Length of a family meeting
pub const MEETING_LENGTH_MINUTES: i64 = 30;

fn time_block(dt: DateTime<FixedOffset>) -> RawEventTime {
    RawEventTime {
        date_time: Some(dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
        date: None,
    }
}

/// Weekly family meeting for `cycle`. Defaults to the next Sunday at 19:00.
pub fn family_meeting_event(
    cycle: u32,
    when: Option<DateTime<FixedOffset>>,
    now: DateTime<FixedOffset>,
    tz: &Tz,
) -> Option<RawEvent> {
    let start = match when {
        Some(start) => start,
        None => next_sunday_evening(now, tz)?,
    };
    let end = start + Duration::minutes(MEETING_LENGTH_MINUTES);

    Some(RawEvent {
        title: Some(format!("Family Meeting - Week {}", cycle)),
        description: Some(
            "Weekly family meeting to discuss task balance and set goals for the coming week."
                .to_string(),
        ),
        start: Some(time_block(start)),
        end: Some(time_block(end)),
        category: Some("meeting".to_string()),
        event_type: Some("meeting".to_string()),
        linked_entity: Some(LinkedEntity::new("meeting", cycle.to_string())),
        source: Some("system".to_string()),
        ..Default::default()
    })
}

/// Due-date events for open tasks. Date-only due dates land at 10:00 local.
pub fn task_due_events(tasks: &[FamilyTask], tz: &Tz) -> Vec<RawEvent> {
    tasks
        .iter()
        .filter(|task| !task.completed)
        .filter_map(|task| {
            let due = task.due_date.as_deref()?;
            let start = match NaiveDate::parse_from_str(due.trim(), "%Y-%m-%d") {
                Ok(date) => localize(&date.and_time(NaiveTime::from_hms_opt(10, 0, 0)?), tz)?,
                Err(_) => parse_timestamp(due, tz)?,
            };

            debug!("Task {} due at {}", task.id, start);

            Some(RawEvent {
                title: Some(format!("{} (due)", task.title)),
                description: task.description.clone(),
                start: Some(time_block(start)),
                end: Some(time_block(start + Duration::hours(1))),
                category: Some("task".to_string()),
                event_type: Some("task".to_string()),
                assigned_to: task.assigned_to.clone(),
                assigned_to_name: task.assigned_to_name.clone(),
                linked_entity: Some(LinkedEntity::new("task", task.id.clone())),
                source: Some("task-system".to_string()),
                ..Default::default()
            })
        })
        .collect()
}
