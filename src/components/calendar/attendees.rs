use super::models::{Attendee, AttendingParent, CanonicalEvent, FamilyMember, MemberRole};
use tracing::debug;

/// Ordered attendee list with id de-duplication
#[derive(Debug, Default)]
struct AttendeeList {
    attendees: Vec<Attendee>,
}

impl AttendeeList {
    fn push(&mut self, attendee: Attendee) {
        if !self.attendees.iter().any(|a| a.id == attendee.id) {
            self.attendees.push(attendee);
        }
    }
}

fn placeholder(prefix: &str, name: &str, role: MemberRole) -> Attendee {
    Attendee {
        id: format!("{}-{}", prefix, name),
        name: name.to_string(),
        picture_ref: None,
        role,
    }
}

fn find_by_id<'a>(directory: &'a [FamilyMember], id: &str) -> Option<&'a FamilyMember> {
    directory.iter().find(|m| m.id == id)
}

fn find_by_name<'a>(
    directory: &'a [FamilyMember],
    name: &str,
    role: Option<MemberRole>,
) -> Option<&'a FamilyMember> {
    directory
        .iter()
        .filter(|m| role.map_or(true, |r| m.role == r))
        .find(|m| m.name.eq_ignore_ascii_case(name.trim()))
}

/// Expand an event's child, sibling, parent and host references into attendees.
///
/// Family-wide categories (meetings, general events) without a child reference
/// invite the whole directory. Unresolved children and hosts become
/// placeholders rather than being dropped.
pub fn resolve_attendees(event: &CanonicalEvent, directory: &[FamilyMember]) -> Vec<Attendee> {
    if event.category.is_family_wide() && event.child.is_none() {
        return directory.iter().map(Attendee::from).collect();
    }

    let mut list = AttendeeList::default();

    // Child
    if let Some(child) = &event.child {
        let member = child
            .id
            .as_deref()
            .and_then(|id| find_by_id(directory, id))
            .or_else(|| {
                child
                    .name
                    .as_deref()
                    .and_then(|name| find_by_name(directory, name, Some(MemberRole::Child)))
            });

        match (member, child.name.as_deref()) {
            (Some(member), _) => list.push(member.into()),
            (None, Some(name)) => {
                debug!("Child \"{}\" not in directory, using placeholder", name);
                list.push(placeholder("child", name, MemberRole::Child));
            }
            (None, None) => {
                if let Some(id) = child.id.as_deref() {
                    debug!("Child id {} not in directory and no name to show", id);
                }
            }
        }
    }

    // Siblings
    if !event.sibling_ids.is_empty() {
        for (index, id) in event.sibling_ids.iter().enumerate() {
            match find_by_id(directory, id) {
                Some(member) => list.push(member.into()),
                None => {
                    let name = event.sibling_names.get(index).unwrap_or(id);
                    list.push(placeholder("child", name, MemberRole::Child));
                }
            }
        }
    } else {
        for name in &event.sibling_names {
            match find_by_name(directory, name, Some(MemberRole::Child)) {
                Some(member) => list.push(member.into()),
                None => list.push(placeholder("child", name, MemberRole::Child)),
            }
        }
    }

    // Attending parent
    match &event.attending_parent {
        AttendingParent::Both => directory
            .iter()
            .filter(|m| m.role == MemberRole::Parent)
            .for_each(|m| list.push(m.into())),
        AttendingParent::Specific(id) => match find_by_id(directory, id) {
            Some(member) => list.push(member.into()),
            None => debug!("Attending parent {} not in directory", id),
        },
        AttendingParent::Undecided | AttendingParent::None => {}
    }

    // Host
    if let Some(host) = &event.host_parent_name {
        match find_by_name(directory, host, Some(MemberRole::Parent)) {
            Some(member) => list.push(member.into()),
            None => list.push(placeholder("host", host, MemberRole::Host)),
        }
    }

    list.attendees
}

/// Replace each event's attendee list with the resolved one
pub fn resolve_all(events: &mut [CanonicalEvent], directory: &[FamilyMember]) {
    for event in events.iter_mut() {
        event.attendees = resolve_attendees(event, directory);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::calendar::models::{ChildRef, EventCategory, EventSource, RawEvent};
    use crate::components::calendar::normalize::{normalize, NormalizeOptions};

    fn member(id: &str, name: &str, role: MemberRole) -> FamilyMember {
        FamilyMember {
            id: id.to_string(),
            name: name.to_string(),
            role,
            picture_ref: Some(format!("{}.png", id)),
        }
    }

    fn directory() -> Vec<FamilyMember> {
        vec![
            member("p1", "Anna", MemberRole::Parent),
            member("p2", "Ben", MemberRole::Parent),
            member("c1", "Mia", MemberRole::Child),
            member("c2", "Leo", MemberRole::Child),
        ]
    }

    fn base_event(category: &str) -> CanonicalEvent {
        let raw = RawEvent {
            title: Some("Event".to_string()),
            date: Some("2024-05-01".to_string()),
            category: Some(category.to_string()),
            ..Default::default()
        };
        normalize(&raw, EventSource::Manual, &NormalizeOptions::default())
    }

    fn ids(attendees: &[Attendee]) -> Vec<&str> {
        attendees.iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn test_meeting_invites_everyone() {
        let event = base_event("meeting");
        let attendees = resolve_attendees(&event, &directory());
        assert_eq!(ids(&attendees), vec!["p1", "p2", "c1", "c2"]);
    }

    #[test]
    fn test_precedence_and_dedup() {
        let mut event = base_event("appointment");
        event.child = Some(ChildRef {
            id: Some("c1".to_string()),
            name: Some("Mia".to_string()),
        });
        event.sibling_ids = vec!["c2".to_string(), "c1".to_string()];
        event.attending_parent = AttendingParent::Specific("p2".to_string());
        event.host_parent_name = Some("anna".to_string());

        let attendees = resolve_attendees(&event, &directory());
        assert_eq!(ids(&attendees), vec!["c1", "c2", "p2", "p1"]);
    }

    #[test]
    fn test_child_by_name_and_placeholder() {
        let mut event = base_event("activity");
        event.child = Some(ChildRef {
            id: None,
            name: Some("leo".to_string()),
        });
        event.sibling_names = vec!["Ella".to_string()];
        let attendees = resolve_attendees(&event, &directory());
        assert_eq!(ids(&attendees), vec!["c2", "child-Ella"]);
        assert_eq!(attendees[1].role, MemberRole::Child);
        assert_eq!(attendees[1].picture_ref, None);
    }

    #[test]
    fn test_both_parents_and_undecided() {
        let mut event = base_event("birthday");
        event.attending_parent = AttendingParent::Both;
        assert_eq!(ids(&resolve_attendees(&event, &directory())), vec!["p1", "p2"]);

        event.attending_parent = AttendingParent::Undecided;
        assert!(resolve_attendees(&event, &directory()).is_empty());
    }

    #[test]
    fn test_host_placeholder() {
        let mut event = base_event("birthday");
        event.host_parent_name = Some("Carol".to_string());
        let attendees = resolve_attendees(&event, &directory());
        assert_eq!(attendees.len(), 1);
        assert_eq!(attendees[0].id, "host-Carol");
        assert_eq!(attendees[0].role, MemberRole::Host);
    }

    #[test]
    fn test_general_event_with_child_goes_through_resolution() {
        let mut event = base_event("general");
        assert_eq!(event.category, EventCategory::General);
        event.child = Some(ChildRef {
            id: Some("c1".to_string()),
            name: None,
        });
        assert_eq!(ids(&resolve_attendees(&event, &directory())), vec!["c1"]);
    }

    #[test]
    fn test_deterministic() {
        let mut event = base_event("activity");
        event.sibling_names = vec!["Mia".to_string(), "Zoe".to_string()];
        event.attending_parent = AttendingParent::Both;
        let first = resolve_attendees(&event, &directory());
        let second = resolve_attendees(&event, &directory());
        assert_eq!(first, second);
    }
}
