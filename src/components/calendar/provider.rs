use super::models::{AddEventOutcome, EventPatch, FamilyMember, FamilyTask, RawEvent};
use crate::error::{directory_error, provider_error, CalendarResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::info;

/// External calendar provider (Google, Apple, Outlook)
#[async_trait]
pub trait EventProvider: Send + Sync {
    /// Fetch raw events for a principal within a date range
    async fn fetch_events(
        &self,
        principal_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> CalendarResult<Vec<RawEvent>>;
}

/// Family members for attendee resolution
#[async_trait]
pub trait FamilyDirectory: Send + Sync {
    async fn list_members(&self, family_id: &str) -> CalendarResult<Vec<FamilyMember>>;
}

/// Tasks whose due dates become calendar events
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn list_tasks(&self, family_id: &str) -> CalendarResult<Vec<FamilyTask>>;
}

/// Persistence of user-authored events
#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn add_event(&self, event: RawEvent) -> CalendarResult<AddEventOutcome>;
    async fn delete_event(&self, id: &str) -> CalendarResult<bool>;
    async fn update_event(&self, id: &str, patch: EventPatch) -> CalendarResult<bool>;
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> CalendarResult<T> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Provider backed by a JSON array of raw events on disk
#[derive(Debug, Clone)]
pub struct JsonFileProvider {
    path: PathBuf,
}

impl JsonFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EventProvider for JsonFileProvider {
    async fn fetch_events(
        &self,
        principal_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> CalendarResult<Vec<RawEvent>> {
        let value: serde_json::Value = read_json(&self.path).await.map_err(|e| {
            provider_error(&format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        let events = RawEvent::parse_batch(value);

        info!(
            "Read {} provider events for {} ({} to {}) from {}",
            events.len(),
            principal_id,
            start,
            end,
            self.path.display()
        );

        Ok(events)
    }
}

/// Directory backed by a JSON array of members on disk
#[derive(Debug, Clone)]
pub struct JsonFileDirectory {
    path: PathBuf,
}

impl JsonFileDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FamilyDirectory for JsonFileDirectory {
    async fn list_members(&self, family_id: &str) -> CalendarResult<Vec<FamilyMember>> {
        let members: Vec<FamilyMember> = read_json(&self.path).await.map_err(|e| {
            directory_error(&format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        info!("Loaded {} members for family {}", members.len(), family_id);
        Ok(members)
    }
}

/// Task list backed by a JSON array on disk
#[derive(Debug, Clone)]
pub struct JsonFileTasks {
    path: PathBuf,
}

impl JsonFileTasks {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TaskSource for JsonFileTasks {
    async fn list_tasks(&self, family_id: &str) -> CalendarResult<Vec<FamilyTask>> {
        let tasks: Vec<FamilyTask> = read_json(&self.path).await?;
        info!("Loaded {} tasks for family {}", tasks.len(), family_id);
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::calendar::models::MemberRole;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("famcal-{}-{}", uuid::Uuid::new_v4(), name));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_json_file_provider() {
        let path = temp_file(
            "events.json",
            r#"[{ "id": "g1", "summary": "Dentist", "start": { "date": "2024-05-01" } }, 5]"#,
        );
        let provider = JsonFileProvider::new(&path);
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        let events = provider.fetch_events("user", day, day).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].summary.as_deref(), Some("Dentist"));

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_provider_error() {
        let provider = JsonFileProvider::new("/nonexistent/famcal/events.json");
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let result = provider.fetch_events("user", day, day).await;
        assert!(matches!(result, Err(crate::error::Error::Provider(_))));
    }

    #[tokio::test]
    async fn test_json_file_directory() {
        let path = temp_file(
            "members.json",
            r#"[
                { "id": "p1", "name": "Anna", "role": "parent", "profilePicture": "anna.png" },
                { "id": "c1", "name": "Mia", "role": "child" }
            ]"#,
        );
        let directory = JsonFileDirectory::new(&path);
        let members = directory.list_members("fam").await.unwrap();

        assert_eq!(members.len(), 2);
        assert_eq!(members[0].picture_ref.as_deref(), Some("anna.png"));
        assert_eq!(members[1].role, MemberRole::Child);
        assert_eq!(members[1].picture_ref, None);

        std::fs::remove_file(path).unwrap();
    }
}
