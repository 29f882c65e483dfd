use crate::components::calendar::conflicts::{ConflictRules, DurationRule};
use crate::error::{config_error, env_error, CalendarResult};
use chrono::Duration;
use chrono_tz::Tz;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;

/// Default refresh interval for the calendar widget, in seconds
pub const DEFAULT_REFRESH_INTERVAL: u64 = 30;

/// Longest fetch window in either direction, in days
pub const MAX_FETCH_DAYS: i64 = 3650;

/// Largest conflict buffer, in minutes
pub const MAX_CONFLICT_BUFFER_MINUTES: i64 = 24 * 60;

/// Path of the optional tuning file
pub const ENGINE_CONFIG_PATH: &str = "config/engine.toml";

/// Tuning values read from `config/engine.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// How many days back the provider fetch window reaches
    pub fetch_days_back: i64,
    /// How many days ahead the provider fetch window reaches
    pub fetch_days_ahead: i64,
    /// Number of events in the upcoming view
    pub upcoming_limit: usize,
    /// Duration rule used by conflict detection
    pub conflict_duration: DurationRule,
    /// Buffer around each event window, in minutes
    pub conflict_buffer_minutes: i64,
    /// Current family meeting cycle (week number)
    pub meeting_cycle: u32,
    /// Map of component names to their enabled status
    pub components: HashMap<String, bool>,
}

impl EngineSettings {
    /// Reject values that would overflow date arithmetic
    fn validate(&self) -> CalendarResult<()> {
        let days = 0..=MAX_FETCH_DAYS;
        if !days.contains(&self.fetch_days_back) {
            return Err(config_error(&format!(
                "fetch_days_back must be between 0 and {}",
                MAX_FETCH_DAYS
            )));
        }
        if !days.contains(&self.fetch_days_ahead) {
            return Err(config_error(&format!(
                "fetch_days_ahead must be between 0 and {}",
                MAX_FETCH_DAYS
            )));
        }
        if !(0..=MAX_CONFLICT_BUFFER_MINUTES).contains(&self.conflict_buffer_minutes) {
            return Err(config_error(&format!(
                "conflict_buffer_minutes must be between 0 and {}",
                MAX_CONFLICT_BUFFER_MINUTES
            )));
        }
        Ok(())
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        let mut components = HashMap::new();
        components.insert("calendar_sync".to_string(), true);

        Self {
            fetch_days_back: 30,
            fetch_days_ahead: 60,
            upcoming_limit: 5,
            conflict_duration: DurationRule::SyntheticHour,
            conflict_buffer_minutes: 60,
            meeting_cycle: 1,
            components,
        }
    }
}

/// Main configuration structure for the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Family whose directory and tasks are loaded
    pub family_id: String,
    /// Principal whose provider calendar is fetched
    pub principal_id: String,
    /// IANA timezone used for naive timestamps and calendar days
    pub timezone: String,
    /// Seconds between periodic refreshes
    pub refresh_interval_secs: u64,
    /// Directory holding the JSON fixtures read by the file-backed collaborators
    pub data_dir: String,
    /// Engine tuning
    pub settings: EngineSettings,
}

impl Config {
    /// Load configuration from environment and config file
    pub fn load() -> CalendarResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let settings = fs::read_to_string(ENGINE_CONFIG_PATH).ok();
        Self::from_sources(|key| env::var(key).ok(), settings.as_deref())
    }

    /// Build the configuration from a variable lookup and optional TOML settings
    pub fn from_sources<F>(lookup: F, settings_toml: Option<&str>) -> CalendarResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let family_id = lookup("FAMCAL_FAMILY_ID").ok_or_else(|| env_error("FAMCAL_FAMILY_ID"))?;
        let principal_id =
            lookup("FAMCAL_PRINCIPAL_ID").ok_or_else(|| env_error("FAMCAL_PRINCIPAL_ID"))?;

        let timezone = lookup("FAMCAL_TIMEZONE").unwrap_or_else(|| String::from("UTC"));

        let refresh_interval_secs = match lookup("FAMCAL_REFRESH_INTERVAL") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| config_error("Invalid FAMCAL_REFRESH_INTERVAL format"))?,
            None => DEFAULT_REFRESH_INTERVAL,
        };

        let data_dir = lookup("FAMCAL_DATA_DIR").unwrap_or_else(|| String::from("data"));

        let settings = match settings_toml {
            Some(content) => {
                let mut settings: EngineSettings = toml::from_str(content)?;
                // Keep default components that the file does not mention
                for (key, value) in EngineSettings::default().components {
                    settings.components.entry(key).or_insert(value);
                }
                settings
            }
            None => EngineSettings::default(),
        };

        let config = Config {
            family_id,
            principal_id,
            timezone,
            refresh_interval_secs,
            data_dir,
            settings,
        };

        // Fail early on an unknown zone
        config.tz()?;
        config.settings.validate()?;

        Ok(config)
    }

    /// Parsed timezone
    pub fn tz(&self) -> CalendarResult<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| config_error(&format!("Unknown timezone: {}", self.timezone)))
    }

    /// Conflict rules derived from the settings
    pub fn conflict_rules(&self) -> ConflictRules {
        ConflictRules {
            duration: self.settings.conflict_duration,
            buffer: Duration::minutes(
                self.settings
                    .conflict_buffer_minutes
                    .clamp(0, MAX_CONFLICT_BUFFER_MINUTES),
            ),
        }
    }

    /// Check if a component is enabled
    pub fn is_component_enabled(&self, name: &str) -> bool {
        *self.settings.components.get(name).unwrap_or(&false)
    }
}
