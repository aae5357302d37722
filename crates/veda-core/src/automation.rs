//! Background automation data served by the backend.
//!
//! Nothing here has client-side identity: every list is whatever the backend
//! returned on the latest fetch.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub priority: String,
    pub message: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: i64,
    pub name: String,
    pub command: String,
    pub schedule_type: String,
    #[serde(default)]
    pub schedule_value: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub run_count: u64,
    #[serde(default)]
    pub last_run: Option<String>,
    #[serde(default)]
    pub next_run: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleType {
    Once,
    Daily,
    Weekly,
    Interval,
    Conditional,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::Once => "once",
            ScheduleType::Daily => "daily",
            ScheduleType::Weekly => "weekly",
            ScheduleType::Interval => "interval",
            ScheduleType::Conditional => "conditional",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "once" => Some(ScheduleType::Once),
            "daily" => Some(ScheduleType::Daily),
            "weekly" => Some(ScheduleType::Weekly),
            "interval" => Some(ScheduleType::Interval),
            "conditional" => Some(ScheduleType::Conditional),
            _ => None,
        }
    }

    pub fn all() -> Vec<ScheduleType> {
        vec![
            ScheduleType::Once,
            ScheduleType::Daily,
            ScheduleType::Weekly,
            ScheduleType::Interval,
            ScheduleType::Conditional,
        ]
    }
}

/// Body of a task creation request. The backend assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTask {
    pub name: String,
    pub command: String,
    pub schedule_type: String,
    pub schedule_value: String,
    pub enabled: bool,
}

impl NewTask {
    /// Parse `name | command | schedule_type | schedule_value`.
    pub fn parse(line: &str) -> Result<Self, String> {
        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        let [name, command, schedule_type, schedule_value] = parts.as_slice() else {
            return Err("Use: name | command | schedule_type | schedule_value".to_string());
        };
        if name.is_empty() || command.is_empty() {
            return Err("Task name and command are required".to_string());
        }
        let schedule_type = ScheduleType::from_str(schedule_type).ok_or_else(|| {
            let kinds: Vec<&str> = ScheduleType::all().iter().map(|k| k.as_str()).collect();
            format!("Schedule type must be one of: {}", kinds.join(", "))
        })?;

        Ok(Self {
            name: name.to_string(),
            command: command.to_string(),
            schedule_type: schedule_type.as_str().to_string(),
            schedule_value: schedule_value.to_string(),
            enabled: true,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shortcut {
    pub name: String,
    pub command: String,
}

impl Shortcut {
    /// Parse `name | command`.
    pub fn parse(line: &str) -> Result<Self, String> {
        match line.split_once('|') {
            Some((name, command)) if !name.trim().is_empty() && !command.trim().is_empty() => {
                Ok(Self {
                    name: name.trim().to_string(),
                    command: command.trim().to_string(),
                })
            }
            _ => Err("Use: name | command".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct CurrentContext {
    #[serde(default)]
    pub time_of_day: String,
    #[serde(default)]
    pub hour: u8,
    #[serde(default)]
    pub day_of_week: String,
    #[serde(default)]
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LikelyApp {
    pub app: String,
    #[serde(default)]
    pub frequency: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub likely_apps: Vec<LikelyApp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FrequentTask {
    pub command: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub last_used: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ContextSnapshot {
    #[serde(default)]
    pub current_context: CurrentContext,
    #[serde(default)]
    pub prediction: Prediction,
    #[serde(default)]
    pub frequent_tasks: Vec<FrequentTask>,
}
