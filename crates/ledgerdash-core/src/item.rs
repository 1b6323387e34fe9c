use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::{reminder_date_serde, reminder_time_serde};

pub const DEFAULT_TODO_CATEGORY: &str = "finance";

/// Fresh opaque item id.
pub fn new_item_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReminderCategory {
    #[default]
    Bill,
    Investment,
    Tax,
    Budget,
    Other,
}

impl ReminderCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bill => "bill",
            Self::Investment => "investment",
            Self::Tax => "tax",
            Self::Budget => "budget",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ReminderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TodoItem {
    pub id: String,

    pub text: String,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default = "default_todo_category")]
    pub category: String,
}

fn default_todo_category() -> String {
    DEFAULT_TODO_CATEGORY.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReminderItem {
    pub id: String,

    pub title: String,

    #[serde(with = "reminder_date_serde")]
    pub date: NaiveDate,

    #[serde(with = "reminder_time_serde")]
    pub time: NaiveTime,

    #[serde(default)]
    pub category: ReminderCategory,

    #[serde(default)]
    pub completed: bool,
}

impl ReminderItem {
    /// Wall-clock instant the reminder targets.
    pub fn due_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub content: String,
    pub role: ChatRole,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: String, now: DateTime<Utc>) -> Self {
        Self {
            id: new_item_id(),
            content,
            role,
            timestamp: now,
        }
    }
}
