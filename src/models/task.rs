use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Priority;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Review,
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Review,
        TaskStatus::Done,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub assigned_to: Vec<String>,
    pub status: TaskStatus,
    pub due_date: NaiveDate,
    pub created_at: NaiveDate,
    #[serde(default)]
    pub priority: Priority,
    /// Minutes before the due date at which the assignees want a reminder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_before: Option<u32>,
}

impl Task {
    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }

    pub fn is_assigned_to(&self, user_id: &str) -> bool {
        self.assigned_to.iter().any(|id| id == user_id)
    }
}
