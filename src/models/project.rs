use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Priority;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub company_id: String,
    pub manager_id: String,
    pub created_at: NaiveDate,
    #[serde(default)]
    pub priority: Priority,
}
