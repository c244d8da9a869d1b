// src/dashboard_data.rs

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{Local, Timelike};
use serde::Serialize;

use crate::app_state::AppState;
use crate::error::AppResult;
use crate::models::{Task, TaskStatus};
use crate::workspace::Workspace;

const WORKLOAD_MEMBERS: usize = 4;
const FOCUS_TASKS: usize = 3;

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub projects: usize,
    pub tasks: usize,
    pub finished_tasks: usize,
    pub members: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusCount {
    pub label: &'static str,
    pub status: TaskStatus,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberLoad {
    pub user_id: String,
    pub name: String,
    pub position: String,
    pub assigned: usize,
    pub completed: usize,
}

#[derive(Debug, Serialize)]
#[serde(tag = "view", rename_all = "camelCase")]
pub enum Dashboard {
    #[serde(rename_all = "camelCase")]
    Admin {
        greeting: String,
        totals: Totals,
        status_breakdown: Vec<StatusCount>,
        workload: Vec<MemberLoad>,
    },
    #[serde(rename_all = "camelCase")]
    Member {
        greeting: String,
        focus_tasks: Vec<Task>,
        assigned: usize,
        completed: usize,
    },
}

/// Helper: salutation for the given hour of day.
pub fn greeting(hour: u32, full_name: &str) -> String {
    let part = if hour < 12 {
        "Good morning"
    } else if hour < 18 {
        "Good afternoon"
    } else {
        "Good evening"
    };
    let first = full_name.split_whitespace().next().unwrap_or("Member");
    format!("{part}, {first}")
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "To Do",
        TaskStatus::InProgress => "Doing",
        TaskStatus::Review => "Review",
        TaskStatus::Done => "Done",
    }
}

impl Workspace {
    /// Builds the acting user's dashboard. Admins get company-wide figures,
    /// members get their own open work.
    pub fn dashboard(&self, hour: u32) -> AppResult<Dashboard> {
        let me = self.acting_user()?;
        let company_id = me.company_id.clone();
        let greeting = greeting(hour, &me.name);

        // 1) Company tasks, in insertion order
        let company_tasks: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| self.task_in_company(t, &company_id))
            .collect();

        if !me.is_admin() {
            let mine: Vec<&Task> = company_tasks
                .into_iter()
                .filter(|t| t.is_assigned_to(&me.id))
                .collect();
            return Ok(Dashboard::Member {
                greeting,
                focus_tasks: mine
                    .iter()
                    .filter(|t| !t.is_done())
                    .take(FOCUS_TASKS)
                    .map(|t| (*t).clone())
                    .collect(),
                assigned: mine.len(),
                completed: mine.iter().filter(|t| t.is_done()).count(),
            });
        }

        // 2) Totals
        let members: Vec<_> = self.users.iter().filter(|u| u.company_id == company_id).collect();
        let totals = Totals {
            projects: self.projects.iter().filter(|p| p.company_id == company_id).count(),
            tasks: company_tasks.len(),
            finished_tasks: company_tasks.iter().filter(|t| t.is_done()).count(),
            members: members.len(),
        };

        // 3) Status breakdown
        let status_breakdown = TaskStatus::ALL
            .into_iter()
            .map(|status| StatusCount {
                label: status_label(status),
                status,
                count: company_tasks.iter().filter(|t| t.status == status).count(),
            })
            .collect();

        // 4) Workload of the first few members
        let workload = members
            .iter()
            .take(WORKLOAD_MEMBERS)
            .map(|m| {
                let assigned: Vec<_> = company_tasks.iter().filter(|t| t.is_assigned_to(&m.id)).collect();
                MemberLoad {
                    user_id: m.id.clone(),
                    name: m.name.clone(),
                    position: m.position.clone(),
                    assigned: assigned.len(),
                    completed: assigned.iter().filter(|t| t.is_done()).count(),
                }
            })
            .collect();

        Ok(Dashboard::Admin {
            greeting,
            totals,
            status_breakdown,
            workload,
        })
    }
}

/// GET /dashboard
pub async fn get_dashboard(req: HttpRequest, data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let ws = data.authorized(&req).await?;
    Ok(HttpResponse::Ok().json(ws.dashboard(Local::now().hour())?))
}
