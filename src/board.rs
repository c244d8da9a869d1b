// src/board.rs

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;

use crate::app_state::AppState;
use crate::error::AppResult;
use crate::models::{Task, TaskStatus};
use crate::workspace::Workspace;

/// One kanban column and the company tasks currently in it.
#[derive(Debug, Serialize)]
pub struct BoardColumn {
    pub title: &'static str,
    pub status: TaskStatus,
    pub count: usize,
    pub tasks: Vec<Task>,
}

pub fn column_title(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "BACKLOG",
        TaskStatus::InProgress => "IN FLIGHT",
        TaskStatus::Review => "REVIEW",
        TaskStatus::Done => "STAGED",
    }
}

impl Workspace {
    /// The kanban view over every task of the acting user's company, one
    /// column per status in workflow order.
    pub fn board(&self) -> AppResult<Vec<BoardColumn>> {
        let company_id = self.company_id()?;
        Ok(TaskStatus::ALL
            .into_iter()
            .map(|status| {
                let tasks: Vec<Task> = self
                    .tasks
                    .iter()
                    .filter(|t| t.status == status && self.task_in_company(t, &company_id))
                    .cloned()
                    .collect();
                BoardColumn {
                    title: column_title(status),
                    status,
                    count: tasks.len(),
                    tasks,
                }
            })
            .collect())
    }
}

/// GET /board
pub async fn get_board(req: HttpRequest, data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let ws = data.authorized(&req).await?;
    Ok(HttpResponse::Ok().json(ws.board()?))
}
