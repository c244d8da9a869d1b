// src/project.rs

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::app_state::{AppState, SearchQuery};
use crate::error::{AppError, AppResult};
use crate::models::{Priority, Project};
use crate::store::StoreKey;
use crate::workspace::{fresh_id, matches_search, Workspace};

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
}

/// A project together with its completion figures.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub task_count: usize,
    pub done_count: usize,
    /// Finished tasks as a whole percentage, 0 for a project with no tasks.
    pub progress: u8,
}

pub(crate) fn progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        0
    } else {
        ((done as f64 / total as f64) * 100.0).round() as u8
    }
}

impl Workspace {
    fn summarize(&self, project: &Project) -> ProjectSummary {
        let (task_count, done_count) = self
            .tasks
            .iter()
            .filter(|t| t.project_id == project.id)
            .fold((0, 0), |(total, done), t| (total + 1, done + usize::from(t.is_done())));
        ProjectSummary {
            project: project.clone(),
            task_count,
            done_count,
            progress: progress(done_count, task_count),
        }
    }

    /// Only admins create projects; the project lands in their company with
    /// them as manager.
    pub fn create_project(&mut self, req: CreateProjectRequest) -> AppResult<Project> {
        let admin = self.require_admin()?;
        if req.name.trim().is_empty() {
            return Err(AppError::validation("Project name is required"));
        }
        let (company_id, manager_id) = (admin.company_id.clone(), admin.id.clone());

        let project = Project {
            id: fresh_id("p-", |id| self.projects.iter().any(|p| p.id == id))?,
            name: req.name.trim().to_string(),
            description: req.description.trim().to_string(),
            company_id,
            manager_id,
            created_at: Utc::now().date_naive(),
            priority: req.priority,
        };
        self.projects.push(project.clone());
        self.touch(StoreKey::Projects);
        info!("Project created {} in {}", project.id, project.company_id);
        Ok(project)
    }

    pub fn company_projects(&self, search: Option<&str>) -> AppResult<Vec<ProjectSummary>> {
        let company_id = self.company_id()?;
        Ok(self
            .projects
            .iter()
            .filter(|p| p.company_id == company_id && matches_search(&[p.name.as_str()], search))
            .map(|p| self.summarize(p))
            .collect())
    }

    pub fn project_detail(&self, project_id: &str) -> AppResult<ProjectSummary> {
        let project = self.company_project(project_id)?;
        Ok(self.summarize(project))
    }
}

/// POST /projects
pub async fn create_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_info: web::Json<CreateProjectRequest>,
) -> AppResult<HttpResponse> {
    debug!("Received create_project request: {:?}", project_info);
    let mut ws = data.authorized(&req).await?;
    let project = ws.create_project(project_info.into_inner())?;
    data.commit(&mut ws).await?;
    Ok(HttpResponse::Created().json(project))
}

/// GET /projects?search=
pub async fn list_projects(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<SearchQuery>,
) -> AppResult<HttpResponse> {
    let ws = data.authorized(&req).await?;
    Ok(HttpResponse::Ok().json(ws.company_projects(query.term())?))
}

/// GET /projects/{project_id}
pub async fn get_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let ws = data.authorized(&req).await?;
    Ok(HttpResponse::Ok().json(ws.project_detail(&project_id)?))
}
