// team_management.rs

use std::collections::HashSet;

use actix_web::{web, HttpRequest, HttpResponse};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::app_state::{AppState, SearchQuery};
use crate::auth::valid_email;
use crate::error::{AppError, AppResult};
use crate::models::user::PublicUser;
use crate::models::{Role, User};
use crate::store::StoreKey;
use crate::workspace::{fresh_id, matches_search, Workspace};

// ─── DATA STRUCTURES ───────────────────────────────────────────────────────────

/// A directory entry: the member plus their current workload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    #[serde(flatten)]
    pub user: PublicUser,
    pub active_tasks: usize,
    pub project_count: usize,
}

// ─── REQUEST PAYLOADS ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NewMemberRequest {
    pub name: String,
    pub position: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRequest {
    pub name: String,
    pub position: String,
    pub email: String,
    pub role: Role,
    /// Replaces the member's password when present and non-blank.
    #[serde(default)]
    pub password: Option<String>,
}

fn check_member_fields(name: &str, position: &str, email: &str) -> AppResult<()> {
    if name.trim().is_empty() || position.trim().is_empty() || email.trim().is_empty() {
        return Err(AppError::validation("Please fill in all details."));
    }
    if !valid_email(email) {
        return Err(AppError::validation("Email address is not valid"));
    }
    Ok(())
}

// ─── OPERATIONS ───────────────────────────────────────────────────────────────

impl Workspace {
    /// Active (not finished) task count and number of distinct projects the
    /// member has tasks in, counted inside the acting user's company.
    pub(crate) fn workload(&self, member_id: &str, company_id: &str) -> (usize, usize) {
        let mut active = 0;
        let mut projects = HashSet::new();
        for task in self
            .tasks
            .iter()
            .filter(|t| t.is_assigned_to(member_id) && self.task_in_company(t, company_id))
        {
            if !task.is_done() {
                active += 1;
            }
            projects.insert(task.project_id.as_str());
        }
        (active, projects.len())
    }

    /// Members of the acting user's company, optionally filtered by a
    /// case-insensitive search over name and position.
    pub fn team_directory(&self, search: Option<&str>) -> AppResult<Vec<MemberInfo>> {
        let company_id = self.company_id()?;
        Ok(self
            .users
            .iter()
            .filter(|u| u.company_id == company_id)
            .filter(|u| matches_search(&[u.name.as_str(), u.position.as_str()], search))
            .map(|u| {
                let (active_tasks, project_count) = self.workload(&u.id, &company_id);
                MemberInfo {
                    user: PublicUser::from(u),
                    active_tasks,
                    project_count,
                }
            })
            .collect())
    }

    /// Invites an operator into the admin's company. New members start offline.
    pub fn add_member(&mut self, req: NewMemberRequest) -> AppResult<User> {
        let company_id = self.require_admin()?.company_id.clone();
        check_member_fields(&req.name, &req.position, &req.email)?;
        if req.password.trim().is_empty() {
            return Err(AppError::validation("Please fill in all details."));
        }
        if self.email_taken(&req.email, None) {
            return Err(AppError::Conflict("An account with this email already exists".into()));
        }

        let member = User {
            id: fresh_id("u-", |id| self.user(id).is_some())?,
            name: req.name.trim().to_string(),
            email: req.email.trim().to_string(),
            password: self.hash_password(&req.password)?,
            role: req.role,
            company_id,
            position: req.position.trim().to_string(),
            avatar: None,
            is_online: Some(false),
        };
        self.users.push(member.clone());
        self.touch(StoreKey::Team);
        info!("Added member {} to {}", member.id, member.company_id);
        Ok(member)
    }

    pub fn update_member(&mut self, member_id: &str, req: UpdateMemberRequest) -> AppResult<User> {
        self.require_admin()?;
        self.company_member(member_id)?;
        check_member_fields(&req.name, &req.position, &req.email)?;
        if self.email_taken(&req.email, Some(member_id)) {
            return Err(AppError::Conflict("An account with this email already exists".into()));
        }
        let password = match req.password.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => Some(self.hash_password(p)?),
            _ => None,
        };

        let member = self
            .user_mut(member_id)
            .ok_or_else(|| AppError::not_found("Member"))?;
        member.name = req.name.trim().to_string();
        member.position = req.position.trim().to_string();
        member.email = req.email.trim().to_string();
        member.role = req.role;
        if let Some(hash) = password {
            member.password = hash;
        }
        let updated = member.clone();
        self.touch(StoreKey::Team);
        debug!("Updated member {}", member_id);
        Ok(updated)
    }

    /// Removes a member from the roster. Their task assignments are handed
    /// to the acting admin wherever they were the only assignee.
    pub fn remove_member(&mut self, member_id: &str) -> AppResult<()> {
        let admin_id = self.require_admin()?.id.clone();
        if member_id == admin_id || self.session.real_id() == Some(member_id) {
            return Err(AppError::forbidden("You cannot terminate your own clearance."));
        }
        self.company_member(member_id)?;

        self.users.retain(|u| u.id != member_id);
        let mut reassigned = false;
        for task in self.tasks.iter_mut().filter(|t| t.is_assigned_to(member_id)) {
            task.assigned_to.retain(|id| id != member_id);
            if task.assigned_to.is_empty() {
                task.assigned_to.push(admin_id.clone());
            }
            reassigned = true;
        }
        self.touch(StoreKey::Team);
        if reassigned {
            self.touch(StoreKey::Tasks);
        }
        info!("Removed member {}", member_id);
        Ok(())
    }
}

// ─── ENDPOINTS ────────────────────────────────────────────────────────────────

/// GET /team?search=
pub async fn get_team_members(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<SearchQuery>,
) -> AppResult<HttpResponse> {
    let ws = data.authorized(&req).await?;
    Ok(HttpResponse::Ok().json(ws.team_directory(query.term())?))
}

/// POST /team
pub async fn add_member(
    req: HttpRequest,
    data: web::Data<AppState>,
    member_info: web::Json<NewMemberRequest>,
) -> AppResult<HttpResponse> {
    let mut ws = data.authorized(&req).await?;
    let member = ws.add_member(member_info.into_inner())?;
    data.commit(&mut ws).await?;
    Ok(HttpResponse::Created().json(PublicUser::from(&member)))
}

/// PUT /team/{user_id}
pub async fn update_member(
    req: HttpRequest,
    data: web::Data<AppState>,
    user_id: web::Path<String>,
    member_info: web::Json<UpdateMemberRequest>,
) -> AppResult<HttpResponse> {
    let mut ws = data.authorized(&req).await?;
    let member = ws.update_member(&user_id, member_info.into_inner())?;
    data.commit(&mut ws).await?;
    Ok(HttpResponse::Ok().json(PublicUser::from(&member)))
}

/// DELETE /team/{user_id}
pub async fn remove_member(
    req: HttpRequest,
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let mut ws = data.authorized(&req).await?;
    ws.remove_member(&user_id)?;
    data.commit(&mut ws).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "Member removed" })))
}
