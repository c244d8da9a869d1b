// src/task.rs

use std::cmp::Ordering;

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{NaiveDate, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{Priority, Task, TaskStatus};
use crate::store::StoreKey;
use crate::workspace::{fresh_id, Workspace};

const DEFAULT_REMINDER_MINUTES: u32 = 60;
const FINALIZE_PROMPT: &str = "Finalize milestone? This will lock the objective status.";

/// Request payload for creating a task
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Defaults to today.
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
    /// Empty means "assign to me".
    #[serde(default)]
    pub assigned_to: Vec<String>,
    #[serde(default)]
    pub reminder_before: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    #[default]
    DueDate,
    CreatedAt,
    Priority,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TaskListQuery {
    pub sort: SortKey,
    pub order: SortOrder,
}

/// Ordered set of task ids picked for a bulk action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskSelection(Vec<String>);

impl TaskSelection {
    pub fn from_ids(ids: impl IntoIterator<Item = String>) -> Self {
        let mut selection = TaskSelection::default();
        for id in ids {
            if !selection.contains(&id) {
                selection.0.push(id);
            }
        }
        selection
    }

    pub fn ids(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|s| s == id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn toggle(&mut self, id: &str) {
        if self.contains(id) {
            self.0.retain(|s| s != id);
        } else {
            self.0.push(id.to_string());
        }
    }

    /// Selects every listed task, or clears the selection when it already
    /// covers them all.
    pub fn select_all(&mut self, visible: &[Task]) {
        if self.0.len() == visible.len() && visible.iter().all(|t| self.contains(&t.id)) {
            self.clear();
        } else {
            self.0 = visible.iter().map(|t| t.id.clone()).collect();
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum BulkAction {
    SetStatus(TaskStatus),
    SetPriority(Priority),
    /// Replaces every selected task's assignees with this single user.
    SetAssignee(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRequest {
    #[serde(default)]
    pub task_ids: Vec<String>,
    /// Selects every task of this project instead of `task_ids`.
    #[serde(default)]
    pub all_in_project: Option<String>,
    pub action: BulkAction,
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Confirmation {
    pub confirmed: bool,
}

#[derive(Debug, Deserialize)]
pub struct MoveTaskRequest {
    pub status: TaskStatus,
    #[serde(default)]
    pub confirmed: bool,
}

fn compare(a: &Task, b: &Task, key: SortKey) -> Ordering {
    match key {
        SortKey::DueDate => a.due_date.cmp(&b.due_date),
        SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
        SortKey::Priority => a.priority.rank().cmp(&b.priority.rank()),
    }
}

/// Stable sort: tasks that compare equal keep their insertion order in both
/// directions.
pub fn sort_tasks(tasks: &mut [Task], key: SortKey, order: SortOrder) {
    tasks.sort_by(|a, b| match order {
        SortOrder::Asc => compare(a, b, key),
        SortOrder::Desc => compare(b, a, key),
    });
}

impl Workspace {
    pub fn create_task(&mut self, project_id: &str, req: CreateTaskRequest) -> AppResult<Task> {
        let creator_id = self.acting_user()?.id.clone();
        let project_name = self.company_project(project_id)?.name.clone();
        if req.title.trim().is_empty() {
            return Err(AppError::validation("Task title is required"));
        }

        let mut assigned_to: Vec<String> = Vec::new();
        for id in req.assigned_to {
            self.company_member(&id)?;
            if !assigned_to.contains(&id) {
                assigned_to.push(id);
            }
        }
        if assigned_to.is_empty() {
            assigned_to.push(creator_id);
        }

        let today = Utc::now().date_naive();
        let task = Task {
            id: fresh_id("t-", |id| self.tasks.iter().any(|t| t.id == id))?,
            project_id: project_id.to_string(),
            title: req.title.trim().to_string(),
            description: req.description.trim().to_string(),
            assigned_to,
            status: TaskStatus::Todo,
            due_date: req.due_date.unwrap_or(today),
            created_at: today,
            priority: req.priority,
            reminder_before: Some(req.reminder_before.unwrap_or(DEFAULT_REMINDER_MINUTES)),
        };
        self.tasks.push(task.clone());
        self.touch(StoreKey::Tasks);

        for assignee in &task.assigned_to {
            self.notify(
                assignee,
                "New Task Assigned",
                format!("You have been assigned to \"{}\" in {}", task.title, project_name),
            )?;
        }
        info!("Task created {} in project {}", task.id, project_id);
        Ok(task)
    }

    pub fn project_tasks(&self, project_id: &str, key: SortKey, order: SortOrder) -> AppResult<Vec<Task>> {
        self.company_project(project_id)?;
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect();
        sort_tasks(&mut tasks, key, order);
        Ok(tasks)
    }

    /// Flips a task between done and not done. Finishing needs confirmation;
    /// reopening does not.
    pub fn toggle_task(&mut self, task_id: &str, confirmed: bool) -> AppResult<Task> {
        let idx = self.company_task_index(task_id)?;
        let task = &mut self.tasks[idx];
        if task.is_done() {
            task.status = TaskStatus::Todo;
        } else if confirmed {
            task.status = TaskStatus::Done;
        } else {
            return Err(AppError::ConfirmationRequired(format!(
                "Mark \"{}\" as finished?",
                task.title
            )));
        }
        let task = task.clone();
        self.touch(StoreKey::Tasks);
        debug!("Task {} toggled to {:?}", task.id, task.status);
        Ok(task)
    }

    /// Moves a task to any column. Entering DONE needs confirmation; moving
    /// a task onto its current status changes nothing.
    pub fn move_task(&mut self, task_id: &str, status: TaskStatus, confirmed: bool) -> AppResult<Task> {
        let idx = self.company_task_index(task_id)?;
        if self.tasks[idx].status == status {
            return Ok(self.tasks[idx].clone());
        }
        if status == TaskStatus::Done && !confirmed {
            return Err(AppError::ConfirmationRequired(FINALIZE_PROMPT.to_string()));
        }
        self.tasks[idx].status = status;
        self.touch(StoreKey::Tasks);
        debug!("Task {} moved to {:?}", task_id, status);
        Ok(self.tasks[idx].clone())
    }

    /// Applies `action` to every selected task, then clears the selection.
    /// Either every selected task is updated or none is.
    pub fn bulk_update(
        &mut self,
        selection: &mut TaskSelection,
        action: BulkAction,
        confirmed: bool,
    ) -> AppResult<Vec<Task>> {
        if selection.is_empty() {
            return Err(AppError::validation("No tasks selected"));
        }
        let indices = selection
            .ids()
            .iter()
            .map(|id| self.company_task_index(id))
            .collect::<AppResult<Vec<usize>>>()?;
        match &action {
            BulkAction::SetStatus(TaskStatus::Done) if !confirmed => {
                return Err(AppError::ConfirmationRequired(format!(
                    "Mark {} task(s) as finished?",
                    indices.len()
                )));
            }
            BulkAction::SetAssignee(user_id) => {
                self.company_member(user_id)?;
            }
            _ => {}
        }

        let mut reassigned = Vec::new();
        for &idx in &indices {
            let task = &mut self.tasks[idx];
            match &action {
                BulkAction::SetStatus(status) => task.status = *status,
                BulkAction::SetPriority(priority) => task.priority = *priority,
                BulkAction::SetAssignee(user_id) => {
                    if task.assigned_to != [user_id.clone()] {
                        task.assigned_to = vec![user_id.clone()];
                        reassigned.push(task.title.clone());
                    }
                }
            }
        }
        self.touch(StoreKey::Tasks);

        if let BulkAction::SetAssignee(user_id) = &action {
            for title in reassigned {
                self.notify(
                    user_id,
                    "Task Reassigned",
                    format!("You have been assigned to \"{}\"", title),
                )?;
            }
        }
        selection.clear();
        info!("Bulk {:?} applied to {} task(s)", action, indices.len());
        Ok(indices.into_iter().map(|idx| self.tasks[idx].clone()).collect())
    }
}

/// POST /projects/{project_id}/tasks
pub async fn create_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
    task_info: web::Json<CreateTaskRequest>,
) -> AppResult<HttpResponse> {
    let mut ws = data.authorized(&req).await?;
    let task = ws.create_task(&project_id, task_info.into_inner())?;
    data.commit(&mut ws).await?;
    Ok(HttpResponse::Created().json(task))
}

/// GET /projects/{project_id}/tasks?sort=dueDate&order=asc
pub async fn list_tasks(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
    query: web::Query<TaskListQuery>,
) -> AppResult<HttpResponse> {
    let ws = data.authorized(&req).await?;
    Ok(HttpResponse::Ok().json(ws.project_tasks(&project_id, query.sort, query.order)?))
}

/// POST /tasks/{task_id}/toggle?confirmed=true
pub async fn toggle_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
    query: web::Query<Confirmation>,
) -> AppResult<HttpResponse> {
    let mut ws = data.authorized(&req).await?;
    let task = ws.toggle_task(&task_id, query.confirmed)?;
    data.commit(&mut ws).await?;
    Ok(HttpResponse::Ok().json(task))
}

/// PUT /tasks/{task_id}/status
pub async fn move_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
    body: web::Json<MoveTaskRequest>,
) -> AppResult<HttpResponse> {
    let mut ws = data.authorized(&req).await?;
    let task = ws.move_task(&task_id, body.status, body.confirmed)?;
    data.commit(&mut ws).await?;
    Ok(HttpResponse::Ok().json(task))
}

/// POST /tasks/bulk
pub async fn bulk_update(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<BulkRequest>,
) -> AppResult<HttpResponse> {
    let BulkRequest {
        task_ids,
        all_in_project,
        action,
        confirmed,
    } = body.into_inner();
    let mut selection = TaskSelection::from_ids(task_ids);
    let mut ws = data.authorized(&req).await?;
    if let Some(project_id) = all_in_project {
        let visible = ws.project_tasks(&project_id, SortKey::default(), SortOrder::default())?;
        selection.clear();
        selection.select_all(&visible);
    }
    let tasks = ws.bulk_update(&mut selection, action, confirmed)?;
    data.commit(&mut ws).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "tasks": tasks,
        "selection": selection,
    })))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::Role;
    use crate::project::tests::new_project;
    use crate::team_management::tests::new_member;
    use crate::workspace::testing;

    pub(crate) fn new_task(title: &str) -> CreateTaskRequest {
        CreateTaskRequest {
            title: title.to_string(),
            description: String::new(),
            due_date: None,
            priority: Priority::default(),
            assigned_to: Vec::new(),
            reminder_before: None,
        }
    }

    fn dated(title: &str, due: (i32, u32, u32), priority: Priority) -> CreateTaskRequest {
        CreateTaskRequest {
            due_date: NaiveDate::from_ymd_opt(due.0, due.1, due.2),
            priority,
            ..new_task(title)
        }
    }

    fn setup() -> (Workspace, String) {
        let mut ws = testing::workspace();
        testing::admin(&mut ws, "Ada");
        let project = ws.create_project(new_project("Apollo")).unwrap();
        (ws, project.id)
    }

    #[test]
    fn empty_assignees_default_to_the_creator() {
        let (mut ws, project_id) = setup();
        let creator = ws.acting_user().unwrap().id.clone();
        let task = ws.create_task(&project_id, new_task("Design")).unwrap();

        assert_eq!(task.assigned_to, vec![creator]);
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.reminder_before, Some(60));
        assert_eq!(task.due_date, Utc::now().date_naive());
        assert!(ws.notifications().is_empty());
    }

    #[test]
    fn assignees_must_belong_to_the_company_and_get_notified() {
        let (mut ws, project_id) = setup();
        let dev = ws.add_member(new_member("Dev", "dev@example.com", Role::Member)).unwrap();

        let mut outsider = new_task("Leak");
        outsider.assigned_to = vec!["u-root".into()];
        assert!(matches!(ws.create_task(&project_id, outsider), Err(AppError::NotFound(_))));
        assert!(ws.tasks().is_empty());

        let mut req = new_task("Build");
        req.assigned_to = vec![dev.id.clone(), dev.id.clone()];
        let task = ws.create_task(&project_id, req).unwrap();
        assert_eq!(task.assigned_to, vec![dev.id.clone()]);
        assert_eq!(ws.notifications().len(), 1);
        assert_eq!(ws.notifications()[0].user_id, dev.id);
    }

    #[test]
    fn blank_titles_and_foreign_projects_are_rejected() {
        let (mut ws, project_id) = setup();
        assert!(matches!(ws.create_task(&project_id, new_task(" ")), Err(AppError::Validation(_))));
        testing::admin(&mut ws, "Other");
        assert!(matches!(ws.create_task(&project_id, new_task("x")), Err(AppError::NotFound(_))));
    }

    #[test]
    fn finishing_needs_confirmation_reopening_does_not() {
        let (mut ws, project_id) = setup();
        let task = ws.create_task(&project_id, new_task("Ship")).unwrap();

        let err = ws.toggle_task(&task.id, false).unwrap_err();
        match err {
            AppError::ConfirmationRequired(prompt) => assert_eq!(prompt, "Mark \"Ship\" as finished?"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(ws.tasks()[0].status, TaskStatus::Todo);

        assert_eq!(ws.toggle_task(&task.id, true).unwrap().status, TaskStatus::Done);
        assert_eq!(ws.toggle_task(&task.id, false).unwrap().status, TaskStatus::Todo);
    }

    #[test]
    fn moving_into_done_is_confirmed_once() {
        let (mut ws, project_id) = setup();
        let task = ws.create_task(&project_id, new_task("Launch")).unwrap();

        assert_eq!(ws.move_task(&task.id, TaskStatus::Review, false).unwrap().status, TaskStatus::Review);
        assert!(matches!(
            ws.move_task(&task.id, TaskStatus::Done, false),
            Err(AppError::ConfirmationRequired(_))
        ));
        assert_eq!(ws.tasks()[0].status, TaskStatus::Review);

        ws.move_task(&task.id, TaskStatus::Done, true).unwrap();
        ws.take_dirty();
        assert_eq!(ws.move_task(&task.id, TaskStatus::Done, false).unwrap().status, TaskStatus::Done);
        assert!(ws.take_dirty().is_empty());
    }

    #[test]
    fn sorting_is_stable_in_both_directions() {
        let (mut ws, project_id) = setup();
        ws.create_task(&project_id, dated("a", (2026, 1, 5), Priority::High)).unwrap();
        ws.create_task(&project_id, dated("b", (2026, 1, 1), Priority::Low)).unwrap();
        ws.create_task(&project_id, dated("c", (2026, 1, 5), Priority::High)).unwrap();

        let titles = |tasks: Vec<Task>| tasks.into_iter().map(|t| t.title).collect::<Vec<_>>();
        let asc = ws.project_tasks(&project_id, SortKey::DueDate, SortOrder::Asc).unwrap();
        assert_eq!(titles(asc), ["b", "a", "c"]);
        let desc = ws.project_tasks(&project_id, SortKey::Priority, SortOrder::Desc).unwrap();
        assert_eq!(titles(desc), ["a", "c", "b"]);
    }

    #[test]
    fn selection_toggles_and_select_all_clears_when_full() {
        let (mut ws, project_id) = setup();
        ws.create_task(&project_id, new_task("one")).unwrap();
        ws.create_task(&project_id, new_task("two")).unwrap();
        let tasks = ws.tasks().to_vec();

        let mut selection = TaskSelection::default();
        selection.toggle(&tasks[0].id);
        assert!(selection.contains(&tasks[0].id));
        selection.select_all(&tasks);
        assert_eq!(selection.ids().len(), 2);
        selection.select_all(&tasks);
        assert!(selection.is_empty());
        selection.toggle(&tasks[1].id);
        selection.toggle(&tasks[1].id);
        assert!(selection.is_empty());
    }

    #[test]
    fn bulk_updates_apply_then_clear_the_selection() {
        let (mut ws, project_id) = setup();
        let dev = ws.add_member(new_member("Dev", "dev@example.com", Role::Member)).unwrap();
        let a = ws.create_task(&project_id, new_task("a")).unwrap();
        let b = ws.create_task(&project_id, new_task("b")).unwrap();
        let mut selection = TaskSelection::from_ids([a.id.clone(), b.id.clone()]);

        let updated = ws
            .bulk_update(&mut selection, BulkAction::SetAssignee(dev.id.clone()), false)
            .unwrap();
        assert!(updated.iter().all(|t| t.assigned_to == [dev.id.clone()]));
        assert!(selection.is_empty());
        assert_eq!(ws.notifications().iter().filter(|n| n.user_id == dev.id).count(), 2);

        let mut selection = TaskSelection::from_ids([a.id.clone()]);
        ws.bulk_update(&mut selection, BulkAction::SetPriority(Priority::High), false)
            .unwrap();
        assert_eq!(ws.tasks()[0].priority, Priority::High);
        assert_eq!(ws.tasks()[1].priority, Priority::Medium);
    }

    #[test]
    fn bulk_done_needs_confirmation_and_unknown_ids_abort() {
        let (mut ws, project_id) = setup();
        let a = ws.create_task(&project_id, new_task("a")).unwrap();

        let mut selection = TaskSelection::from_ids([a.id.clone()]);
        let err = ws
            .bulk_update(&mut selection, BulkAction::SetStatus(TaskStatus::Done), false)
            .unwrap_err();
        assert!(matches!(err, AppError::ConfirmationRequired(_)));
        assert!(!selection.is_empty());
        assert_eq!(ws.tasks()[0].status, TaskStatus::Todo);

        let mut mixed = TaskSelection::from_ids([a.id.clone(), "t-missing".to_string()]);
        let err = ws
            .bulk_update(&mut mixed, BulkAction::SetStatus(TaskStatus::Review), false)
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(ws.tasks()[0].status, TaskStatus::Todo);

        ws.bulk_update(&mut selection, BulkAction::SetStatus(TaskStatus::Done), true)
            .unwrap();
        assert!(ws.tasks()[0].is_done());
    }

    #[test]
    fn bulk_actions_deserialize_from_tagged_json() {
        let action: BulkAction =
            serde_json::from_str(r#"{"kind":"setStatus","value":"IN_PROGRESS"}"#).unwrap();
        assert_eq!(action, BulkAction::SetStatus(TaskStatus::InProgress));
        let action: BulkAction = serde_json::from_str(r#"{"kind":"setAssignee","value":"u-9"}"#).unwrap();
        assert_eq!(action, BulkAction::SetAssignee("u-9".into()));
    }
}
