//! The application state container.
//!
//! A `Workspace` owns every collection plus the session. Feature modules add
//! their operations as `impl Workspace` blocks; each operation validates
//! first and mutates second, so a rejected call leaves no partial record.
//! Every mutation marks the store keys it touched, and the caller drains
//! those with [`Workspace::take_dirty`] to mirror them into the store.

use std::collections::BTreeSet;

use chrono::Utc;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Document, Message, Notification, Project, Task, User};
use crate::session::Session;
use crate::store::{PersistedStore, StoreError, StoreKey};

const BOOTSTRAP_PASSWORD: &str = "password";

/// What happened while loading the workspace from the store.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Keys whose stored value failed to parse and were replaced by defaults.
    pub corrupt: Vec<String>,
    /// Roster entries whose plaintext password was rehashed.
    pub migrated_passwords: usize,
}

pub struct Workspace {
    pub(crate) users: Vec<User>,
    pub(crate) projects: Vec<Project>,
    pub(crate) tasks: Vec<Task>,
    pub(crate) messages: Vec<Message>,
    pub(crate) notifications: Vec<Notification>,
    pub(crate) documents: Vec<Document>,
    pub(crate) session: Session,
    password_cost: u32,
    dirty: BTreeSet<StoreKey>,
}

/// Generates a prefixed UUID identifier. A clash with an existing record is
/// reported instead of silently overwriting it.
pub(crate) fn fresh_id(prefix: &str, taken: impl Fn(&str) -> bool) -> AppResult<String> {
    let id = format!("{prefix}{}", Uuid::new_v4().simple());
    if taken(&id) {
        return Err(AppError::Conflict(format!("Identifier collision on {id}")));
    }
    Ok(id)
}

/// Case-insensitive substring search over `fields`. A missing or blank term
/// matches everything.
pub(crate) fn matches_search(fields: &[&str], search: Option<&str>) -> bool {
    match search.map(str::trim).filter(|s| !s.is_empty()) {
        None => true,
        Some(term) => {
            let term = term.to_lowercase();
            fields.iter().any(|f| f.to_lowercase().contains(&term))
        }
    }
}

fn looks_hashed(password: &str) -> bool {
    password.len() == 60 && password.starts_with("$2")
}

async fn load_key<T: DeserializeOwned>(
    store: &PersistedStore,
    key: StoreKey,
    report: &mut LoadReport,
) -> Result<Option<T>, StoreError> {
    match store.load(key).await {
        Ok(value) => Ok(value),
        Err(e @ StoreError::Corrupt { .. }) => {
            warn!("Falling back to defaults: {}", e);
            report.corrupt.push(e.to_string());
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn encode<T: Serialize + ?Sized>(key: StoreKey, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Serialize {
        key: key.to_string(),
        source,
    })
}

impl Workspace {
    /// An empty workspace whose roster holds only the bootstrap admin.
    pub fn new(password_cost: u32) -> AppResult<Self> {
        let admin_hash = bcrypt::hash(BOOTSTRAP_PASSWORD, password_cost)?;
        Ok(Workspace {
            users: vec![User::bootstrap_admin(admin_hash)],
            projects: Vec::new(),
            tasks: Vec::new(),
            messages: Vec::new(),
            notifications: Vec::new(),
            documents: Vec::new(),
            session: Session::LoggedOut,
            password_cost,
            dirty: BTreeSet::new(),
        })
    }

    /// Loads every key from `store`. Missing keys keep their defaults;
    /// corrupt keys are logged, listed in the report, and also keep their
    /// defaults. Backend failures abort the load.
    pub async fn load(store: &PersistedStore, password_cost: u32) -> AppResult<(Self, LoadReport)> {
        let mut report = LoadReport::default();
        let mut ws = Workspace::new(password_cost)?;

        if let Some(users) = load_key::<Vec<User>>(store, StoreKey::Team, &mut report).await? {
            ws.users = users;
        }
        if let Some(projects) = load_key(store, StoreKey::Projects, &mut report).await? {
            ws.projects = projects;
        }
        if let Some(tasks) = load_key(store, StoreKey::Tasks, &mut report).await? {
            ws.tasks = tasks;
        }
        if let Some(messages) = load_key(store, StoreKey::Messages, &mut report).await? {
            ws.messages = messages;
        }
        if let Some(documents) = load_key(store, StoreKey::Documents, &mut report).await? {
            ws.documents = documents;
        }
        if let Some(notifications) = load_key(store, StoreKey::Notifications, &mut report).await? {
            ws.notifications = notifications;
        }

        let current: Option<User> = load_key(store, StoreKey::CurrentUser, &mut report).await?;
        let impersonator: Option<User> = load_key(store, StoreKey::Impersonator, &mut report).await?;
        ws.session = Session::from_records(current.as_ref(), impersonator.as_ref());
        let resolves = |id: Option<&str>| id.map_or(true, |id| ws.user(id).is_some());
        if !resolves(ws.session.acting_id()) || !resolves(ws.session.real_id()) {
            warn!("Stored session refers to a user missing from the roster, logging out");
            ws.session.logout();
            ws.touch_session();
        }

        report.migrated_passwords = ws.migrate_plaintext_passwords()?;
        if report.migrated_passwords > 0 {
            info!("Rehashed {} plaintext password(s)", report.migrated_passwords);
        }
        Ok((ws, report))
    }

    fn migrate_plaintext_passwords(&mut self) -> AppResult<usize> {
        let cost = self.password_cost;
        let mut migrated = 0;
        for user in self.users.iter_mut() {
            if !user.password.is_empty() && !looks_hashed(&user.password) {
                user.password = bcrypt::hash(&user.password, cost)?;
                migrated += 1;
            }
        }
        if migrated > 0 {
            self.touch(StoreKey::Team);
        }
        Ok(migrated)
    }

    // ─── accessors ───────────────────────────────────────────────────────────

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub(crate) fn user_mut(&mut self, id: &str) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == id)
    }

    // ─── passwords ───────────────────────────────────────────────────────────

    pub(crate) fn hash_password(&self, plain: &str) -> AppResult<String> {
        Ok(bcrypt::hash(plain, self.password_cost)?)
    }

    // ─── dirty tracking ──────────────────────────────────────────────────────

    /// Marks `key` for the next commit. Session records are snapshots of
    /// roster entries, so touching the roster refreshes them too.
    pub(crate) fn touch(&mut self, key: StoreKey) {
        self.dirty.insert(key);
        if key == StoreKey::Team && self.session != Session::LoggedOut {
            self.touch_session();
        }
    }

    pub(crate) fn touch_session(&mut self) {
        self.dirty.insert(StoreKey::CurrentUser);
        self.dirty.insert(StoreKey::Impersonator);
    }

    pub fn take_dirty(&mut self) -> Vec<StoreKey> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    /// Re-marks keys whose write failed so the next commit retries them.
    pub fn mark_dirty(&mut self, keys: impl IntoIterator<Item = StoreKey>) {
        self.dirty.extend(keys);
    }

    /// The JSON stored under `key`, or `None` when the key should be absent
    /// (session records while logged out or not impersonating).
    pub fn encode(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        let json = match key {
            StoreKey::CurrentUser => match self.session.acting_id().and_then(|id| self.user(id)) {
                Some(user) => encode(key, user)?,
                None => return Ok(None),
            },
            StoreKey::Impersonator => match self.session.impersonator_id().and_then(|id| self.user(id)) {
                Some(user) => encode(key, user)?,
                None => return Ok(None),
            },
            StoreKey::Messages => encode(key, &self.messages)?,
            StoreKey::Team => encode(key, &self.users)?,
            StoreKey::Projects => encode(key, &self.projects)?,
            StoreKey::Tasks => encode(key, &self.tasks)?,
            StoreKey::Documents => encode(key, &self.documents)?,
            StoreKey::Notifications => encode(key, &self.notifications)?,
        };
        Ok(Some(json))
    }

    // ─── identity and company scope ──────────────────────────────────────────

    /// Checks that a bearer token's subject is the session's real user.
    pub fn authorize(&self, principal: &str) -> AppResult<()> {
        match self.session.real_id() {
            Some(real) if real == principal => Ok(()),
            Some(_) => Err(AppError::Unauthorized("Session belongs to another user".into())),
            None => Err(AppError::Unauthorized("Not logged in".into())),
        }
    }

    pub fn acting_user(&self) -> AppResult<&User> {
        self.session
            .acting_id()
            .and_then(|id| self.user(id))
            .ok_or_else(|| AppError::Unauthorized("Not logged in".into()))
    }

    pub(crate) fn require_admin(&self) -> AppResult<&User> {
        let user = self.acting_user()?;
        if !user.is_admin() {
            return Err(AppError::forbidden("Administrator role required"));
        }
        Ok(user)
    }

    pub(crate) fn company_id(&self) -> AppResult<String> {
        Ok(self.acting_user()?.company_id.clone())
    }

    pub(crate) fn project_company(&self, project_id: &str) -> Option<&str> {
        self.projects
            .iter()
            .find(|p| p.id == project_id)
            .map(|p| p.company_id.as_str())
    }

    pub(crate) fn task_in_company(&self, task: &Task, company_id: &str) -> bool {
        self.project_company(&task.project_id) == Some(company_id)
    }

    /// A project of the acting user's company. Other companies' projects are
    /// reported as missing.
    pub(crate) fn company_project(&self, project_id: &str) -> AppResult<&Project> {
        let company_id = self.company_id()?;
        self.projects
            .iter()
            .find(|p| p.id == project_id && p.company_id == company_id)
            .ok_or_else(|| AppError::not_found("Project"))
    }

    pub(crate) fn company_task_index(&self, task_id: &str) -> AppResult<usize> {
        let company_id = self.company_id()?;
        self.tasks
            .iter()
            .position(|t| t.id == task_id && self.task_in_company(t, &company_id))
            .ok_or_else(|| AppError::not_found("Task"))
    }

    pub(crate) fn company_member(&self, user_id: &str) -> AppResult<&User> {
        let company_id = self.company_id()?;
        self.users
            .iter()
            .find(|u| u.id == user_id && u.company_id == company_id)
            .ok_or_else(|| AppError::not_found("Member"))
    }

    pub(crate) fn email_taken(&self, email: &str, except_id: Option<&str>) -> bool {
        self.users
            .iter()
            .any(|u| u.email_matches(email) && Some(u.id.as_str()) != except_id)
    }

    // ─── notifications ───────────────────────────────────────────────────────

    /// Queues a notification for `user_id` unless it is the acting user.
    pub(crate) fn notify(&mut self, user_id: &str, title: &str, content: String) -> AppResult<()> {
        if self.session.acting_id() == Some(user_id) {
            return Ok(());
        }
        let id = fresh_id("n-", |id| self.notifications.iter().any(|n| n.id == id))?;
        self.notifications.push(Notification {
            id,
            user_id: user_id.to_string(),
            title: title.to_string(),
            content,
            read: false,
            timestamp: Utc::now(),
        });
        self.touch(StoreKey::Notifications);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ROOT_COMPANY_ID;

    #[test]
    fn new_workspace_holds_the_bootstrap_admin() {
        let ws = testing::workspace();
        assert_eq!(ws.users().len(), 1);
        let admin = &ws.users()[0];
        assert_eq!(admin.company_id, ROOT_COMPANY_ID);
        assert!(admin.is_admin());
        assert!(bcrypt::verify(BOOTSTRAP_PASSWORD, &admin.password).unwrap());
        assert_eq!(ws.session(), &Session::LoggedOut);
    }

    #[tokio::test]
    async fn load_from_an_empty_store_uses_defaults() {
        let store = PersistedStore::in_memory();
        let (ws, report) = Workspace::load(&store, 4).await.unwrap();
        assert_eq!(ws.users().len(), 1);
        assert!(ws.tasks().is_empty());
        assert!(report.corrupt.is_empty());
        assert_eq!(report.migrated_passwords, 0);
    }

    #[tokio::test]
    async fn corrupt_keys_are_reported_not_fatal() {
        let store = PersistedStore::in_memory();
        store.backend().put("delimhub_tasks", "[{]".to_string()).await.unwrap();
        store.backend().put("delimhub_projects", "[]".to_string()).await.unwrap();

        let (ws, report) = Workspace::load(&store, 4).await.unwrap();
        assert!(ws.tasks().is_empty());
        assert_eq!(report.corrupt.len(), 1);
        assert!(report.corrupt[0].contains("delimhub_tasks"));
    }

    #[tokio::test]
    async fn plaintext_passwords_are_rehashed_on_load() {
        let store = PersistedStore::in_memory();
        let legacy = r#"[{"id":"u-1","name":"Ada L","email":"ada@x.io","password":"plain",
                         "role":"MEMBER","companyId":"org-root","position":"Dev"}]"#;
        store.backend().put("delimhub_team", legacy.to_string()).await.unwrap();

        let (mut ws, report) = Workspace::load(&store, 4).await.unwrap();
        assert_eq!(report.migrated_passwords, 1);
        let user = ws.user("u-1").unwrap();
        assert!(looks_hashed(&user.password));
        assert!(bcrypt::verify("plain", &user.password).unwrap());
        assert!(ws.take_dirty().contains(&StoreKey::Team));
    }

    #[tokio::test]
    async fn stored_session_is_restored_through_the_roster() {
        let store = PersistedStore::in_memory();
        let mut ws = testing::workspace();
        let admin = testing::admin(&mut ws, "Grace");
        for key in StoreKey::ALL {
            if let Some(json) = ws.encode(key).unwrap() {
                store.save_raw(key, json).await.unwrap();
            }
        }

        let (reloaded, _) = Workspace::load(&store, 4).await.unwrap();
        assert_eq!(reloaded.session().acting_id(), Some(admin.id.as_str()));
        assert_eq!(reloaded.users(), ws.users());
    }

    #[tokio::test]
    async fn dangling_session_records_log_out() {
        let store = PersistedStore::in_memory();
        let mut ghost = User::bootstrap_admin(String::new());
        ghost.id = "u-ghost".into();
        store.save(StoreKey::CurrentUser, &ghost).await.unwrap();

        let (mut ws, _) = Workspace::load(&store, 4).await.unwrap();
        assert_eq!(ws.session(), &Session::LoggedOut);
        assert!(ws.take_dirty().contains(&StoreKey::CurrentUser));
        assert_eq!(ws.encode(StoreKey::CurrentUser).unwrap(), None);
    }

    #[test]
    fn touching_the_roster_refreshes_session_records() {
        let mut ws = testing::workspace();
        testing::admin(&mut ws, "Linus");
        ws.take_dirty();
        ws.touch(StoreKey::Team);
        let dirty = ws.take_dirty();
        assert!(dirty.contains(&StoreKey::CurrentUser));
        assert!(dirty.contains(&StoreKey::Impersonator));
        assert!(ws.take_dirty().is_empty());
    }

    #[test]
    fn fresh_ids_are_prefixed_and_collisions_are_errors() {
        let id = fresh_id("p-", |_| false).unwrap();
        assert!(id.starts_with("p-"));
        assert_eq!(id.len(), 34);
        assert!(matches!(fresh_id("p-", |_| true), Err(AppError::Conflict(_))));
    }

    #[test]
    fn authorize_requires_the_real_user() {
        let mut ws = testing::workspace();
        assert!(ws.authorize("u-root").is_err());
        let admin = testing::admin(&mut ws, "Barbara");
        assert!(ws.authorize(&admin.id).is_ok());
        assert!(ws.authorize("u-root").is_err());
    }
}
