use std::sync::Arc;

use actix::Addr;
use actix_web::HttpRequest;
use chrono::Utc;
use log::error;
use serde::Deserialize;
use tokio::sync::{Mutex, MutexGuard};

use crate::auth::principal;
use crate::config::Config;
use crate::error::AppResult;
use crate::store::PersistedStore;
use crate::sync_server::{StoreChanged, SyncServer};
use crate::workspace::Workspace;

#[derive(Clone)]
pub struct AppState {
    pub workspace: Arc<Mutex<Workspace>>,
    pub store: Arc<PersistedStore>,
    pub sync_server: Addr<SyncServer>,
    pub config: Config,
    pub http_client: reqwest::Client,
}

/// `?search=` filter shared by the list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub search: Option<String>,
}

impl SearchQuery {
    pub fn term(&self) -> Option<&str> {
        self.search.as_deref()
    }
}

impl AppState {
    /// Locks the workspace after checking that the request's bearer token
    /// belongs to the session's real user.
    pub async fn authorized(&self, req: &HttpRequest) -> AppResult<MutexGuard<'_, Workspace>> {
        let user_id = principal(req)?;
        let ws = self.workspace.lock().await;
        ws.authorize(&user_id)?;
        Ok(ws)
    }

    pub async fn commit(&self, ws: &mut Workspace) -> AppResult<()> {
        persist(&self.store, &self.sync_server, ws).await
    }
}

/// Writes every key the last mutation touched and announces each new
/// revision on the change feed. Keys whose write fails stay dirty for the
/// next commit; the first failure is returned.
pub async fn persist(
    store: &PersistedStore,
    sync_server: &Addr<SyncServer>,
    ws: &mut Workspace,
) -> AppResult<()> {
    let mut failed = Vec::new();
    let mut first_err = None;
    for key in ws.take_dirty() {
        let written = match ws.encode(key) {
            Ok(Some(json)) => store.save_raw(key, json).await,
            Ok(None) => store.remove(key).await,
            Err(e) => Err(e),
        };
        match written {
            Ok(revision) => sync_server.do_send(StoreChanged {
                key: key.to_string(),
                revision,
                at: Utc::now(),
            }),
            Err(e) => {
                error!("Failed to persist {}: {}", key, e);
                failed.push(key);
                first_err.get_or_insert(e);
            }
        }
    }
    ws.mark_dirty(failed);
    match first_err {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
