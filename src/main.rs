// src/main.rs

mod ai_endpoints;
mod app_state;
mod auth;
mod board;
mod chat;
mod config;
mod dashboard_data;
mod documents;
mod error;
mod models;
mod notifications;
mod project;
mod session;
mod store;
mod sync_server;
mod task;
mod team_management;
mod user_management;
mod web_socket_server;
mod workspace;

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix::Actor;
use actix_cors::Cors;
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http,
    middleware::Logger,
    web, App, Error, HttpMessage, HttpResponse, HttpServer, ResponseError,
};
use env_logger::Env;
use futures::future::{ok, Ready};
use log::{info, warn};
use tokio::sync::Mutex;

use crate::ai_endpoints::{download_report, export_report, get_report};
use crate::app_state::{persist, AppState};
use crate::auth::{get_session, impersonate, login, logout, signup, stop_impersonating, validate_jwt};
use crate::board::get_board;
use crate::chat::{get_channel_messages, get_direct_messages, post_channel_message, post_direct_message};
use crate::config::Config;
use crate::dashboard_data::get_dashboard;
use crate::documents::{list_documents, register_document};
use crate::error::AppError;
use crate::notifications::{clear_all, list_notifications, mark_read};
use crate::project::{create_project, get_project, list_projects};
use crate::store::PersistedStore;
use crate::sync_server::SyncServer;
use crate::task::{bulk_update, create_task, list_tasks, move_task, toggle_task};
use crate::team_management::{add_member, get_team_members, remove_member, update_member};
use crate::user_management::{get_profile, update_profile};
use crate::web_socket_server::ws_index;
use crate::workspace::Workspace;

#[derive(Debug)]
pub struct Authentication;

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware { service })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Extract "Bearer <token>" from the Authorization header if present.
        // Login and signup ignore it so a stale token cannot lock a client out.
        let token = req
            .headers()
            .get(http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .filter(|_| !matches!(req.path(), "/auth/login" | "/auth/signup"));

        if let Some(token) = token {
            let secret = req
                .app_data::<web::Data<AppState>>()
                .map(|data| data.config.jwt_secret.clone())
                .unwrap_or_default();
            match validate_jwt(&token, &secret) {
                Ok(claims) => {
                    // Insert user_id as a string extension
                    req.extensions_mut().insert(claims.sub);
                }
                Err(e) => {
                    warn!("Rejected bearer token: {}", e);
                    let resp = AppError::Unauthorized("Invalid token".into()).error_response();
                    let (req_parts, _payload) = req.into_parts();
                    let srv_resp = ServiceResponse::new(req_parts, resp);
                    return Box::pin(async move { Ok(srv_resp) });
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

async fn health(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "store": data.store.backend().describe(),
        "revision": data.store.revision(),
    }))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/signup", web::post().to(signup))
            .route("/login", web::post().to(login))
            .route("/logout", web::post().to(logout))
            .route("/session", web::get().to(get_session))
            .route("/impersonate/{user_id}", web::post().to(impersonate))
            .route("/impersonate", web::delete().to(stop_impersonating)),
    )
    // TEAM
    .service(
        web::scope("/team")
            .route("", web::get().to(get_team_members))
            .route("", web::post().to(add_member))
            .route("/{user_id}", web::put().to(update_member))
            .route("/{user_id}", web::delete().to(remove_member)),
    )
    .service(
        web::resource("/profile")
            .route(web::get().to(get_profile))
            .route(web::put().to(update_profile)),
    )
    // PROJECTS
    .service(
        web::scope("/projects")
            .route("", web::get().to(list_projects))
            .route("", web::post().to(create_project))
            .route("/{project_id}", web::get().to(get_project))
            .route("/{project_id}/tasks", web::get().to(list_tasks))
            .route("/{project_id}/tasks", web::post().to(create_task))
            .route("/{project_id}/report", web::get().to(get_report))
            .route("/{project_id}/report.txt", web::get().to(download_report))
            .route("/{project_id}/report.txt", web::post().to(export_report)),
    )
    // TASKS
    .service(
        web::scope("/tasks")
            .route("/bulk", web::post().to(bulk_update))
            .route("/{task_id}/toggle", web::post().to(toggle_task))
            .route("/{task_id}/status", web::put().to(move_task)),
    )
    .route("/board", web::get().to(get_board))
    // MESSAGES
    .service(
        web::scope("/messages")
            .route("/project/{project_id}", web::get().to(get_channel_messages))
            .route("/project/{project_id}", web::post().to(post_channel_message))
            .route("/direct/{user_id}", web::get().to(get_direct_messages))
            .route("/direct/{user_id}", web::post().to(post_direct_message)),
    )
    .service(
        web::scope("/notifications")
            .route("", web::get().to(list_notifications))
            .route("", web::delete().to(clear_all))
            .route("/{notification_id}/read", web::post().to(mark_read)),
    )
    .service(
        web::resource("/documents")
            .route(web::get().to(list_documents))
            .route(web::post().to(register_document)),
    )
    .route("/dashboard", web::get().to(get_dashboard))
    .route("/health", web::get().to(health))
    // WEBSOCKET change feed
    .service(web::resource("/ws").route(web::get().to(ws_index)));
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    let store = Arc::new(
        PersistedStore::open(&config.store)
            .await
            .map_err(|e| io::Error::other(e.to_string()))?,
    );
    info!("Workspace store: {}", store.backend().describe());
    match store.backend().keys().await {
        Ok(keys) if keys.is_empty() => info!("Store is empty, seeding defaults"),
        Ok(keys) => info!("Store holds {}", keys.join(", ")),
        Err(e) => warn!("Could not list stored keys: {}", e),
    }

    let (mut workspace, report) = Workspace::load(&store, config.bcrypt_cost)
        .await
        .map_err(|e| io::Error::other(e.to_string()))?;
    for corrupt in &report.corrupt {
        warn!("Ignored corrupt stored value: {}", corrupt);
    }

    let sync_server = SyncServer::new().start();
    // persist migrations and session repairs made while loading
    persist(&store, &sync_server, &mut workspace)
        .await
        .map_err(|e| io::Error::other(e.to_string()))?;
    let workspace = Arc::new(Mutex::new(workspace));
    let http_client = reqwest::Client::new();

    let bind_addr = config.bind_addr.clone();
    info!("Server running at http://{}", bind_addr);
    info!("Allowed CORS Origin: {}", config.frontend_origin);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&config.frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Authentication)
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(web::Data::new(AppState {
                workspace: workspace.clone(),
                store: store.clone(),
                sync_server: sync_server.clone(),
                config: config.clone(),
                http_client: http_client.clone(),
            }))
            .configure(routes)
    })
    .bind(bind_addr)?
    .run()
    .await
}
