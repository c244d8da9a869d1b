use actix::prelude::*;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::{debug, warn};
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::app_state::AppState;
use crate::auth::validate_jwt;
use crate::error::AppError;
use crate::sync_server::{Connect, Disconnect, StoreChanged, SyncServer};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

pub struct WebSocketConnection {
    pub id: usize,
    pub user_id: String,
    pub hb: Instant,
    pub addr: Addr<SyncServer>,
}

impl WebSocketConnection {
    pub fn new(user_id: String, addr: Addr<SyncServer>) -> Self {
        WebSocketConnection {
            id: 0,
            user_id,
            hb: Instant::now(),
            addr,
        }
    }

    pub fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!("WebSocket client {} heartbeat failed, disconnecting.", act.user_id);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WebSocketConnection {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        // Start the heartbeat process
        self.hb(ctx);

        // Register the session with the sync server
        let addr = ctx.address();
        self.addr
            .send(Connect {
                user_id: self.user_id.clone(),
                addr: addr.recipient(),
            })
            .into_actor(self)
            .then(|res, act, ctx| {
                match res {
                    Ok(id) => act.id = id,
                    Err(_) => {
                        warn!("Failed to register with sync server.");
                        ctx.stop();
                    }
                }
                fut::ready(())
            })
            .wait(ctx);
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        self.addr.do_send(Disconnect { id: self.id });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WebSocketConnection {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(_)) => {
                // the feed is one-way; any client frame still counts as liveness
                self.hb = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                warn!("WebSocket error: {}", e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

impl Handler<StoreChanged> for WebSocketConnection {
    type Result = ();

    fn handle(&mut self, msg: StoreChanged, ctx: &mut ws::WebsocketContext<Self>) {
        let outgoing = serde_json::to_string(&msg).unwrap_or_default();
        debug!("Sending change to user {}: {}", self.user_id, outgoing);
        ctx.text(outgoing);
    }
}

/// GET /ws
/// The bearer token comes from the Authorization header (already checked by
/// the middleware) or, for browsers, from a `?token=` query parameter.
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
    query: web::Query<WsQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    let from_header = req.extensions().get::<String>().cloned();
    let user_id = match (from_header, &query.token) {
        (Some(user_id), _) => user_id,
        (None, Some(token)) => match validate_jwt(token, &data.config.jwt_secret) {
            Ok(claims) => claims.sub,
            Err(e) => {
                warn!("Rejected websocket token: {}", e);
                return Err(AppError::Unauthorized("Invalid token".into()).into());
            }
        },
        (None, None) => return Err(AppError::Unauthorized("Missing bearer token".into()).into()),
    };
    data.workspace.lock().await.authorize(&user_id)?;

    ws::start(
        WebSocketConnection::new(user_id, data.sync_server.clone()),
        &req,
        stream,
    )
}
