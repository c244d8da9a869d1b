use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{debug, info};
use serde::Deserialize;

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{Attachment, AttachmentKind, Message, MessageScope};
use crate::store::StoreKey;
use crate::workspace::{fresh_id, Workspace};

const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Deserialize)]
pub struct AttachmentUpload {
    pub name: String,
    /// `data:<mime>;base64,...`
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachment: Option<AttachmentUpload>,
}

fn preview(msg: &Message) -> String {
    match (&msg.attachment, msg.text.trim()) {
        (Some(att), "") => format!("sent {}", att.name),
        (_, text) if text.chars().count() > PREVIEW_CHARS => {
            let cut: String = text.chars().take(PREVIEW_CHARS).collect();
            format!("{cut}…")
        }
        (_, text) => text.to_string(),
    }
}

impl Workspace {
    /// Posts a message to a project channel or to another member. Text may
    /// only be blank when a file is attached.
    pub fn send_message(&mut self, scope: MessageScope, req: SendMessageRequest) -> AppResult<Message> {
        let sender = self.acting_user()?;
        let (sender_id, sender_name) = (sender.id.clone(), sender.name.clone());
        match &scope {
            MessageScope::Channel { project_id } => {
                self.company_project(project_id)?;
            }
            MessageScope::Direct { receiver_id } => {
                if *receiver_id == sender_id {
                    return Err(AppError::validation("You cannot message yourself"));
                }
                self.company_member(receiver_id)?;
            }
        }
        if req.text.trim().is_empty() && req.attachment.is_none() {
            return Err(AppError::validation("Message is empty"));
        }
        let attachment = req.attachment.map(|upload| Attachment {
            kind: AttachmentKind::from_data_uri(&upload.url),
            name: upload.name,
            url: upload.url,
        });

        let message = Message {
            id: fresh_id("m-", |id| self.messages.iter().any(|m| m.id == id))?,
            scope,
            sender_id,
            sender_name,
            text: req.text,
            timestamp: Utc::now(),
            attachment,
        };
        self.messages.push(message.clone());
        self.touch(StoreKey::Messages);

        if let Some(receiver_id) = message.receiver_id() {
            self.notify(
                receiver_id,
                &format!("Message from {}", message.sender_name),
                preview(&message),
            )?;
        }
        debug!("Message {} stored", message.id);
        Ok(message)
    }

    pub fn channel_messages(&self, project_id: &str) -> AppResult<Vec<Message>> {
        self.company_project(project_id)?;
        Ok(self
            .messages
            .iter()
            .filter(|m| m.project_id() == Some(project_id))
            .cloned()
            .collect())
    }

    /// Both directions of the acting user's conversation with `other_id`.
    pub fn direct_messages(&self, other_id: &str) -> AppResult<Vec<Message>> {
        let me = self.acting_user()?.id.clone();
        self.company_member(other_id)?;
        Ok(self
            .messages
            .iter()
            .filter(|m| m.is_between(&me, other_id))
            .cloned()
            .collect())
    }
}

/// GET /messages/project/{project_id}
pub async fn get_channel_messages(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let ws = data.authorized(&req).await?;
    Ok(HttpResponse::Ok().json(ws.channel_messages(&project_id)?))
}

/// POST /messages/project/{project_id}
pub async fn post_channel_message(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
    body: web::Json<SendMessageRequest>,
) -> AppResult<HttpResponse> {
    let mut ws = data.authorized(&req).await?;
    let scope = MessageScope::Channel {
        project_id: project_id.into_inner(),
    };
    let message = ws.send_message(scope, body.into_inner())?;
    data.commit(&mut ws).await?;
    info!("Channel message {} posted by {}", message.id, message.sender_id);
    Ok(HttpResponse::Created().json(message))
}

/// GET /messages/direct/{user_id}
pub async fn get_direct_messages(
    req: HttpRequest,
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let ws = data.authorized(&req).await?;
    Ok(HttpResponse::Ok().json(ws.direct_messages(&user_id)?))
}

/// POST /messages/direct/{user_id}
pub async fn post_direct_message(
    req: HttpRequest,
    data: web::Data<AppState>,
    user_id: web::Path<String>,
    body: web::Json<SendMessageRequest>,
) -> AppResult<HttpResponse> {
    let mut ws = data.authorized(&req).await?;
    let scope = MessageScope::Direct {
        receiver_id: user_id.into_inner(),
    };
    let message = ws.send_message(scope, body.into_inner())?;
    data.commit(&mut ws).await?;
    Ok(HttpResponse::Created().json(message))
}
