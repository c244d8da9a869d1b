use actix_web::{web, HttpRequest, HttpResponse};
use log::debug;

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::models::Notification;
use crate::store::StoreKey;
use crate::workspace::Workspace;

impl Workspace {
    /// The acting user's notifications, newest first.
    pub fn my_notifications(&self) -> AppResult<Vec<Notification>> {
        let me = &self.acting_user()?.id;
        let mut mine: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|n| &n.user_id == me)
            .cloned()
            .collect();
        mine.reverse();
        Ok(mine)
    }

    pub fn unread_count(&self) -> AppResult<usize> {
        let me = &self.acting_user()?.id;
        Ok(self
            .notifications
            .iter()
            .filter(|n| &n.user_id == me && !n.read)
            .count())
    }

    pub fn mark_read(&mut self, notification_id: &str) -> AppResult<Notification> {
        let me = self.acting_user()?.id.clone();
        let notification = self
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id && n.user_id == me)
            .ok_or_else(|| AppError::not_found("Notification"))?;
        let was_unread = !notification.read;
        notification.read = true;
        let updated = notification.clone();
        if was_unread {
            self.touch(StoreKey::Notifications);
        }
        Ok(updated)
    }

    /// Drops every notification addressed to the acting user. Returns how
    /// many were removed.
    pub fn clear_notifications(&mut self) -> AppResult<usize> {
        let me = self.acting_user()?.id.clone();
        let before = self.notifications.len();
        self.notifications.retain(|n| n.user_id != me);
        let removed = before - self.notifications.len();
        if removed > 0 {
            self.touch(StoreKey::Notifications);
        }
        debug!("Cleared {} notification(s) for {}", removed, me);
        Ok(removed)
    }
}

/// GET /notifications
pub async fn list_notifications(req: HttpRequest, data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let ws = data.authorized(&req).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "unread": ws.unread_count()?,
        "notifications": ws.my_notifications()?,
    })))
}

/// POST /notifications/{id}/read
pub async fn mark_read(
    req: HttpRequest,
    data: web::Data<AppState>,
    notification_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let mut ws = data.authorized(&req).await?;
    let notification = ws.mark_read(&notification_id)?;
    data.commit(&mut ws).await?;
    Ok(HttpResponse::Ok().json(notification))
}

/// DELETE /notifications
pub async fn clear_all(req: HttpRequest, data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let mut ws = data.authorized(&req).await?;
    let removed = ws.clear_notifications()?;
    data.commit(&mut ws).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "removed": removed })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::team_management::tests::new_member;
    use crate::workspace::testing;

    fn with_two_for_dev() -> (Workspace, String) {
        let mut ws = testing::workspace();
        testing::admin(&mut ws, "Ada");
        let dev = ws.add_member(new_member("Dev", "dev@example.com", Role::Member)).unwrap();
        ws.notify(&dev.id, "First", "one".into()).unwrap();
        ws.notify(&dev.id, "Second", "two".into()).unwrap();
        ws.logout();
        ws.login("dev@example.com", "pw").unwrap();
        (ws, dev.id)
    }

    #[test]
    fn own_notifications_newest_first() {
        let (ws, _) = with_two_for_dev();
        let mine = ws.my_notifications().unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].title, "Second");
        assert_eq!(ws.unread_count().unwrap(), 2);
    }

    #[test]
    fn mark_read_is_scoped_to_the_owner() {
        let (mut ws, _) = with_two_for_dev();
        let id = ws.my_notifications().unwrap()[1].id.clone();
        assert!(ws.mark_read(&id).unwrap().read);
        assert_eq!(ws.unread_count().unwrap(), 1);

        ws.logout();
        ws.login("ada@example.com", "s3cret!").unwrap();
        assert!(matches!(ws.mark_read(&id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn clear_all_only_touches_own_records() {
        let (mut ws, dev_id) = with_two_for_dev();
        ws.notify("someone-else", "Other", "x".into()).unwrap();
        assert_eq!(ws.clear_notifications().unwrap(), 2);
        assert!(ws.notifications().iter().all(|n| n.user_id != dev_id));
        assert_eq!(ws.notifications().len(), 1);
    }
}
