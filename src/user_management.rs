use actix_web::{web, HttpRequest, HttpResponse};
use log::info;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::models::user::PublicUser;
use crate::models::{AttachmentKind, User};
use crate::store::StoreKey;
use crate::workspace::Workspace;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: String,
    pub position: String,
    /// `None` keeps the current avatar, an empty string removes it.
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub confirm_password: Option<String>,
}

impl Workspace {
    pub fn profile(&self) -> AppResult<PublicUser> {
        Ok(PublicUser::from(self.acting_user()?))
    }

    /// Edits the acting user's own roster entry. The session resolves the
    /// acting user through the roster, so the change is visible at once.
    pub fn update_profile(&mut self, update: ProfileUpdate) -> AppResult<User> {
        let user_id = self.acting_user()?.id.clone();
        if update.name.trim().is_empty() {
            return Err(AppError::validation("Name is required"));
        }

        let password = update.password.as_deref().unwrap_or_default();
        let new_hash = if password.is_empty() {
            None
        } else if Some(password) != update.confirm_password.as_deref() {
            return Err(AppError::validation("Passwords do not match!"));
        } else {
            Some(self.hash_password(password)?)
        };

        let avatar = match update.avatar {
            Some(a) if a.is_empty() => Some(None),
            Some(a) if a.starts_with("data:") && AttachmentKind::from_data_uri(&a) == AttachmentKind::Image => {
                Some(Some(a))
            }
            Some(_) => return Err(AppError::validation("Avatar must be an inline image")),
            None => None,
        };

        let user = self
            .user_mut(&user_id)
            .ok_or_else(|| AppError::not_found("User"))?;
        user.name = update.name.trim().to_string();
        user.position = update.position.trim().to_string();
        if let Some(avatar) = avatar {
            user.avatar = avatar;
        }
        if let Some(hash) = new_hash {
            user.password = hash;
        }
        let updated = user.clone();
        self.touch(StoreKey::Team);
        info!("Profile updated for {}", user_id);
        Ok(updated)
    }
}

/// GET /profile
pub async fn get_profile(req: HttpRequest, data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let ws = data.authorized(&req).await?;
    Ok(HttpResponse::Ok().json(ws.profile()?))
}

/// PUT /profile
pub async fn update_profile(
    req: HttpRequest,
    data: web::Data<AppState>,
    update: web::Json<ProfileUpdate>,
) -> AppResult<HttpResponse> {
    let mut ws = data.authorized(&req).await?;
    let user = ws.update_profile(update.into_inner())?;
    data.commit(&mut ws).await?;
    Ok(HttpResponse::Ok().json(PublicUser::from(&user)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::testing;

    fn update(name: &str) -> ProfileUpdate {
        ProfileUpdate {
            name: name.to_string(),
            position: "Architect".to_string(),
            avatar: None,
            password: None,
            confirm_password: None,
        }
    }

    #[test]
    fn edits_are_visible_through_the_session() {
        let mut ws = testing::workspace();
        testing::admin(&mut ws, "Ada");
        ws.take_dirty();

        ws.update_profile(update("Ada Byron")).unwrap();
        assert_eq!(ws.acting_user().unwrap().name, "Ada Byron");
        assert_eq!(ws.profile().unwrap().position, "Architect");

        let dirty = ws.take_dirty();
        assert!(dirty.contains(&StoreKey::Team));
        assert!(dirty.contains(&StoreKey::CurrentUser));
    }

    #[test]
    fn mismatched_passwords_change_nothing() {
        let mut ws = testing::workspace();
        let admin = testing::admin(&mut ws, "Bea");
        let mut req = update("Bea Renamed");
        req.password = Some("one".into());
        req.confirm_password = Some("two".into());

        assert!(matches!(ws.update_profile(req), Err(AppError::Validation(_))));
        let stored = ws.user(&admin.id).unwrap();
        assert_eq!(stored.name, "Bea Tester");
        assert!(bcrypt::verify("s3cret!", &stored.password).unwrap());
    }

    #[test]
    fn matching_passwords_are_rehashed() {
        let mut ws = testing::workspace();
        let admin = testing::admin(&mut ws, "Cas");
        let mut req = update("Cas");
        req.password = Some("n3w".into());
        req.confirm_password = Some("n3w".into());
        ws.update_profile(req).unwrap();

        ws.logout();
        assert_eq!(ws.login("cas@example.com", "n3w").unwrap().id, admin.id);
    }

    #[test]
    fn avatar_must_be_an_inline_image() {
        let mut ws = testing::workspace();
        testing::admin(&mut ws, "Dov");

        let mut bad = update("Dov");
        bad.avatar = Some("https://example.com/me.png".into());
        assert!(ws.update_profile(bad).is_err());

        let mut good = update("Dov");
        good.avatar = Some("data:image/png;base64,AAAA".into());
        let user = ws.update_profile(good).unwrap();
        assert!(user.avatar.is_some());

        let mut clear = update("Dov");
        clear.avatar = Some(String::new());
        assert_eq!(ws.update_profile(clear).unwrap().avatar, None);
    }
}
