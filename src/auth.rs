// src/auth.rs

use std::sync::OnceLock;

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use bcrypt::verify;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::error::{AppError, AppResult, AuthError};
use crate::models::user::PublicUser;
use crate::models::{Role, User, ROOT_COMPANY_ID};
use crate::store::StoreKey;
use crate::workspace::{fresh_id, Workspace};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub is_admin_signup: bool,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// The session as the API reports it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub user: PublicUser,
    pub impersonator: Option<PublicUser>,
}

// JWT Creation
pub fn create_jwt(user_id: &str, secret: &str, ttl_hours: i64) -> AppResult<String> {
    let expiration = Utc::now() + Duration::hours(ttl_hours);
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration.timestamp() as usize,
    };
    Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))?)
}

// JWT Validation
pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// The user id the authentication middleware attached to the request.
pub fn principal(req: &HttpRequest) -> AppResult<String> {
    req.extensions()
        .get::<String>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".into()))
}

pub(crate) fn valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles"))
        .is_match(email.trim())
}

fn required(value: &str, field: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    Ok(())
}

impl Workspace {
    /// Creates an account and logs it in. Admin signups found a new company;
    /// everyone else joins the root company.
    pub fn signup(&mut self, req: SignupRequest) -> AppResult<User> {
        required(&req.first_name, "First name")?;
        required(&req.last_name, "Last name")?;
        required(&req.email, "Email")?;
        required(&req.password, "Password")?;
        if !valid_email(&req.email) {
            return Err(AppError::validation("Email address is not valid"));
        }
        if self.email_taken(&req.email, None) {
            return Err(AppError::Conflict("An account with this email already exists".into()));
        }

        let (role, company_id, position) = if req.is_admin_signup {
            let company_id = fresh_id("org-", |id| self.users.iter().any(|u| u.company_id == id))?;
            (Role::Admin, company_id, "System Overseer")
        } else {
            (Role::Member, ROOT_COMPANY_ID.to_string(), "Ecosystem Member")
        };
        let user = User {
            id: fresh_id("u-", |id| self.user(id).is_some())?,
            name: format!("{} {}", req.first_name.trim(), req.last_name.trim()),
            email: req.email.trim().to_string(),
            password: self.hash_password(&req.password)?,
            role,
            company_id,
            position: position.to_string(),
            avatar: None,
            is_online: Some(true),
        };

        self.users.push(user.clone());
        self.session.login(user.id.clone());
        self.touch(StoreKey::Team);
        self.touch_session();
        info!("Signed up {} ({:?}) in {}", user.id, user.role, user.company_id);
        Ok(user)
    }

    /// Email matches case-insensitively; the password must verify against
    /// the stored hash. A failed attempt leaves the session untouched.
    pub fn login(&mut self, email: &str, password: &str) -> AppResult<User> {
        let user = self
            .users
            .iter()
            .find(|u| u.email_matches(email))
            .ok_or(AuthError::UnknownEmail)?;
        if !verify(password, &user.password).unwrap_or(false) {
            warn!("Failed login for {}", user.id);
            return Err(AuthError::WrongPassword.into());
        }
        let user_id = user.id.clone();

        self.session.login(user_id.clone());
        if let Some(member) = self.user_mut(&user_id) {
            member.is_online = Some(true);
        }
        self.touch(StoreKey::Team);
        self.touch_session();
        info!("User {} logged in", user_id);
        self.acting_user().cloned()
    }

    pub fn logout(&mut self) {
        if let Some(real_id) = self.session.real_id().map(str::to_string) {
            if let Some(member) = self.user_mut(&real_id) {
                member.is_online = Some(false);
            }
            self.touch(StoreKey::Team);
            info!("User {} logged out", real_id);
        }
        self.session.logout();
        self.touch_session();
    }

    /// Lets an admin act as another member of their company.
    pub fn impersonate(&mut self, target_id: &str) -> AppResult<User> {
        let acting = self.require_admin()?;
        if acting.id == target_id {
            return Err(AppError::validation("You are already acting as this user"));
        }
        let target = self.company_member(target_id)?.clone();

        self.session.impersonate(target.id.clone());
        self.touch_session();
        info!(
            "{} now impersonating {}",
            self.session.real_id().unwrap_or_default(),
            target.id
        );
        Ok(target)
    }

    pub fn stop_impersonating(&mut self) -> AppResult<User> {
        if !self.session.stop_impersonating() {
            return Err(AppError::validation("Not impersonating anyone"));
        }
        self.touch_session();
        self.acting_user().cloned()
    }

    pub fn session_view(&self) -> AppResult<SessionView> {
        let user = PublicUser::from(self.acting_user()?);
        let impersonator = self
            .session
            .impersonator_id()
            .and_then(|id| self.user(id))
            .map(PublicUser::from);
        Ok(SessionView { user, impersonator })
    }
}

fn token_response(data: &AppState, user: &User) -> AppResult<HttpResponse> {
    let token = create_jwt(&user.id, &data.config.jwt_secret, data.config.token_ttl_hours)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "token": token,
        "user": PublicUser::from(user),
    })))
}

// Signup Endpoint
pub async fn signup(
    data: web::Data<AppState>,
    signup_info: web::Json<SignupRequest>,
) -> AppResult<HttpResponse> {
    let mut ws = data.workspace.lock().await;
    let user = ws.signup(signup_info.into_inner())?;
    data.commit(&mut ws).await?;
    token_response(&data, &user)
}

// Login Endpoint
pub async fn login(
    data: web::Data<AppState>,
    login_info: web::Json<LoginRequest>,
) -> AppResult<HttpResponse> {
    debug!("Login attempt for {}", login_info.email);
    let mut ws = data.workspace.lock().await;
    let user = ws.login(&login_info.email, &login_info.password)?;
    data.commit(&mut ws).await?;
    token_response(&data, &user)
}

pub async fn logout(req: HttpRequest, data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let mut ws = data.authorized(&req).await?;
    ws.logout();
    data.commit(&mut ws).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "Logged out" })))
}

pub async fn get_session(req: HttpRequest, data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let ws = data.authorized(&req).await?;
    Ok(HttpResponse::Ok().json(ws.session_view()?))
}

pub async fn impersonate(
    req: HttpRequest,
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let mut ws = data.authorized(&req).await?;
    ws.impersonate(&user_id)?;
    data.commit(&mut ws).await?;
    Ok(HttpResponse::Ok().json(ws.session_view()?))
}

pub async fn stop_impersonating(req: HttpRequest, data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let mut ws = data.authorized(&req).await?;
    ws.stop_impersonating()?;
    data.commit(&mut ws).await?;
    Ok(HttpResponse::Ok().json(ws.session_view()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::workspace::testing::{self, signup_request};

    #[test]
    fn admin_signup_founds_a_fresh_company() {
        let mut ws = testing::workspace();
        let first = ws.signup(signup_request("Ada", "ada@example.com", true)).unwrap();
        let second = ws.signup(signup_request("Bob", "bob@example.com", true)).unwrap();

        assert_eq!(first.role, Role::Admin);
        assert!(first.company_id.starts_with("org-"));
        assert_ne!(first.company_id, ROOT_COMPANY_ID);
        assert_ne!(first.company_id, second.company_id);
        assert_eq!(first.position, "System Overseer");
        assert_eq!(first.name, "Ada Tester");
    }

    #[test]
    fn member_signup_joins_the_root_company() {
        let mut ws = testing::workspace();
        let user = ws.signup(signup_request("Cy", "cy@example.com", false)).unwrap();
        assert_eq!(user.role, Role::Member);
        assert_eq!(user.company_id, ROOT_COMPANY_ID);
        assert_eq!(user.position, "Ecosystem Member");
        assert_ne!(user.password, "s3cret!");
        assert_eq!(ws.session().acting_id(), Some(user.id.as_str()));
    }

    #[test]
    fn signup_rejects_blank_fields_and_duplicate_emails() {
        let mut ws = testing::workspace();
        let mut blank = signup_request("Dee", "dee@example.com", false);
        blank.password = "   ".into();
        assert!(matches!(ws.signup(blank), Err(AppError::Validation(_))));

        let dup = signup_request("Eve", "ADMIN@delimhub.com", false);
        assert!(matches!(ws.signup(dup), Err(AppError::Conflict(_))));
        assert_eq!(ws.users().len(), 1);
        assert_eq!(ws.session(), &Session::LoggedOut);
    }

    #[test]
    fn login_matches_email_case_insensitively_and_marks_online() {
        let mut ws = testing::workspace();
        let user = ws.signup(signup_request("Fay", "fay@example.com", false)).unwrap();
        ws.logout();
        assert!(!ws.user(&user.id).unwrap().is_online());

        let logged = ws.login("FAY@Example.com", "s3cret!").unwrap();
        assert_eq!(logged.id, user.id);
        assert!(ws.user(&user.id).unwrap().is_online());
    }

    #[test]
    fn wrong_password_never_changes_the_session() {
        let mut ws = testing::workspace();
        let admin = testing::admin(&mut ws, "Gus");
        let before = ws.session().clone();
        ws.take_dirty();

        let err = ws.login("admin@delimhub.com", "nope").unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::WrongPassword)));
        assert_eq!(ws.session(), &before);
        assert_eq!(ws.session().acting_id(), Some(admin.id.as_str()));
        assert!(ws.take_dirty().is_empty());

        let err = ws.login("nobody@example.com", "s3cret!").unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::UnknownEmail)));
        assert_eq!(ws.session(), &before);
    }

    #[test]
    fn bootstrap_admin_can_log_in() {
        let mut ws = testing::workspace();
        let admin = ws.login("admin@delimhub.com", "password").unwrap();
        assert_eq!(admin.id, "u-root");
    }

    #[test]
    fn impersonation_round_trip_restores_the_admin() {
        let mut ws = testing::workspace();
        let admin = ws.login("admin@delimhub.com", "password").unwrap();
        let member = ws.signup(signup_request("Hal", "hal@example.com", false)).unwrap();
        ws.login("admin@delimhub.com", "password").unwrap();

        ws.impersonate(&member.id).unwrap();
        let view = ws.session_view().unwrap();
        assert_eq!(view.user.id, member.id);
        assert_eq!(view.impersonator.unwrap().id, admin.id);

        let restored = ws.stop_impersonating().unwrap();
        assert_eq!(restored.id, admin.id);
        assert_eq!(ws.session(), &Session::LoggedIn { user_id: admin.id.clone() });
        assert_eq!(ws.encode(StoreKey::Impersonator).unwrap(), None);
    }

    #[test]
    fn second_impersonation_keeps_the_original_restore_target() {
        let mut ws = testing::workspace();
        ws.login("admin@delimhub.com", "password").unwrap();
        let deputy = ws
            .add_member(crate::team_management::NewMemberRequest {
                name: "Deputy Admin".into(),
                position: "Ops".into(),
                email: "deputy@example.com".into(),
                password: "pw".into(),
                role: Role::Admin,
            })
            .unwrap();
        let dev = ws
            .add_member(crate::team_management::NewMemberRequest {
                name: "Dev One".into(),
                position: "Dev".into(),
                email: "dev@example.com".into(),
                password: "pw".into(),
                role: Role::Member,
            })
            .unwrap();

        ws.impersonate(&deputy.id).unwrap();
        ws.impersonate(&dev.id).unwrap();
        assert_eq!(ws.session().impersonator_id(), Some("u-root"));
        assert_eq!(ws.session().acting_id(), Some(dev.id.as_str()));

        ws.stop_impersonating().unwrap();
        assert_eq!(ws.session().acting_id(), Some("u-root"));
    }

    #[test]
    fn members_cannot_impersonate() {
        let mut ws = testing::workspace();
        let member = ws.signup(signup_request("Ivy", "ivy@example.com", false)).unwrap();
        let err = ws.impersonate("u-root").unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(ws.session().acting_id(), Some(member.id.as_str()));
    }

    #[test]
    fn impersonation_is_limited_to_the_company() {
        let mut ws = testing::workspace();
        testing::admin(&mut ws, "Jon");
        let err = ws.impersonate("u-root").unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(!ws.session().is_impersonating());
    }

    #[test]
    fn logout_clears_the_impersonation_record() {
        let mut ws = testing::workspace();
        ws.login("admin@delimhub.com", "password").unwrap();
        let member = ws.signup(signup_request("Kit", "kit@example.com", false)).unwrap();
        ws.login("admin@delimhub.com", "password").unwrap();
        ws.impersonate(&member.id).unwrap();

        ws.logout();
        assert_eq!(ws.session(), &Session::LoggedOut);
        assert_eq!(ws.encode(StoreKey::CurrentUser).unwrap(), None);
        assert!(!ws.user("u-root").unwrap().is_online());
    }

    #[test]
    fn tokens_round_trip_their_subject() {
        let token = create_jwt("u-42", "secret", 1).unwrap();
        assert_eq!(validate_jwt(&token, "secret").unwrap().sub, "u-42");
        assert!(validate_jwt(&token, "other").is_err());
    }

    #[test]
    fn email_shape_is_checked() {
        assert!(valid_email("a@b.co"));
        assert!(!valid_email("a@b"));
        assert!(!valid_email("no at sign.com"));
    }
}
