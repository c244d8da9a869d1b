use serde::{Deserialize, Serialize};

use super::ROOT_COMPANY_ID;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Member,
}

/// A roster entry. `password` holds a bcrypt hash; records written by older
/// clients may still carry plaintext, which the workspace rehashes on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub role: Role,
    pub company_id: String,
    pub position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn email_matches(&self, email: &str) -> bool {
        self.email.trim().eq_ignore_ascii_case(email.trim())
    }

    pub fn is_online(&self) -> bool {
        self.is_online.unwrap_or(false)
    }

    /// The system administrator seeded into an empty roster.
    pub fn bootstrap_admin(password_hash: String) -> Self {
        User {
            id: "u-root".to_string(),
            name: "System Admin".to_string(),
            email: "admin@delimhub.com".to_string(),
            password: password_hash,
            role: Role::Admin,
            company_id: ROOT_COMPANY_ID.to_string(),
            position: "Root Administrator".to_string(),
            avatar: None,
            is_online: Some(true),
        }
    }
}

/// What the API exposes about a user: everything but the password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub company_id: String,
    pub position: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub is_online: bool,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        PublicUser {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            company_id: user.company_id.clone(),
            position: user.position.clone(),
            avatar: user.avatar.clone(),
            is_online: user.is_online(),
        }
    }
}
