use crate::models::User;

/// Who is acting in the workspace. Impersonation is one level deep: the
/// real user is kept as the only restore target, however many times the
/// acting identity is switched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    #[default]
    LoggedOut,
    LoggedIn {
        user_id: String,
    },
    Impersonating {
        real_id: String,
        acting_id: String,
    },
}

impl Session {
    /// Rebuilds the session from the persisted current-user and
    /// impersonator records.
    pub fn from_records(current: Option<&User>, impersonator: Option<&User>) -> Self {
        match (current, impersonator) {
            (None, _) => Session::LoggedOut,
            (Some(user), None) => Session::LoggedIn {
                user_id: user.id.clone(),
            },
            (Some(user), Some(real)) if user.id == real.id => Session::LoggedIn {
                user_id: real.id.clone(),
            },
            (Some(user), Some(real)) => Session::Impersonating {
                real_id: real.id.clone(),
                acting_id: user.id.clone(),
            },
        }
    }

    pub fn acting_id(&self) -> Option<&str> {
        match self {
            Session::LoggedOut => None,
            Session::LoggedIn { user_id } => Some(user_id),
            Session::Impersonating { acting_id, .. } => Some(acting_id),
        }
    }

    /// The authenticated user, which differs from the acting one only while
    /// impersonating.
    pub fn real_id(&self) -> Option<&str> {
        match self {
            Session::LoggedOut => None,
            Session::LoggedIn { user_id } => Some(user_id),
            Session::Impersonating { real_id, .. } => Some(real_id),
        }
    }

    pub fn impersonator_id(&self) -> Option<&str> {
        match self {
            Session::Impersonating { real_id, .. } => Some(real_id),
            _ => None,
        }
    }

    pub fn is_impersonating(&self) -> bool {
        matches!(self, Session::Impersonating { .. })
    }

    pub fn login(&mut self, user_id: String) {
        *self = Session::LoggedIn { user_id };
    }

    /// Switches the acting identity. Returns false when logged out.
    pub fn impersonate(&mut self, target_id: String) -> bool {
        let real_id = match self {
            Session::LoggedOut => return false,
            Session::LoggedIn { user_id } => user_id.clone(),
            Session::Impersonating { real_id, .. } => real_id.clone(),
        };
        *self = if real_id == target_id {
            Session::LoggedIn { user_id: real_id }
        } else {
            Session::Impersonating {
                real_id,
                acting_id: target_id,
            }
        };
        true
    }

    /// Returns to the real user. Returns false when not impersonating.
    pub fn stop_impersonating(&mut self) -> bool {
        if !self.is_impersonating() {
            return false;
        }
        if let Session::Impersonating { real_id, .. } = std::mem::take(self) {
            *self = Session::LoggedIn { user_id: real_id };
        }
        true
    }

    pub fn logout(&mut self) {
        *self = Session::LoggedOut;
    }
}
