use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,        // Argon2 hash, not exposed in JSON
    pub is_staff: bool,
    pub created_at: OffsetDateTime,
    pub last_login: Option<OffsetDateTime>,
}

/// One-to-one companion of [`User`]; names and email mirror the user row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Profile {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

impl Profile {
    /// Copies user fields onto the profile. Returns whether anything changed.
    pub fn sync_from(&mut self, user: &User) -> bool {
        let mut changed = false;
        for (dst, src) in [
            (&mut self.first_name, &user.first_name),
            (&mut self.last_name, &user.last_name),
            (&mut self.email, &user.email),
        ] {
            if *dst != *src {
                dst.clone_from(src);
                changed = true;
            }
        }
        changed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginEventKind {
    LoginSuccess,
    LoginFailure,
    Logout,
    Signup,
}

impl LoginEventKind {
    pub const ALL: [LoginEventKind; 4] = [
        LoginEventKind::LoginSuccess,
        LoginEventKind::LoginFailure,
        LoginEventKind::Logout,
        LoginEventKind::Signup,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LoginEventKind::LoginSuccess => "login_success",
            LoginEventKind::LoginFailure => "login_failure",
            LoginEventKind::Logout => "logout",
            LoginEventKind::Signup => "signup",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == raw)
    }
}

/// Audit row to be written for an authentication event.
#[derive(Debug, Clone)]
pub struct NewLoginEvent {
    pub user_id: Option<Uuid>,
    pub kind: LoginEventKind,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub username_tried: String,
}

impl NewLoginEvent {
    pub fn new(kind: LoginEventKind, user_id: Option<Uuid>, client: &crate::web::ClientMeta) -> Self {
        Self {
            user_id,
            kind,
            ip_address: client.ip.map(|ip| ip.to_string()),
            user_agent: client.user_agent.clone(),
            username_tried: String::new(),
        }
    }

    pub fn tried(mut self, username: &str) -> Self {
        self.username_tried = username.chars().take(150).collect();
        self
    }
}
