use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The two account roles the site knows about.
///
/// The backend sends these uppercase (`"ADMIN"`, `"FRIEND"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Friend,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Friend => "FRIEND",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "FRIEND" => Ok(Role::Friend),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Token, role and display name of the logged-in user.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub role: Role,
    pub display_name: String,
}

impl Credential {
    pub fn new(token: impl Into<String>, role: Role, display_name: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            role,
            display_name: display_name.into(),
        }
    }
}

// Keep the bearer token out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("role", &self.role)
            .field("display_name", &self.display_name)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub role: Role,
}

/// Identity returned by `GET /auth/me`. The role here is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub role: Role,
}
