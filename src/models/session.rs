use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ClientError;

/// An opaque bearer token. Its contents are never inspected.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(raw: impl Into<String>) -> Self {
        Token(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The value of the `Authorization` header carrying this token.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// The logged-in employee (admin dashboard) or customer (mini-program).
/// Fields other than the common ones are kept as-is.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Principal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Principal {
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.username.as_deref())
    }
}

/// Token plus principal of the active client process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub token: Option<Token>,
    pub principal: Option<Principal>,
}

/// Username/password login form.
#[derive(Serialize, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `data` of a successful login or re-authentication.
/// The admin backend names the principal `employee`, the mini-program backend `user`.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, alias = "employee", alias = "user")]
    pub principal: Option<Principal>,
}

impl LoginResponse {
    /// A login only counts when a non-empty token came back, even if `code == 1`.
    pub fn into_session(self) -> Result<Session, ClientError> {
        let token = self
            .token
            .filter(|t| !t.trim().is_empty())
            .map(Token::new)
            .ok_or(ClientError::MissingToken)?;
        Ok(Session {
            token: Some(token),
            principal: self.principal,
        })
    }
}
