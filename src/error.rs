//! Error types for the session and request pipeline.

use thiserror::Error;

/// Shown when a business failure carries no message of its own.
pub const DEFAULT_BUSINESS_MESSAGE: &str = "System error";
/// Shown for every failure where no response reached the client.
pub const NETWORK_ERROR_MESSAGE: &str = "Network error, please try again later";
/// Shown when the session could not be recovered.
pub const SESSION_EXPIRED_MESSAGE: &str = "Login expired, please log in again";

/// Failures of a platform key-value storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("value for '{key}' is not valid JSON: {source}")]
    Serde {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Figment(#[from] figment::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything a request through the pipeline can fail with.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No response was received (offline, DNS failure, refused connection, timeout).
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The primary host failed and the one retry against the alternate host failed too.
    #[error("{primary} is unreachable and the alternate {alternate} failed as well: {source}")]
    HostUnreachable {
        primary: String,
        alternate: String,
        #[source]
        source: reqwest::Error,
    },
    /// A response arrived with a status the envelope contract does not cover.
    #[error("unexpected HTTP status {status}")]
    Http { status: u16 },
    /// The envelope carried a non-success code that does not concern the session.
    #[error("request rejected with code {code}: {msg}")]
    Business { code: i64, msg: String },
    /// Envelope code or HTTP 401 saying the token no longer authenticates the caller.
    /// `code` is the envelope code, or 401 when the signal came from the HTTP status.
    #[error("session invalid (code {code})")]
    SessionInvalid { code: i64 },
    /// Recovery of an invalid session failed.
    #[error("session expired, please log in again")]
    SessionExpired,
    #[error("login succeeded but no token was returned")]
    MissingToken,
    #[error("silent re-authentication is not available on this platform")]
    ReauthUnavailable,
    #[error("could not obtain a platform login code: {0}")]
    LoginCode(String),
    #[error("failed to encode or decode a payload: {source}")]
    Serde {
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ClientError {
    /// True when no response reached the client.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Transport { .. } | ClientError::HostUnreachable { .. }
        )
    }

    /// The text a client shows to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Business { msg, .. } if !msg.trim().is_empty() => msg.clone(),
            ClientError::Business { .. } => DEFAULT_BUSINESS_MESSAGE.to_string(),
            ClientError::Transport { .. } | ClientError::HostUnreachable { .. } => {
                NETWORK_ERROR_MESSAGE.to_string()
            }
            ClientError::Http { status } => format!("Request failed: {status}"),
            ClientError::SessionInvalid { .. } | ClientError::SessionExpired => {
                SESSION_EXPIRED_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_message_is_shown_verbatim() {
        let err = ClientError::Business {
            code: 0,
            msg: "菜品已停售".to_string(),
        };
        assert_eq!(err.user_message(), "菜品已停售");
    }

    #[test]
    fn empty_business_message_falls_back() {
        let err = ClientError::Business {
            code: 0,
            msg: "  ".to_string(),
        };
        assert_eq!(err.user_message(), DEFAULT_BUSINESS_MESSAGE);
    }

    #[test]
    fn session_errors_are_not_transport() {
        assert!(!ClientError::SessionExpired.is_transport());
        assert!(!ClientError::SessionInvalid { code: 50014 }.is_transport());
        assert_eq!(
            ClientError::SessionExpired.user_message(),
            SESSION_EXPIRED_MESSAGE
        );
    }
}
