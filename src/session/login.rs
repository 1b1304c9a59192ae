use serde_json::json;
use tracing::{debug, info, warn};

use crate::client::{ApiRequest, Transport};
use crate::error::{ClientError, StoreError};
use crate::models::{Credentials, LoginResponse, Principal, Session};
use crate::store::TokenStore;

/// Result of the launch-time session check.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    /// Nothing was stored.
    NoSession,
    /// The backend accepted the stored token.
    Restored(Principal),
    /// The backend rejected the stored token; it was removed.
    Cleared,
    /// The backend could not be asked; the stored session is kept as-is.
    Offline,
}

/// Username/password login. Goes straight to the transport: a rejected login
/// is an ordinary error and never starts session recovery.
pub async fn login(
    transport: &Transport,
    login_path: &str,
    credentials: &Credentials,
) -> Result<Session, ClientError> {
    debug!(username = credentials.username.as_str(), "logging in");
    let request = ApiRequest::post(login_path).json(
        serde_json::to_value(credentials).map_err(|source| ClientError::Serde { source })?,
    );
    let response: LoginResponse = transport.send(&request).await?;
    let session = response.into_session()?;

    let tokens = transport.tokens();
    if let Some(token) = &session.token {
        tokens.set(token)?;
    }
    match &session.principal {
        Some(principal) => tokens.set_principal(principal)?,
        None => tokens.remove_principal()?,
    }
    info!(
        event_name = "session.login",
        event_domain = "session",
        principal = session
            .principal
            .as_ref()
            .and_then(Principal::display_name)
            .unwrap_or(""),
        "logged in"
    );
    Ok(session)
}

/// Forgets token and principal in every storage layer.
pub fn logout(tokens: &TokenStore) -> Result<(), StoreError> {
    tokens.clear()?;
    info!(event_name = "session.logout", event_domain = "session", "logged out");
    Ok(())
}

/// Asks the backend who the stored token belongs to.
pub async fn restore(transport: &Transport, whoami_path: &str) -> RestoreOutcome {
    let tokens = transport.tokens();
    if !tokens.has_token() {
        debug!("no stored session");
        return RestoreOutcome::NoSession;
    }

    let request = ApiRequest::post(whoami_path).json(json!({}));
    match transport.send::<Option<Principal>>(&request).await {
        Ok(Some(principal)) => {
            if let Err(e) = tokens.set_principal(&principal) {
                warn!("Could not store the restored principal: {}", e);
            }
            info!(event_name = "session.restored", event_domain = "session", "session restored");
            RestoreOutcome::Restored(principal)
        }
        Ok(None) => {
            info!(event_name = "session.restored", event_domain = "session", "session restored");
            RestoreOutcome::Restored(tokens.principal().unwrap_or_default())
        }
        Err(e @ (ClientError::SessionInvalid { .. } | ClientError::Business { .. })) => {
            info!(
                event_name = "session.rejected",
                event_domain = "session",
                "stored session rejected: {}",
                e
            );
            if let Err(e) = tokens.clear() {
                warn!("Could not clear the rejected session: {}", e);
            }
            RestoreOutcome::Cleared
        }
        Err(e) => {
            warn!("Could not verify the stored session, keeping it: {}", e);
            RestoreOutcome::Offline
        }
    }
}
