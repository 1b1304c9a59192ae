use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::client::{ApiRequest, Transport};
use crate::config::{ConfigV1, Platform};
use crate::error::ClientError;
use crate::models::{LoginResponse, Session};
use crate::platform::LoginCodeSource;

/// Obtains a fresh session without user interaction.
#[async_trait]
pub trait Reauthenticator: Send + Sync {
    fn get_name(&self) -> &str;
    async fn reauthenticate(&self, transport: &Transport) -> Result<Session, ClientError>;
}

/// For platforms that cannot silently re-authenticate (the admin dashboard).
/// Always fails, which sends the user back to the login view.
pub struct NoReauth;

#[async_trait]
impl Reauthenticator for NoReauth {
    fn get_name(&self) -> &str {
        "none"
    }

    async fn reauthenticate(&self, _transport: &Transport) -> Result<Session, ClientError> {
        Err(ClientError::ReauthUnavailable)
    }
}

/// Exchanges a one-time platform login code for a new token at the refresh endpoint.
pub struct RefreshEndpointReauth {
    path: String,
    codes: Arc<dyn LoginCodeSource>,
}

impl RefreshEndpointReauth {
    pub fn new(path: impl Into<String>, codes: Arc<dyn LoginCodeSource>) -> Self {
        RefreshEndpointReauth {
            path: path.into(),
            codes,
        }
    }
}

#[async_trait]
impl Reauthenticator for RefreshEndpointReauth {
    fn get_name(&self) -> &str {
        "refresh-endpoint"
    }

    async fn reauthenticate(&self, transport: &Transport) -> Result<Session, ClientError> {
        let code = self.codes.login_code().await.map_err(ClientError::LoginCode)?;
        debug!("Obtained platform login code, calling '{}'", self.path);

        let response: LoginResponse = transport
            .send(&ApiRequest::post(self.path.as_str()).json(json!({ "code": code })))
            .await?;
        response.into_session()
    }
}

/// Create the reauthenticator for the configured platform.
pub fn create_reauthenticator(
    config: &ConfigV1,
    codes: Option<Arc<dyn LoginCodeSource>>,
) -> Box<dyn Reauthenticator> {
    match (config.platform, &config.session.refresh_path, codes) {
        (Platform::Mini, Some(path), Some(codes)) => {
            info!("Silent re-authentication through '{}'", path);
            Box::new(RefreshEndpointReauth::new(path.clone(), codes))
        }
        (platform, path, codes) => {
            info!(
                ?platform,
                has_refresh_path = path.is_some(),
                has_code_source = codes.is_some(),
                "Silent re-authentication disabled"
            );
            Box::new(NoReauth)
        }
    }
}
