use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::transport::{ApiRequest, Transport};
use crate::error::ClientError;
use crate::platform::{Notice, Notifier};
use crate::session::{Recovery, RefreshCoordinator};

/// The client UI code talks to. Session-invalid answers never reach the
/// caller: they are handed to the refresh coordinator and the request is
/// replayed once after a successful recovery.
pub struct ApiClient {
    transport: Arc<Transport>,
    coordinator: Arc<RefreshCoordinator>,
    notifier: Arc<dyn Notifier>,
}

impl ApiClient {
    pub fn new(
        transport: Arc<Transport>,
        coordinator: Arc<RefreshCoordinator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        ApiClient {
            transport,
            coordinator,
            notifier,
        }
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub async fn request<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ClientError> {
        let result = self.request_with_recovery(&request).await;
        if let Err(e) = &result {
            // session expiry is announced by the coordinator itself
            if !matches!(e, ClientError::SessionExpired) {
                self.notifier.notify(Notice::error(e.user_message()));
            }
        }
        result
    }

    async fn request_with_recovery<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T, ClientError> {
        let sent_with = self.transport.tokens().get();
        let code = match self.transport.send(request).await {
            Err(ClientError::SessionInvalid { code }) => code,
            other => return other,
        };
        debug!(path = request.path.as_str(), code, "session invalid, handing over to recovery");

        match self
            .coordinator
            .recover(&self.transport, sent_with.as_ref())
            .await
        {
            Recovery::Recovered => match self.transport.send(request).await {
                Err(ClientError::SessionInvalid { code }) => {
                    info!(
                        path = request.path.as_str(),
                        code, "request rejected again after recovery"
                    );
                    self.notifier.notify(Notice::session_expired());
                    Err(ClientError::SessionExpired)
                }
                other => other,
            },
            Recovery::Failed => Err(ClientError::SessionExpired),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.request(ApiRequest::get(path)).await
    }

    pub async fn get_with<T, Q>(&self, path: &str, query: &Q) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.request(ApiRequest::get(path).query(to_value(query)?)).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(ApiRequest::post(path).json(to_value(body)?)).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(ApiRequest::put(path).json(to_value(body)?)).await
    }

    pub async fn delete<T, Q>(&self, path: &str, query: &Q) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.request(ApiRequest::delete(path).query(to_value(query)?))
            .await
    }
}

fn to_value<S: Serialize + ?Sized>(value: &S) -> Result<Value, ClientError> {
    serde_json::to_value(value).map_err(|source| ClientError::Serde { source })
}
