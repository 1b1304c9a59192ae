use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{FileStorage, MemoryStorage};
use crate::config::{StorageLayerConfig, StoreConfig};
use crate::error::StoreError;
use crate::models::{Principal, Token};

/// Storage key of the persisted principal, next to the token.
pub const PRINCIPAL_KEY: &str = "principal";

/// Synchronous key-value persistence offered by the platform
/// (session storage, cookies, mini-program local storage).
pub trait KvStorage: Send + Sync {
    fn name(&self) -> &str;
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Reads and writes the session token over an ordered list of storage layers.
///
/// `get` prefers the first layer holding a value and falls back to the later
/// ones; `set` and `clear` touch every layer so the copies never disagree.
/// A layer may keep the token under its own key (the admin cookie uses
/// `Admin-Token` while session storage uses `token`).
pub struct TokenStore {
    layers: Vec<Layer>,
    token_key: String,
}

struct Layer {
    storage: Arc<dyn KvStorage>,
    token_key: Option<String>,
}

#[derive(Clone, Copy)]
enum Key<'a> {
    Token,
    Named(&'a str),
}

impl TokenStore {
    pub fn new(layers: Vec<Arc<dyn KvStorage>>, token_key: impl Into<String>) -> Self {
        Self::with_layer_keys(layers.into_iter().map(|l| (l, None)).collect(), token_key)
    }

    /// Like `new`, with an optional token key per layer overriding `token_key`.
    pub fn with_layer_keys(
        layers: Vec<(Arc<dyn KvStorage>, Option<String>)>,
        token_key: impl Into<String>,
    ) -> Self {
        let mut layers: Vec<Layer> = layers
            .into_iter()
            .map(|(storage, token_key)| Layer { storage, token_key })
            .collect();
        if layers.is_empty() {
            layers.push(Layer {
                storage: Arc::new(MemoryStorage::default()),
                token_key: None,
            });
        }
        TokenStore {
            layers,
            token_key: token_key.into(),
        }
    }

    /// A store backed by a single in-memory layer.
    pub fn in_memory() -> Self {
        Self::new(Vec::new(), "token")
    }

    pub fn get(&self) -> Option<Token> {
        self.read_first(Key::Token).map(Token::new)
    }

    pub fn has_token(&self) -> bool {
        self.get().is_some()
    }

    pub fn set(&self, token: &Token) -> Result<(), StoreError> {
        debug!("Persisting token to {} storage layer(s)", self.layers.len());
        self.write_all(Key::Token, token.as_str())
    }

    /// Removes token and principal from every layer.
    pub fn clear(&self) -> Result<(), StoreError> {
        debug!("Clearing token from {} storage layer(s)", self.layers.len());
        let token = self.remove_all(Key::Token);
        let principal = self.remove_all(Key::Named(PRINCIPAL_KEY));
        token.and(principal)
    }

    pub fn principal(&self) -> Option<Principal> {
        let raw = self.read_first(Key::Named(PRINCIPAL_KEY))?;
        match serde_json::from_str(&raw) {
            Ok(principal) => Some(principal),
            Err(e) => {
                warn!("Stored principal is not valid JSON, ignoring it: {}", e);
                None
            }
        }
    }

    pub fn set_principal(&self, principal: &Principal) -> Result<(), StoreError> {
        let raw = serde_json::to_string(principal).map_err(|source| StoreError::Serde {
            key: PRINCIPAL_KEY.to_string(),
            source,
        })?;
        self.write_all(Key::Named(PRINCIPAL_KEY), &raw)
    }

    pub fn remove_principal(&self) -> Result<(), StoreError> {
        self.remove_all(Key::Named(PRINCIPAL_KEY))
    }

    /// Arbitrary session-scoped flags (e.g. the alternate host preference).
    pub fn flag(&self, key: &str) -> bool {
        self.read_first(Key::Named(key)).is_some_and(|v| v == "true")
    }

    pub fn set_flag(&self, key: &str, value: bool) -> Result<(), StoreError> {
        if value {
            self.write_all(Key::Named(key), "true")
        } else {
            self.remove_all(Key::Named(key))
        }
    }

    fn resolve<'a>(&'a self, layer: &'a Layer, key: Key<'a>) -> &'a str {
        match key {
            Key::Token => layer.token_key.as_deref().unwrap_or(&self.token_key),
            Key::Named(name) => name,
        }
    }

    fn read_first(&self, key: Key<'_>) -> Option<String> {
        for layer in &self.layers {
            let name = self.resolve(layer, key);
            match layer.storage.get(name) {
                Ok(Some(value)) if !value.is_empty() => return Some(value),
                Ok(_) => continue,
                Err(e) => warn!("Reading '{}' from '{}' failed: {}", name, layer.storage.name(), e),
            }
        }
        None
    }

    /// Attempts every layer; reports the first failure after trying them all.
    fn write_all(&self, key: Key<'_>, value: &str) -> Result<(), StoreError> {
        self.each_layer(key, |storage, name| storage.set(name, value))
    }

    fn remove_all(&self, key: Key<'_>) -> Result<(), StoreError> {
        self.each_layer(key, |storage, name| storage.remove(name))
    }

    fn each_layer<F>(&self, key: Key<'_>, op: F) -> Result<(), StoreError>
    where
        F: Fn(&dyn KvStorage, &str) -> Result<(), StoreError>,
    {
        let mut first_error = None;
        for layer in &self.layers {
            let name = self.resolve(layer, key);
            if let Err(e) = op(layer.storage.as_ref(), name) {
                warn!("Writing '{}' to '{}' failed: {}", name, layer.storage.name(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Creates the layered token store described by the StoreConfig.
/// `token_key` applies to every layer that does not set its own `key`.
pub fn create_store(config: &StoreConfig, token_key: &str) -> Result<TokenStore, StoreError> {
    let mut layers: Vec<(Arc<dyn KvStorage>, Option<String>)> =
        Vec::with_capacity(config.layers.len());
    for (index, layer) in config.layers.iter().enumerate() {
        match layer {
            StorageLayerConfig::Memory(cfg) => {
                let name = cfg.name.clone().unwrap_or_else(|| format!("memory-{index}"));
                layers.push((Arc::new(MemoryStorage::new(name)), cfg.key.clone()));
            }
            StorageLayerConfig::File(cfg) => {
                let name = cfg.name.clone().unwrap_or_else(|| format!("file-{index}"));
                layers.push((Arc::new(FileStorage::open(name, &cfg.path)?), cfg.key.clone()));
            }
        }
    }
    if layers.is_empty() {
        info!("No storage layers configured. Using a single in-memory layer.");
    }
    Ok(TokenStore::with_layer_keys(layers, token_key))
}
