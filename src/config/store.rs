use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Ordered storage layers backing the token store. Reads try each layer in
/// turn, writes and removals go to every layer. An empty list means a single
/// in-memory layer.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
pub struct StoreConfig {
    #[serde(default)]
    pub layers: Vec<StorageLayerConfig>,
}

/// The existing storage backends. We differentiate them via a "type" tag in the YAML.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
#[serde(tag = "type")]
pub enum StorageLayerConfig {
    /// Lives as long as the process, like browser session storage.
    #[serde(rename = "memory")]
    Memory(MemoryLayerConfig),
    /// A JSON file of key/value pairs, like a cookie jar or mini-program local storage.
    #[serde(rename = "file")]
    File(FileLayerConfig),
}

impl StorageLayerConfig {
    pub fn key(&self) -> Option<&str> {
        match self {
            StorageLayerConfig::Memory(cfg) => cfg.key.as_deref(),
            StorageLayerConfig::File(cfg) => cfg.key.as_deref(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
pub struct MemoryLayerConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Key of the token in this layer, overriding `session.token_key`.
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct FileLayerConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Key of the token in this layer, overriding `session.token_key`.
    #[serde(default)]
    pub key: Option<String>,
    pub path: String,
}
