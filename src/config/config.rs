use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use reqwest::Url;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use super::logging::LoggingConfig;
use super::store::StoreConfig;
use crate::error::ConfigError;

/// Environment variables with this prefix override file values,
/// nested keys separated by `__` (e.g. `SMDC_HTTP__BASE_URL`).
pub const ENV_PREFIX: &str = "SMDC_";

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ConfigV1 {
    pub platform: Platform,
    pub http: HttpConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which client the pipeline runs in. The admin dashboard has no silent
/// re-authentication; the mini-program re-authenticates with a platform login code.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Admin,
    Mini,
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct HttpConfig {
    pub base_url: String,
    /// Used for the rest of the session once the primary host is unreachable.
    #[serde(default)]
    pub alternate_base_url: Option<String>,
    #[serde(default = "default_timeout_in_ms")]
    pub timeout_in_ms: u64,
    /// Keep a cookie jar and send cookies with every request.
    #[serde(default = "default_true")]
    pub with_credentials: bool,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_in_ms)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct SessionConfig {
    #[serde(default = "default_redirect_cooldown_ms")]
    pub redirect_cooldown_ms: u64,
    /// The view forced navigations go to.
    #[serde(default = "default_login_route")]
    pub login_route: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Re-authentication endpoint. Without it the platform cannot silently re-authenticate.
    #[serde(default)]
    pub refresh_path: Option<String>,
    #[serde(default = "default_whoami_path")]
    pub whoami_path: String,
    #[serde(default = "default_token_key")]
    pub token_key: String,
}

impl SessionConfig {
    pub fn redirect_cooldown(&self) -> Duration {
        Duration::from_millis(self.redirect_cooldown_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            redirect_cooldown_ms: default_redirect_cooldown_ms(),
            login_route: default_login_route(),
            login_path: default_login_path(),
            refresh_path: None,
            whoami_path: default_whoami_path(),
            token_key: default_token_key(),
        }
    }
}

/// View policies. Every route not listed is protected; the login route is always public.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
pub struct RoutesConfig {
    #[serde(default)]
    pub public: Vec<String>,
    /// Entered even without a session, but a login redirect is still issued.
    #[serde(default)]
    pub lenient: Vec<String>,
}

fn default_timeout_in_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_redirect_cooldown_ms() -> u64 {
    3_000
}

fn default_login_route() -> String {
    "/login".to_string()
}

fn default_login_path() -> String {
    "/admin/employee/login".to_string()
}

fn default_whoami_path() -> String {
    "/mini/user/info".to_string()
}

fn default_token_key() -> String {
    "token".to_string()
}

/// Load config from a YAML file, with `SMDC_` environment overrides.
pub fn load_config(path: impl AsRef<Path>) -> Result<ConfigV1, ConfigError> {
    let figment = Figment::new()
        .merge(Yaml::file(path.as_ref()))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));
    from_figment(figment)
}

/// Extract and validate a configuration from an already assembled figment.
pub fn from_figment(figment: Figment) -> Result<ConfigV1, ConfigError> {
    let config = match figment.extract::<Config>()? {
        Config::ConfigV1(c) => c,
    };
    // handle configuration migration between versions here when necessary
    config.validate()?;
    Ok(config)
}

impl ConfigV1 {
    fn validate(&self) -> Result<(), ConfigError> {
        parse_base_url("http.base_url", &self.http.base_url)?;
        if let Some(alternate) = &self.http.alternate_base_url {
            parse_base_url("http.alternate_base_url", alternate)?;
        }
        if self.http.timeout_in_ms == 0 {
            return Err(ConfigError::Invalid(
                "http.timeout_in_ms must be greater than zero".to_string(),
            ));
        }
        if self.session.login_route.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "session.login_route must not be empty".to_string(),
            ));
        }
        if self.session.token_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "session.token_key must not be empty".to_string(),
            ));
        }
        for (index, layer) in self.store.layers.iter().enumerate() {
            if layer.key().is_some_and(|key| key.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "store.layers[{index}].key must not be empty when set"
                )));
            }
        }
        self.logging.level_filter()?;
        Ok(())
    }
}

fn parse_base_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::Invalid(format!("{field} '{value}' is not a URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid(format!(
            "{field} must use http or https, got '{other}'"
        ))),
    }
}

/// The JSON schema for the configuration.
pub fn schema_json() -> Result<String, serde_json::Error> {
    let schema = schema_for!(Config);
    serde_json::to_string_pretty(&schema)
}
