/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Server configuration.
//!
//! Configuration is read from a TOML file after `${VAR}`, `${VAR:-default}`
//! and `${VAR:?message}` environment substitution. The file is located by
//! [`ConfigLoader`] from an explicit path, `$COUNTERSIGN_CONFIG`, or the
//! first existing entry of its search paths.

use countersign::security::{Role, RolePermissions};
use countersign::signing::TimestampPolicy;
use countersign::SigningConfig;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "COUNTERSIGN_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found in any search location")]
    ConfigNotFound,

    #[error("Failed to read configuration file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("Environment variable substitution failed: {0}")]
    EnvSubstitutionError(String),

    #[error("Unsupported configuration file format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub signing: SigningSection,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Upper bound on request bodies, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningSection {
    pub tsa_url: Option<Url>,
    #[serde(default = "default_tsa_timeout_secs")]
    pub tsa_timeout_secs: u64,
    #[serde(default)]
    pub timestamp_policy: TimestampPolicy,
    /// Seconds between expiry sweeps; 0 leaves expiry lazy only
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_hsm_timeout_secs")]
    pub hsm_timeout_secs: u64,
    #[serde(default = "default_list_limit")]
    pub default_list_limit: u32,
    #[serde(default = "default_max_list_limit")]
    pub max_list_limit: u32,
    pub backend: Option<BackendConfig>,
}

impl Default for SigningSection {
    fn default() -> Self {
        Self {
            tsa_url: None,
            tsa_timeout_secs: default_tsa_timeout_secs(),
            timestamp_policy: TimestampPolicy::default(),
            sweep_interval_secs: default_sweep_interval_secs(),
            hsm_timeout_secs: default_hsm_timeout_secs(),
            default_list_limit: default_list_limit(),
            max_list_limit: default_max_list_limit(),
            backend: None,
        }
    }
}

/// Where signatures come from.
#[derive(Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Local PKCS#12 container
    Pkcs12 { path: PathBuf, password: String },
    /// Remote HSM; `key_id` of `None` auto-selects at startup
    Hsm {
        base_url: Url,
        api_key: Option<String>,
        key_id: Option<String>,
    },
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendConfig::Pkcs12 { path, .. } => f
                .debug_struct("Pkcs12")
                .field("path", path)
                .field("password", &"[REDACTED]")
                .finish(),
            BackendConfig::Hsm {
                base_url,
                api_key,
                key_id,
            } => f
                .debug_struct("Hsm")
                .field("base_url", base_url)
                .field("api_key", &api_key.as_ref().map(|_| "[REDACTED]"))
                .field("key_id", key_id)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentsConfig {
    /// Directory holding canonical document bytes, one file per document id
    #[serde(default = "default_documents_root")]
    pub root: PathBuf,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            root: default_documents_root(),
        }
    }
}

/// Role table and actor assignments.
///
/// ```toml
/// [roles.definitions.manager]
/// permissions = { delegations = { create = true, approve = true } }
///
/// [roles.assignments]
/// alice = "manager"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RolesConfig {
    #[serde(default)]
    pub definitions: BTreeMap<String, RoleDefinition>,
    #[serde(default)]
    pub assignments: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleDefinition {
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub permissions: RolePermissions,
}

impl RolesConfig {
    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.definitions.iter().map(|(name, def)| Role {
            name: name.clone(),
            is_admin: def.is_admin,
            permissions: def.permissions.clone(),
        })
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tsa_timeout_secs() -> u64 {
    countersign::config::DEFAULT_TSA_TIMEOUT.as_secs()
}

fn default_hsm_timeout_secs() -> u64 {
    countersign::config::DEFAULT_HSM_TIMEOUT.as_secs()
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_list_limit() -> u32 {
    50
}

fn default_max_list_limit() -> u32 {
    500
}

fn default_documents_root() -> PathBuf {
    PathBuf::from("./documents")
}

impl ServerConfig {
    /// Checks cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.http.max_body_bytes == 0 {
            errors.push("http.max_body_bytes must be positive".to_string());
        }
        if self.signing.tsa_timeout_secs == 0 {
            errors.push("signing.tsa_timeout_secs must be positive".to_string());
        }
        if self.signing.hsm_timeout_secs == 0 {
            errors.push("signing.hsm_timeout_secs must be positive".to_string());
        }
        if self.signing.max_list_limit == 0
            || self.signing.default_list_limit == 0
            || self.signing.default_list_limit > self.signing.max_list_limit
        {
            errors.push(format!(
                "signing list limits must satisfy 0 < default ({}) <= max ({})",
                self.signing.default_list_limit, self.signing.max_list_limit
            ));
        }
        if self.signing.timestamp_policy == TimestampPolicy::Required
            && self.signing.tsa_url.is_none()
        {
            errors.push(
                "signing.timestamp_policy = \"required\" needs signing.tsa_url".to_string(),
            );
        }
        for (actor, role) in &self.roles.assignments {
            if !self.roles.definitions.contains_key(role) {
                errors.push(format!("actor '{actor}' is assigned unknown role '{role}'"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError(errors.join("; ")))
        }
    }

    /// Library configuration derived from the `[signing]` section.
    pub fn signing_config(&self) -> SigningConfig {
        let sweep = match self.signing.sweep_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let hsm_url = match &self.signing.backend {
            Some(BackendConfig::Hsm { base_url, .. }) => Some(base_url.clone()),
            _ => None,
        };
        let hsm_api_key = match &self.signing.backend {
            Some(BackendConfig::Hsm { api_key, .. }) => api_key.clone(),
            _ => None,
        };

        SigningConfig::builder()
            .tsa_url(self.signing.tsa_url.clone())
            .tsa_timeout(Duration::from_secs(self.signing.tsa_timeout_secs))
            .timestamp_policy(self.signing.timestamp_policy)
            .hsm_base_url(hsm_url)
            .hsm_api_key(hsm_api_key)
            .hsm_timeout(Duration::from_secs(self.signing.hsm_timeout_secs))
            .expiry_sweep_interval(sweep)
            .list_limits(self.signing.default_list_limit, self.signing.max_list_limit)
            .build()
    }
}

pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths
    pub fn new() -> Self {
        let mut search_paths = vec![PathBuf::from("./countersign.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("countersign").join("config.toml"));
        }

        search_paths.push(PathBuf::from("/etc/countersign/config.toml"));

        Self { search_paths }
    }

    /// Create a config loader with custom search paths
    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Load configuration from the specified file or auto-discover
    pub fn load_config(&self, config_file: Option<&Path>) -> Result<ServerConfig, ConfigError> {
        let config_path = if let Some(path) = config_file {
            path.to_path_buf()
        } else if let Ok(env_config) = env::var(CONFIG_ENV_VAR) {
            PathBuf::from(env_config)
        } else {
            self.find_config_file().ok_or(ConfigError::ConfigNotFound)?
        };

        self.load_config_from_file(&config_path)
    }

    /// Load configuration from a specific file
    pub fn load_config_from_file(&self, path: &Path) -> Result<ServerConfig, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") | None => self.parse(&content),
            Some(ext) => Err(ConfigError::UnsupportedFormat {
                extension: ext.to_string(),
            }),
        }
    }

    /// Parse configuration text after environment substitution
    pub fn parse(&self, content: &str) -> Result<ServerConfig, ConfigError> {
        let substituted = substitute_env_vars(content)?;
        Ok(toml::from_str(&substituted)?)
    }

    /// Find the first existing configuration file in search paths
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .find(|path| path.is_file())
            .cloned()
    }

    /// Get all search paths for debugging
    pub fn get_search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Substitute environment variables in configuration content
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::EnvSubstitutionError(e.to_string()))?;

    let mut result = String::with_capacity(content.len());
    let mut last = 0;
    for cap in re.captures_iter(content) {
        let (Some(full), Some(expr)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        result.push_str(&content[last..full.start()]);
        result.push_str(&process_var_expression(expr.as_str())?);
        last = full.end();
    }
    result.push_str(&content[last..]);

    Ok(result)
}

/// Process a variable expression like "VAR", "VAR:-default", or "VAR:?error"
fn process_var_expression(expr: &str) -> Result<String, ConfigError> {
    if let Some((var_name, default_value)) = expr.split_once(":-") {
        Ok(env::var(var_name).unwrap_or_else(|_| default_value.to_string()))
    } else if let Some((var_name, error_msg)) = expr.split_once(":?") {
        env::var(var_name).map_err(|_| {
            ConfigError::EnvSubstitutionError(format!(
                "Required environment variable '{}' is not set: {}",
                var_name, error_msg
            ))
        })
    } else {
        env::var(expr).map_err(|_| {
            ConfigError::EnvSubstitutionError(format!(
                "Required environment variable '{}' is not set",
                expr
            ))
        })
    }
}
