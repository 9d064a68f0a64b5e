// crates/bench-results-config/src/config.rs
// ============================================================================
// Module: Bench Results Configuration
// Description: Configuration loading and validation for the results service.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: bench-results-core, bench-results-store-*, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The path comes from the caller, then `BENCH_RESULTS_CONFIG`, then
//! `bench-results.toml` in the working directory. Missing or invalid
//! configuration fails closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use bench_results_core::CommitResolver;
use bench_results_core::IdentityCommitResolver;
use bench_results_core::StaticCommitResolver;
use bench_results_core::runtime::commits::is_commit_hex;
use bench_results_store_postgres::PostgresStoreConfig;
use bench_results_store_sqlite::SqliteStoreConfig;
use bench_results_store_sqlite::SqliteStoreMode;
use bench_results_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "bench-results.toml";
/// Environment variable naming the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "BENCH_RESULTS_CONFIG";
/// Maximum config file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum length of a full path.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum auth token length.
pub(crate) const MAX_AUTH_TOKEN_LENGTH: usize = 256;
/// Maximum number of static commit mappings.
pub(crate) const MAX_COMMIT_MAPPINGS: usize = 4096;
/// Maximum accepted request body size.
pub(crate) const MAX_BODY_BYTES_LIMIT: usize = 256 * 1024 * 1024;
/// Maximum request timeout.
pub(crate) const MAX_REQUEST_TIMEOUT_MS: u64 = 3_600_000;
/// Default plain HTTP bind address.
pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8081";
/// Default TLS bind address.
pub const DEFAULT_TLS_BIND: &str = "127.0.0.1:10443";

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Results service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchResultsConfig {
    /// Listener configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Shared-token authentication.
    pub auth: AuthConfig,
    /// Store backend configuration.
    pub store: StoreConfig,
    /// Commit resolution configuration.
    #[serde(default)]
    pub products: ProductsConfig,
}

impl BenchResultsConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", resolved.display())))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.auth.validate()?;
        self.store.validate()?;
        self.products.validate()
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address; defaults depend on whether TLS is configured.
    #[serde(default)]
    pub bind: Option<String>,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Optional TLS configuration.
    #[serde(default)]
    pub tls: Option<ServerTlsConfig>,
    /// Audit logging configuration.
    #[serde(default)]
    pub audit: ServerAuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: None,
            max_body_bytes: default_max_body_bytes(),
            request_timeout_ms: default_request_timeout_ms(),
            tls: None,
            audit: ServerAuditConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Returns the effective bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let default = if self.tls.is_some() { DEFAULT_TLS_BIND } else { DEFAULT_HTTP_BIND };
        let bind = self.bind.as_deref().map_or(default, str::trim);
        bind.parse().map_err(|_| ConfigError::Invalid(format!("invalid bind address: {bind}")))
    }

    /// Validates listener configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Invalid("server.max_body_bytes out of range".to_string()));
        }
        if self.request_timeout_ms == 0 || self.request_timeout_ms > MAX_REQUEST_TIMEOUT_MS {
            return Err(ConfigError::Invalid(
                "server.request_timeout_ms out of range".to_string(),
            ));
        }
        self.bind_addr()?;
        if let Some(tls) = &self.tls {
            tls.validate()?;
        }
        self.audit.validate()
    }
}

/// TLS configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerTlsConfig {
    /// Server certificate chain (PEM).
    pub cert_path: String,
    /// Server private key (PEM).
    pub key_path: String,
}

impl ServerTlsConfig {
    /// Validates TLS configuration paths.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("server.tls.cert_path", &self.cert_path)?;
        validate_path_string("server.tls.key_path", &self.key_path)
    }
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerAuditConfig {
    /// Enable structured audit logging.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Optional audit log path (JSON lines); stderr when absent.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for ServerAuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            path: None,
        }
    }
}

impl ServerAuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("server.audit.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Auth
// ============================================================================

/// Shared-token authentication configuration.
///
/// # Invariants
/// - Exactly one of `token` and `token_env` is set.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Inline token value.
    #[serde(default)]
    pub token: Option<String>,
    /// Environment variable holding the token.
    #[serde(default)]
    pub token_env: Option<String>,
}

impl AuthConfig {
    /// Returns true when the token is stored inline in the config file.
    #[must_use]
    pub const fn is_inline(&self) -> bool {
        self.token.is_some()
    }

    /// Resolves the token value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the environment variable is unset
    /// or the token violates length limits.
    pub fn resolve_token(&self) -> Result<String, ConfigError> {
        let token = match (&self.token, &self.token_env) {
            (Some(token), None) => token.clone(),
            (None, Some(name)) => env::var(name).map_err(|_| {
                ConfigError::Invalid(format!("auth.token_env variable {name} is not set"))
            })?,
            _ => {
                return Err(ConfigError::Invalid(
                    "auth requires exactly one of token or token_env".to_string(),
                ));
            }
        };
        validate_token(&token)?;
        Ok(token)
    }

    /// Validates auth configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (&self.token, &self.token_env) {
            (Some(token), None) => validate_token(token),
            (None, Some(name)) => {
                if name.trim().is_empty() {
                    return Err(ConfigError::Invalid("auth.token_env must be non-empty".to_string()));
                }
                Ok(())
            }
            _ => Err(ConfigError::Invalid(
                "auth requires exactly one of token or token_env".to_string(),
            )),
        }
    }
}

/// Validates token length limits.
fn validate_token(token: &str) -> Result<(), ConfigError> {
    if token.trim().is_empty() {
        return Err(ConfigError::Invalid("auth token must be non-empty".to_string()));
    }
    if token.len() > MAX_AUTH_TOKEN_LENGTH {
        return Err(ConfigError::Invalid("auth token exceeds max length".to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// `SQLite` database file.
    #[default]
    Sqlite,
    /// Postgres server.
    Postgres,
}

/// Store backend configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// `SQLite` busy timeout in milliseconds.
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Postgres connection string.
    #[serde(default)]
    pub connection: Option<String>,
    /// Maximum pooled connections; backend default when absent.
    #[serde(default)]
    pub max_connections: Option<u32>,
    /// Pool checkout timeout in milliseconds; backend default when absent.
    #[serde(default)]
    pub connection_timeout_ms: Option<u64>,
    /// Postgres statement timeout in milliseconds.
    #[serde(default)]
    pub statement_timeout_ms: Option<u64>,
}

impl StoreConfig {
    /// Builds the `SQLite` backend configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the store is not sqlite or lacks a path.
    pub fn sqlite_config(&self) -> Result<SqliteStoreConfig, ConfigError> {
        if self.store_type != StoreType::Sqlite {
            return Err(ConfigError::Invalid("store type is not sqlite".to_string()));
        }
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| ConfigError::Invalid("sqlite store requires path".to_string()))?;
        let mut config = SqliteStoreConfig::new(path.clone());
        config.journal_mode = self.journal_mode;
        config.sync_mode = self.sync_mode;
        if let Some(busy_timeout_ms) = self.busy_timeout_ms {
            config.busy_timeout_ms = busy_timeout_ms;
        }
        if let Some(max_connections) = self.max_connections {
            config.max_connections = max_connections;
        }
        if let Some(connection_timeout_ms) = self.connection_timeout_ms {
            config.connection_timeout_ms = connection_timeout_ms;
        }
        config.validate().map_err(|err| ConfigError::Invalid(err.to_string()))?;
        Ok(config)
    }

    /// Builds the Postgres backend configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the store is not postgres or lacks
    /// a connection string.
    pub fn postgres_config(&self) -> Result<PostgresStoreConfig, ConfigError> {
        if self.store_type != StoreType::Postgres {
            return Err(ConfigError::Invalid("store type is not postgres".to_string()));
        }
        let connection = self.connection.as_ref().ok_or_else(|| {
            ConfigError::Invalid("postgres store requires connection".to_string())
        })?;
        let mut config = PostgresStoreConfig::new(connection.clone());
        if let Some(max_connections) = self.max_connections {
            config.max_connections = max_connections;
        }
        if let Some(connection_timeout_ms) = self.connection_timeout_ms {
            config.connection_timeout_ms = connection_timeout_ms;
        }
        if let Some(statement_timeout_ms) = self.statement_timeout_ms {
            config.statement_timeout_ms = statement_timeout_ms;
        }
        config.validate().map_err(|err| ConfigError::Invalid(err.to_string()))?;
        Ok(config)
    }

    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Sqlite => {
                if self.connection.is_some() || self.statement_timeout_ms.is_some() {
                    return Err(ConfigError::Invalid(
                        "sqlite store must not set postgres options".to_string(),
                    ));
                }
                self.sqlite_config().map(|_| ())
            }
            StoreType::Postgres => {
                if self.path.is_some() || self.busy_timeout_ms.is_some() {
                    return Err(ConfigError::Invalid(
                        "postgres store must not set sqlite options".to_string(),
                    ));
                }
                self.postgres_config().map(|_| ())
            }
        }
    }
}

// ============================================================================
// SECTION: Products
// ============================================================================

/// Commit resolver selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResolverKind {
    /// Versions must already be commit ids.
    #[default]
    Identity,
    /// Configured mappings, then identity.
    Static,
}

/// One configured `(product, version) -> commit` mapping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommitMapping {
    /// Product name.
    pub product: String,
    /// Version reference.
    pub version: String,
    /// Commit id.
    pub commit: String,
}

/// Commit resolution configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductsConfig {
    /// Resolver selection.
    #[serde(default)]
    pub resolver: ResolverKind,
    /// Static mappings.
    #[serde(default)]
    pub commits: Vec<CommitMapping>,
}

impl ProductsConfig {
    /// Builds the configured commit resolver.
    #[must_use]
    pub fn commit_resolver(&self) -> Arc<dyn CommitResolver> {
        match self.resolver {
            ResolverKind::Identity => Arc::new(IdentityCommitResolver),
            ResolverKind::Static => {
                let mut resolver = StaticCommitResolver::new();
                for mapping in &self.commits {
                    resolver.insert(&mapping.product, &mapping.version, &mapping.commit);
                }
                Arc::new(resolver)
            }
        }
    }

    /// Validates resolver configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.resolver == ResolverKind::Identity && !self.commits.is_empty() {
            return Err(ConfigError::Invalid(
                "products.commits requires resolver = \"static\"".to_string(),
            ));
        }
        if self.commits.len() > MAX_COMMIT_MAPPINGS {
            return Err(ConfigError::Invalid("too many products.commits entries".to_string()));
        }
        for mapping in &self.commits {
            if mapping.product.trim().is_empty() || mapping.version.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "products.commits entries require product and version".to_string(),
                ));
            }
            if !is_commit_hex(&mapping.commit) {
                return Err(ConfigError::Invalid(format!(
                    "products.commits commit for {} {} is not a hex commit id",
                    mapping.product, mapping.version
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the caller or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Default maximum body size (16 MiB).
const fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

/// Default request timeout (six minutes).
const fn default_request_timeout_ms() -> u64 {
    360_000
}

/// Audit logging is on unless disabled.
const fn default_audit_enabled() -> bool {
    true
}
