// crates/bench-results-api/src/server.rs
// ============================================================================
// Module: Results Server
// Description: Server bootstrap from configuration for plain HTTP and TLS.
// Purpose: Wire the store, resolver, auth gate, and audit sink into a router.
// Dependencies: axum, axum-server, bench-results-config, rustls, tokio
// ============================================================================

//! ## Overview
//! [`ApiServer::from_config`] performs blocking work (store open, schema
//! migration) and must run outside async worker threads, for example inside
//! `tokio::task::spawn_blocking`. [`ApiServer::serve`] then binds the
//! listener and runs until a shutdown signal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use bench_results_config::BenchResultsConfig;
use bench_results_config::ServerConfig;
use bench_results_config::ServerTlsConfig;
use bench_results_config::StoreConfig;
use bench_results_config::StoreType;
use bench_results_store_postgres::PostgresStore;
use bench_results_store_sqlite::SqliteStore;
use thiserror::Error;

use crate::audit::AuditSink;
use crate::audit::FileAuditSink;
use crate::audit::NoopAuditSink;
use crate::audit::StartupAuditEvent;
use crate::audit::StderrAuditSink;
use crate::auth::AuthGate;
use crate::handlers::ApiState;
use crate::handlers::router;

// ============================================================================
// SECTION: Store Handle
// ============================================================================

/// Opened store backend.
pub enum StoreHandle {
    /// `SQLite` backend.
    Sqlite(Arc<SqliteStore>),
    /// Postgres backend.
    Postgres(Arc<PostgresStore>),
}

impl StoreHandle {
    /// Opens the configured backend, creating or validating its schema.
    ///
    /// # Errors
    ///
    /// Returns [`ApiServerError`] when the configuration is invalid or the
    /// store cannot be opened.
    pub fn open(config: &StoreConfig) -> Result<Self, ApiServerError> {
        match config.store_type {
            StoreType::Sqlite => {
                let sqlite = config.sqlite_config().map_err(|err| ApiServerError::Config(err.to_string()))?;
                let store = SqliteStore::open(sqlite).map_err(|err| ApiServerError::Init(err.to_string()))?;
                Ok(Self::Sqlite(Arc::new(store)))
            }
            StoreType::Postgres => {
                let postgres =
                    config.postgres_config().map_err(|err| ApiServerError::Config(err.to_string()))?;
                let store =
                    PostgresStore::open(&postgres).map_err(|err| ApiServerError::Init(err.to_string()))?;
                Ok(Self::Postgres(Arc::new(store)))
            }
        }
    }

    /// Returns the backend label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::Postgres(_) => "postgres",
        }
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Results HTTP server.
pub struct ApiServer {
    /// Listener address.
    bind: SocketAddr,
    /// TLS configuration when enabled.
    tls: Option<ServerTlsConfig>,
    /// Router with state attached.
    app: Router,
}

impl ApiServer {
    /// Builds a server from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ApiServerError`] when configuration, token resolution, audit
    /// setup, or store initialization fails.
    pub fn from_config(config: &BenchResultsConfig) -> Result<Self, ApiServerError> {
        config.validate().map_err(|err| ApiServerError::Config(err.to_string()))?;
        let bind = config.server.bind_addr().map_err(|err| ApiServerError::Config(err.to_string()))?;
        let token = config.auth.resolve_token().map_err(|err| ApiServerError::Config(err.to_string()))?;
        let audit = build_audit_sink(&config.server)?;
        emit_startup_warnings(config, bind, audit.as_ref());
        let commits = config.products.commit_resolver();
        let auth = AuthGate::new(token);
        let timeout = Duration::from_millis(config.server.request_timeout_ms);
        let max_body_bytes = config.server.max_body_bytes;
        let app = match StoreHandle::open(&config.store)? {
            StoreHandle::Sqlite(store) => router(Arc::new(
                ApiState::new(store, commits, auth)
                    .with_audit(audit)
                    .with_max_body_bytes(max_body_bytes)
                    .with_request_timeout(timeout),
            )),
            StoreHandle::Postgres(store) => router(Arc::new(
                ApiState::new(store, commits, auth)
                    .with_audit(audit)
                    .with_max_body_bytes(max_body_bytes)
                    .with_request_timeout(timeout),
            )),
        };
        Ok(Self {
            bind,
            tls: config.server.tls.clone(),
            app,
        })
    }

    /// Returns the configured listener address.
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        self.bind
    }

    /// Serves requests until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns [`ApiServerError`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ApiServerError> {
        self.serve_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    /// Serves requests until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ApiServerError`] when binding or serving fails.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<(), ApiServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let service = self.app.into_make_service_with_connect_info::<SocketAddr>();
        match self.tls {
            None => {
                let listener = tokio::net::TcpListener::bind(self.bind)
                    .await
                    .map_err(|err| ApiServerError::Transport(format!("http bind failed: {err}")))?;
                axum::serve(listener, service)
                    .with_graceful_shutdown(shutdown)
                    .await
                    .map_err(|err| ApiServerError::Transport(format!("http server failed: {err}")))
            }
            Some(tls) => {
                let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
                let rustls_config = RustlsConfig::from_pem_file(
                    Path::new(tls.cert_path.trim()),
                    Path::new(tls.key_path.trim()),
                )
                .await
                .map_err(|err| ApiServerError::Init(format!("tls config failed: {err}")))?;
                let server = axum_server::bind_rustls(self.bind, rustls_config).serve(service);
                tokio::select! {
                    result = server => result
                        .map_err(|err| ApiServerError::Transport(format!("https server failed: {err}"))),
                    () = shutdown => Ok(()),
                }
            }
        }
    }
}

/// Builds the audit sink selected by configuration.
fn build_audit_sink(server: &ServerConfig) -> Result<Arc<dyn AuditSink>, ApiServerError> {
    if !server.audit.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match &server.audit.path {
        Some(path) => {
            let sink = FileAuditSink::new(Path::new(path.trim()))
                .map_err(|err| ApiServerError::Init(format!("audit log open failed: {err}")))?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(StderrAuditSink)),
    }
}

/// Records posture warnings for risky but permitted configurations.
fn emit_startup_warnings(config: &BenchResultsConfig, bind: SocketAddr, audit: &dyn AuditSink) {
    if config.auth.is_inline() {
        audit.record_startup(&StartupAuditEvent::new(
            "inline_auth_token",
            "auth token is stored in the config file; prefer auth.token_env",
        ));
    }
    if config.server.tls.is_none() && !bind.ip().is_loopback() {
        audit.record_startup(&StartupAuditEvent::new(
            "plaintext_network_bind",
            format!("serving plain HTTP on non-loopback address {bind}; tokens travel unencrypted"),
        ));
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server bootstrap and transport errors.
#[derive(Debug, Error)]
pub enum ApiServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}
