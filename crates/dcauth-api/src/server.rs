//! DCAuth server implementation

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use dcauth_auth::ldap::{resolve_endpoint, LdapConnector};
use dcauth_core::config::{keys, ServerConfig};
use dcauth_core::{ConfigSource, DirectorySettings, Result, TokenSettings};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{info, warn};

use crate::gateway::AuthGateway;
use crate::metrics::{metrics_handler, metrics_middleware, MetricsRecorder};
use crate::routes;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<AuthGateway>,
    pub metrics: Option<Arc<MetricsRecorder>>,
    pub start_time: Instant,
}

/// DCAuth server
pub struct AuthServer {
    config: Arc<dyn ConfigSource>,
    server: ServerConfig,
    metrics: Option<MetricsRecorder>,
}

impl AuthServer {
    pub fn new(config: Arc<dyn ConfigSource>, server: ServerConfig) -> Self {
        Self {
            config,
            server,
            metrics: None,
        }
    }

    /// Serve `/metrics` from this recorder
    pub fn with_metrics(mut self, metrics: MetricsRecorder) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn run(self) -> Result<()> {
        self.check_configuration();

        let state = AppState {
            gateway: Arc::new(AuthGateway::new(
                self.config.clone(),
                Arc::new(LdapConnector::new()),
            )),
            metrics: self.metrics.map(Arc::new),
            start_time: Instant::now(),
        };

        let app = create_router(state);
        let addr = self.server.socket_address();
        let listener = TcpListener::bind(addr.as_str()).await?;

        info!("DCAuth gateway listening on http://{}", addr);
        info!("Authentication endpoint: POST http://{}/checkAuth", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("DCAuth gateway stopped");
        Ok(())
    }

    /// Configuration is read per request; this only surfaces problems early
    fn check_configuration(&self) {
        let config = self.config.as_ref();

        for warning in configuration_warnings(config) {
            warn!("{}", warning);
        }

        if let Ok(endpoint) = DirectorySettings::from_source(config)
            .and_then(|settings| resolve_endpoint(settings.url.as_deref()))
        {
            info!("Directory endpoint: {}", endpoint);
        }

        if let Ok(tokens) = TokenSettings::from_source(config) {
            if tokens.enabled && tokens.signing_key.is_some() {
                info!(
                    lifetime_minutes = tokens.lifetime_minutes,
                    issuer = ?tokens.issuer,
                    audience = ?tokens.audience,
                    "Token issuance enabled"
                );
            }
        }
    }
}

/// Problems an operator should see at startup
fn configuration_warnings(config: &dyn ConfigSource) -> Vec<String> {
    let mut warnings = Vec::new();

    match DirectorySettings::from_source(config) {
        Ok(settings) => {
            if settings.allow_empty_password {
                warnings.push(format!(
                    "{} is enabled; Active Directory treats an empty-password simple bind \
                     as an anonymous bind that succeeds, so any username gets a token",
                    keys::DIRECTORY_ALLOW_EMPTY_PASSWORD
                ));
            }
            if let Err(e) = resolve_endpoint(settings.url.as_deref()) {
                warnings.push(format!("Directory configuration problem: {}", e));
            }
        }
        Err(e) => warnings.push(format!("Directory configuration problem: {}", e)),
    }

    match TokenSettings::from_source(config) {
        Ok(tokens) if !tokens.enabled => warnings
            .push("Token issuance disabled; successful checks return no token".to_string()),
        Ok(tokens) if tokens.signing_key.is_none() => warnings
            .push("JWT signing key not configured; successful checks will fail".to_string()),
        Ok(_) => {}
        Err(e) => warnings.push(format!("Token configuration problem: {}", e)),
    }

    warnings
}

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/checkAuth", post(routes::check_auth))
        .route("/health", get(routes::health))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
