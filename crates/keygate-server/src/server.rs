use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Request, Response},
    routing::get,
};
use keygate_auth::{
    GatewayState, ProviderEndpoints, TokenExchangeClient, TokenValidator, UserInfoAssembler,
    oauth::ClientCredentials,
    storage::{AccountStorage, InMemoryAccountStorage},
    token::SigningKeyCache,
};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;

pub struct KeygateServer {
    addr: SocketAddr,
    app: Router,
}

/// Wires the gateway components from configuration.
///
/// Every outbound call shares one HTTP client, so the configured request
/// timeout applies to the token endpoint, the certs endpoint and the admin API.
pub fn build_state(
    cfg: &AppConfig,
    storage: Arc<dyn AccountStorage>,
) -> anyhow::Result<GatewayState> {
    let auth = &cfg.auth;
    auth.validate()?;

    let endpoints = Arc::new(ProviderEndpoints::from_config(&auth.provider, &auth.http)?);
    let client = auth.http.build_client()?;

    let keys = Arc::new(SigningKeyCache::new(client.clone(), endpoints.certs.clone()));
    let validator = Arc::new(TokenValidator::new(keys, auth.tokens.clone())?);
    let exchange = Arc::new(TokenExchangeClient::new(
        client,
        endpoints.token.clone(),
        ClientCredentials::new(&auth.provider.client_id, &auth.provider.client_secret),
    ));

    Ok(GatewayState::new(
        endpoints,
        validator,
        exchange,
        UserInfoAssembler::new(storage).with_auto_provision(auth.accounts.auto_provision),
    ))
}

pub fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let storage: Arc<dyn AccountStorage> = Arc::new(InMemoryAccountStorage::new());
    Ok(app_router(cfg, build_state(cfg, storage)?))
}

/// Mounts the gateway routes plus health and request tracing.
pub fn app_router(cfg: &AppConfig, state: GatewayState) -> Router {
    keygate_auth::router(state)
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(cfg.server.body_limit_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<_>| {
                    // Health checks are polled constantly
                    if req.uri().path() == "/healthz" {
                        return tracing::span!(tracing::Level::TRACE, "noop");
                    }
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
                        http.status_code = tracing::field::Empty,
                    )
                })
                .on_response(|res: &Response<_>, latency: Duration, span: &tracing::Span| {
                    span.record("http.status_code", tracing::field::display(res.status().as_u16()));
                    if let Some(meta) = span.metadata()
                        && meta.name() != "noop"
                    {
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    }
                }),
        )
}

async fn healthz() -> &'static str {
    "ok"
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    storage: Option<Arc<dyn AccountStorage>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            storage: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.addr = config.addr();
        self.config = config;
        self
    }

    /// Uses an existing account store instead of a fresh in-memory one.
    pub fn with_storage(mut self, storage: Arc<dyn AccountStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Builds the server and pre-loads the provider's signing keys.
    ///
    /// A failed key fetch is logged and left to the first validation to retry.
    pub async fn build(self) -> anyhow::Result<KeygateServer> {
        let storage: Arc<dyn AccountStorage> = match self.storage {
            Some(storage) => storage,
            None => Arc::new(InMemoryAccountStorage::new()),
        };
        let state = build_state(&self.config, storage)?;

        match state.validator.key_cache().refresh().await {
            Ok(keys) => tracing::info!(keys = keys.len(), "signing keys loaded"),
            Err(e) => tracing::warn!(error = %e, "signing keys unavailable at startup"),
        }

        Ok(KeygateServer {
            addr: self.addr,
            app: app_router(&self.config, state),
        })
    }
}

impl KeygateServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener until a shutdown signal arrives.
    pub async fn serve(self, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
        tracing::info!("listening on {}", listener.local_addr()?);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
