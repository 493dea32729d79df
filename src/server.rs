//! # Server Configuration
//!
//! This module contains the server setup and configuration for the Social
//! Connect API: shared application state, the router, and the OpenAPI
//! document.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use axum::{
    Router,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::admin_auth_middleware;
use crate::config::AppConfig;
use crate::credentials::CredentialsResolver;
use crate::crypto::CryptoKey;
use crate::handlers;
use crate::platforms::registry::PlatformRegistry;
use crate::repositories::{ConnectionRepository, IntegrationSettingRepository};
use crate::telemetry::trace_context_middleware;
use crate::token_manager::TokenManager;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub crypto_key: CryptoKey,
    pub registry: Arc<PlatformRegistry>,
    pub token_manager: Arc<TokenManager>,
}

impl AppState {
    /// Builds a credential resolver over the shared pool and key.
    pub fn credentials_resolver(&self) -> CredentialsResolver {
        let settings =
            IntegrationSettingRepository::new(Arc::new(self.db.clone()), self.crypto_key.clone());
        CredentialsResolver::new(settings, Arc::clone(&self.config))
    }
}

/// Assembles the application state from validated configuration and an
/// established database connection.
pub fn build_app_state(config: Arc<AppConfig>, db: DatabaseConnection) -> Result<AppState> {
    let key_bytes = config
        .crypto_key
        .clone()
        .ok_or_else(|| anyhow!("CRYPTO_KEY must be configured"))?;
    let crypto_key =
        CryptoKey::new(key_bytes).map_err(|e| anyhow!("Invalid encryption key: {}", e))?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_seconds))
        .build()
        .context("Failed to build HTTP client")?;
    let registry = Arc::new(PlatformRegistry::new(http));

    let connections = ConnectionRepository::new(Arc::new(db.clone()), crypto_key.clone());
    let settings = IntegrationSettingRepository::new(Arc::new(db.clone()), crypto_key.clone());
    let credentials = CredentialsResolver::new(settings, Arc::clone(&config));
    let token_manager = Arc::new(TokenManager::new(
        Arc::clone(&config),
        connections,
        credentials,
        Arc::clone(&registry),
    ));

    Ok(AppState {
        config,
        db,
        crypto_key,
        registry,
        token_manager,
    })
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route(
            "/integrations",
            get(handlers::settings::list_integration_settings),
        )
        .route(
            "/integrations/{platform}",
            get(handlers::settings::get_integration_setting)
                .put(handlers::settings::upsert_integration_setting)
                .delete(handlers::settings::delete_integration_setting),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/auth/{platform}", get(handlers::connect::start_oauth))
        .route(
            "/auth/{platform}/callback",
            get(handlers::callback::oauth_callback),
        )
        .route(
            "/auth/{platform}/refresh-token",
            post(handlers::tokens::refresh_token),
        )
        .route(
            "/auth/{platform}/disconnect",
            post(handlers::tokens::disconnect),
        )
        .route(
            "/connections",
            get(handlers::connections::list_connections),
        )
        .nest("/admin", admin_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(trace_context_middleware))
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: Arc<AppConfig>,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let state = build_app_state(config, db)?;
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, profile = %profile, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .build(),
                ),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::connect::start_oauth,
        crate::handlers::callback::oauth_callback,
        crate::handlers::tokens::refresh_token,
        crate::handlers::tokens::disconnect,
        crate::handlers::connections::list_connections,
        crate::handlers::settings::list_integration_settings,
        crate::handlers::settings::get_integration_setting,
        crate::handlers::settings::upsert_integration_setting,
        crate::handlers::settings::delete_integration_setting,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::connect::AuthorizeResponse,
            crate::handlers::tokens::RefreshTokenResponse,
            crate::handlers::tokens::DisconnectResponse,
            crate::handlers::connections::ConnectionInfo,
            crate::handlers::connections::ConnectionsResponse,
            crate::handlers::settings::UpsertIntegrationSettingRequest,
            crate::handlers::settings::IntegrationSettingResponse,
            crate::handlers::settings::DeleteIntegrationSettingResponse,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Postbridge Social Connect API",
        description = "OAuth connection and token lifecycle API for social platforms",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
