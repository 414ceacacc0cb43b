use axum::routing::get;
use axum::{Extension, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::builder::{AuthenticationBuilder, AuthenticationSchemes};
use crate::config::GatewayConfig;
use crate::error::Result;
use crate::options::{MultiTenancyOptions, OptionsMonitor};
use crate::session::SessionManager;
use crate::tenant::TenantOpenIdConnectExt;

/// Shared state available to all request handlers.
pub struct GatewayState {
    pub schemes: AuthenticationSchemes,
    pub session_manager: SessionManager,
    pub tenant_options: OptionsMonitor<MultiTenancyOptions>,
    pub secure_cookies: bool,
}

impl GatewayState {
    pub fn from_config(config: &GatewayConfig, http_client: reqwest::Client) -> Result<Self> {
        let mut builder = AuthenticationBuilder::with_http_client(http_client);
        builder.add_tenant_open_id_connect_named(
            &config.oidc.scheme,
            &config.oidc.display_name,
            |options| config.oidc.apply(options),
        )?;

        Ok(Self {
            schemes: builder.build()?,
            session_manager: SessionManager::new(&config.session)?,
            tenant_options: OptionsMonitor::new(MultiTenancyOptions::from(&config.multi_tenancy)),
            secure_cookies: config.session.secure,
        })
    }
}

pub fn create_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(auth::health))
        .route("/auth/login", get(auth::login))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/callback/:scheme", get(auth::scheme_callback))
        .route("/auth/logout", get(auth::logout))
        .route("/auth/userinfo", get(auth::userinfo))
        .route("/auth/tenant", get(auth::switch_tenant))
        // Request services resolved by event handlers.
        .layer(Extension(state.tenant_options.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
