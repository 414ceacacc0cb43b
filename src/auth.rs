use axum::extract::{Path, Query, Request, State};
use axum::http::header::{LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::cookies::{clear_tenant_cookie, tenant_cookie};
use crate::error::AuthError;
use crate::gateway::GatewayState;
use crate::handler::{is_local_path, CallbackQuery};
use crate::session::SessionData;

/// Query params for /auth/login
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    /// Where to redirect after successful login.
    pub redirect: Option<String>,
    /// Scheme to challenge. The default scheme when absent.
    pub scheme: Option<String>,
    /// Tenant to select before signing in.
    pub tenant: Option<String>,
}

/// Query params for /auth/logout
#[derive(Debug, Default, Deserialize)]
pub struct LogoutQuery {
    pub redirect: Option<String>,
}

/// Query params for /auth/tenant
#[derive(Debug, Default, Deserialize)]
pub struct TenantQuery {
    /// Tenant to select. Clears the selection when absent or empty.
    pub name: Option<String>,
    pub redirect: Option<String>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::BadRequest(_)
            | AuthError::RemoteFailure { .. }
            | AuthError::UnknownScheme(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AuthError::Discovery(_) | AuthError::TokenExchange(_) | AuthError::Http(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }
        json_error(status, &self.to_string())
    }
}

/// Handle GET /auth/login
///
/// Optionally selects a tenant, then redirects to the identity provider
/// with a correlation cookie for the callback.
pub async fn login(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<LoginQuery>,
) -> Result<Response, AuthError> {
    let handler = state.schemes.resolve(query.scheme.as_deref())?;
    let redirect = local_redirect(query.redirect.as_deref());
    let challenge = handler.challenge(&redirect).await?;

    let mut headers = vec![(LOCATION, challenge.url)];
    if let Some(tenant) = query.tenant.as_deref().filter(|t| !t.is_empty()) {
        let tenant_key = state.tenant_options.snapshot().await.tenant_key;
        tracing::debug!("Selecting tenant {} before login", tenant);
        headers.push((SET_COOKIE, tenant_cookie(&tenant_key, tenant, state.secure_cookies)));
    }
    headers.push((SET_COOKIE, challenge.correlation_cookie));

    Ok((StatusCode::FOUND, AppendHeaders(headers)).into_response())
}

/// Handle GET /auth/callback for the default scheme.
pub async fn callback(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<CallbackQuery>,
    request: Request,
) -> Result<Response, AuthError> {
    complete_login(&state, None, &query, request).await
}

/// Handle GET /auth/callback/:scheme
pub async fn scheme_callback(
    State(state): State<Arc<GatewayState>>,
    Path(scheme): Path<String>,
    Query(query): Query<CallbackQuery>,
    request: Request,
) -> Result<Response, AuthError> {
    complete_login(&state, Some(&scheme), &query, request).await
}

/// Redeem the code, create a session cookie, and redirect to the original URL.
async fn complete_login(
    state: &GatewayState,
    scheme: Option<&str>,
    query: &CallbackQuery,
    request: Request,
) -> Result<Response, AuthError> {
    let handler = state.schemes.resolve(scheme)?;
    // Request extensions act as the request services seen by event handlers.
    let (parts, _) = request.into_parts();
    let ticket = handler
        .handle_callback(query, &parts.headers, parts.extensions)
        .await?;

    let session = SessionData::from_ticket(&ticket, state.session_manager.max_age_seconds());
    let cookie = state.session_manager.create_session(session).await?;

    Ok((
        StatusCode::FOUND,
        AppendHeaders([
            (LOCATION, ticket.redirect_url),
            (SET_COOKIE, cookie),
            (SET_COOKIE, handler.clear_correlation_cookie()),
        ]),
    )
        .into_response())
}

/// Handle GET /auth/logout
///
/// Destroys the local session, then sends the user to the provider's
/// end-session endpoint when one is known.
pub async fn logout(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Query(query): Query<LogoutQuery>,
) -> Result<Response, AuthError> {
    let current = state.session_manager.current(&headers).await;
    let redirect = local_redirect(query.redirect.as_deref());

    let mut location = redirect.clone();
    if let Some((session_id, session)) = current {
        state.session_manager.destroy_session(&session_id).await;
        let handler = state.schemes.resolve(Some(&session.scheme))?;
        if let Some(url) = handler
            .end_session_url(session.id_token.as_deref(), &redirect)
            .await?
        {
            location = url;
        }
    }

    Ok((
        StatusCode::FOUND,
        AppendHeaders([
            (LOCATION, location),
            (SET_COOKIE, state.session_manager.clear_cookie()),
        ]),
    )
        .into_response())
}

/// Handle GET /auth/userinfo: current user from the session.
pub async fn userinfo(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    match state.session_manager.current(&headers).await {
        Some((_, session)) => Json(serde_json::json!({
            "authenticated": true,
            "scheme": session.scheme,
            "user_id": session.user_id,
            "tenant_id": session.tenant_id,
            "claims": session.claims,
        }))
        .into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "authenticated": false })),
        )
            .into_response(),
    }
}

/// Handle GET /auth/tenant: set or clear the tenant cookie.
pub async fn switch_tenant(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<TenantQuery>,
) -> Response {
    let tenant_key = state.tenant_options.snapshot().await.tenant_key;
    let cookie = match query.name.as_deref().filter(|n| !n.is_empty()) {
        Some(name) => tenant_cookie(&tenant_key, name, state.secure_cookies),
        None => clear_tenant_cookie(&tenant_key, state.secure_cookies),
    };

    (
        StatusCode::FOUND,
        AppendHeaders([
            (LOCATION, local_redirect(query.redirect.as_deref())),
            (SET_COOKIE, cookie),
        ]),
    )
        .into_response()
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn local_redirect(redirect: Option<&str>) -> String {
    match redirect {
        Some(r) if is_local_path(r) => r.to_string(),
        _ => "/".to_string(),
    }
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_redirect() {
        assert_eq!(local_redirect(Some("/orders")), "/orders");
        assert_eq!(local_redirect(Some("https://evil.test")), "/");
        assert_eq!(local_redirect(Some("//evil.test")), "/");
        assert_eq!(local_redirect(Some("/\\evil.test")), "/");
        assert_eq!(local_redirect(None), "/");
    }

    #[test]
    fn test_error_status_mapping() {
        let resp = AuthError::BadRequest("x".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = AuthError::TokenExchange("x".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let resp = AuthError::MissingService("options").into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
