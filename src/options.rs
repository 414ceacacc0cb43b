use std::sync::Arc;

use tokio::sync::RwLock;

use crate::claims::ClaimActionCollection;
use crate::error::{AuthError, Result};
use crate::events::OpenIdConnectEvents;

/// Well-known defaults for OpenID Connect registrations.
pub struct OpenIdConnectDefaults;

impl OpenIdConnectDefaults {
    pub const AUTHENTICATION_SCHEME: &'static str = "OpenIdConnect";
    pub const DISPLAY_NAME: &'static str = "OpenIdConnect";
}

/// Per-scheme OpenID Connect settings.
#[derive(Clone)]
pub struct OpenIdConnectOptions {
    /// Issuer base URL. Used for discovery when explicit endpoints are missing.
    pub authority: String,
    pub client_id: String,
    pub client_secret: String,
    /// Absolute redirect URI registered with the identity provider.
    pub callback_url: String,
    pub scopes: Vec<String>,
    pub response_type: String,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub end_session_endpoint: Option<String>,
    pub claim_actions: ClaimActionCollection,
    pub events: OpenIdConnectEvents,
}

impl Default for OpenIdConnectOptions {
    fn default() -> Self {
        Self {
            authority: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            callback_url: String::new(),
            scopes: vec!["openid".to_string(), "profile".to_string()],
            response_type: "code".to_string(),
            authorization_endpoint: None,
            token_endpoint: None,
            end_session_endpoint: None,
            claim_actions: ClaimActionCollection::default(),
            events: OpenIdConnectEvents::default(),
        }
    }
}

impl std::fmt::Debug for OpenIdConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenIdConnectOptions")
            .field("authority", &self.authority)
            .field("client_id", &self.client_id)
            .field("callback_url", &self.callback_url)
            .field("scopes", &self.scopes)
            .field("response_type", &self.response_type)
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("end_session_endpoint", &self.end_session_endpoint)
            .field("claim_actions", &self.claim_actions)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl OpenIdConnectOptions {
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::ConfigurationError(
                "client_id must be provided".to_string(),
            ));
        }

        let has_endpoints =
            self.authorization_endpoint.is_some() && self.token_endpoint.is_some();
        if self.authority.trim().is_empty() && !has_endpoints {
            return Err(AuthError::ConfigurationError(
                "either authority or both authorization_endpoint and token_endpoint must be provided"
                    .to_string(),
            ));
        }

        if self.response_type != "code" {
            return Err(AuthError::ConfigurationError(format!(
                "unsupported response_type '{}', only 'code' is supported",
                self.response_type
            )));
        }

        Ok(())
    }

    /// Space-separated scope string for the authorize request.
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Multi-tenancy settings shared by every scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiTenancyOptions {
    /// Name of the cookie (and token request parameter) carrying the tenant.
    pub tenant_key: String,
}

impl MultiTenancyOptions {
    pub const DEFAULT_TENANT_KEY: &'static str = "__tenant";
}

impl Default for MultiTenancyOptions {
    fn default() -> Self {
        Self {
            tenant_key: Self::DEFAULT_TENANT_KEY.to_string(),
        }
    }
}

/// Process-wide options handle.
///
/// Each call to [`OptionsMonitor::snapshot`] returns the value current at
/// that moment, so a request observes one consistent copy even if the
/// options are updated while it is in flight.
#[derive(Debug)]
pub struct OptionsMonitor<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> Clone for OptionsMonitor<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync> OptionsMonitor<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value)),
        }
    }

    pub async fn snapshot(&self) -> T {
        self.inner.read().await.clone()
    }

    pub async fn update(&self, value: T) {
        *self.inner.write().await = value;
    }
}

impl<T: Clone + Send + Sync + Default> Default for OptionsMonitor<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
