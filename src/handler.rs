use axum::http::{Extensions, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::claims::Claim;
use crate::cookies::RequestCookies;
use crate::error::{AuthError, Result};
use crate::events::AuthorizationCodeReceivedContext;
use crate::message::OpenIdConnectMessage;
use crate::options::OpenIdConnectOptions;

/// Endpoints of the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    #[serde(default)]
    pub issuer: Option<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Query params for the redirect back from the identity provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Redirect to the identity provider's authorize endpoint.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub url: String,
    pub state: String,
    /// Set-Cookie value that must come back with the callback carrying `state`.
    pub correlation_cookie: String,
}

/// Prefix of the per-scheme correlation cookie name.
pub const CORRELATION_COOKIE_PREFIX: &str = "oidc_correlation.";

/// Lifetime of the correlation cookie, in seconds.
const CORRELATION_MAX_AGE: u64 = 900;

/// Outcome of a successful callback.
#[derive(Debug, Clone)]
pub struct AuthenticationTicket {
    pub scheme: String,
    pub claims: Vec<Claim>,
    pub tokens: TokenResponse,
    /// Local path to return the user to.
    pub redirect_url: String,
}

/// Runs the authorization-code flow for one registered scheme.
pub struct OpenIdConnectHandler {
    scheme: String,
    display_name: String,
    options: OpenIdConnectOptions,
    http_client: reqwest::Client,
    metadata: OnceCell<ProviderMetadata>,
}

impl OpenIdConnectHandler {
    pub fn new(
        scheme: impl Into<String>,
        display_name: impl Into<String>,
        options: OpenIdConnectOptions,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            display_name: display_name.into(),
            options,
            http_client,
            metadata: OnceCell::new(),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn options(&self) -> &OpenIdConnectOptions {
        &self.options
    }

    pub fn correlation_cookie_name(&self) -> String {
        format!("{}{}", CORRELATION_COOKIE_PREFIX, self.scheme)
    }

    /// Set-Cookie value that removes the correlation cookie once the callback is done.
    pub fn clear_correlation_cookie(&self) -> String {
        self.correlation_cookie(&format!("{}=", self.correlation_cookie_name()), 0)
    }

    fn correlation_cookie(&self, pair: &str, max_age: u64) -> String {
        let mut cookie = format!("{}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}", pair, max_age);
        if self.options.callback_url.starts_with("https://") {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Provider endpoints, discovered once and cached.
    pub async fn metadata(&self) -> Result<&ProviderMetadata> {
        self.metadata.get_or_try_init(|| self.discover()).await
    }

    async fn discover(&self) -> Result<ProviderMetadata> {
        if let (Some(authorization_endpoint), Some(token_endpoint)) = (
            &self.options.authorization_endpoint,
            &self.options.token_endpoint,
        ) {
            return Ok(ProviderMetadata {
                issuer: None,
                authorization_endpoint: authorization_endpoint.clone(),
                token_endpoint: token_endpoint.clone(),
                end_session_endpoint: self.options.end_session_endpoint.clone(),
            });
        }

        let url = format!(
            "{}/.well-known/openid-configuration",
            self.options.authority.trim_end_matches('/')
        );
        tracing::info!("Fetching OpenID configuration from {}", url);

        let resp = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| AuthError::Discovery(format!("request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(AuthError::Discovery(format!(
                "{} returned {}",
                url,
                resp.status()
            )));
        }

        let mut metadata: ProviderMetadata = resp
            .json()
            .await
            .map_err(|e| AuthError::Discovery(format!("parse error: {}", e)))?;

        if let Some(endpoint) = &self.options.authorization_endpoint {
            metadata.authorization_endpoint = endpoint.clone();
        }
        if let Some(endpoint) = &self.options.token_endpoint {
            metadata.token_endpoint = endpoint.clone();
        }
        if self.options.end_session_endpoint.is_some() {
            metadata.end_session_endpoint = self.options.end_session_endpoint.clone();
        }

        Ok(metadata)
    }

    /// Build the authorize redirect. `redirect_after` is where the user lands after login.
    pub async fn challenge(&self, redirect_after: &str) -> Result<Challenge> {
        let metadata = self.metadata().await?;
        let correlation = random_token(16);
        let state = encode_state(&correlation, redirect_after);
        let nonce = random_token(16);

        let url = format!(
            "{}{}response_type={}&client_id={}&redirect_uri={}&scope={}&state={}&nonce={}",
            metadata.authorization_endpoint,
            query_separator(&metadata.authorization_endpoint),
            urlencoding::encode(&self.options.response_type),
            urlencoding::encode(&self.options.client_id),
            urlencoding::encode(&self.options.callback_url),
            urlencoding::encode(&self.options.scope()),
            urlencoding::encode(&state),
            urlencoding::encode(&nonce),
        );

        tracing::debug!("Challenge for scheme {} redirects to {}", self.scheme, metadata.authorization_endpoint);
        let correlation_cookie = self.correlation_cookie(
            &format!("{}={}", self.correlation_cookie_name(), correlation),
            CORRELATION_MAX_AGE,
        );
        Ok(Challenge {
            url,
            state,
            correlation_cookie,
        })
    }

    /// Handle the redirect back from the identity provider.
    ///
    /// The `state` must match the correlation cookie set by [`Self::challenge`].
    /// Raises the authorization-code-received event before redeeming the
    /// code, so handlers can amend the token request or redeem it themselves.
    pub async fn handle_callback(
        &self,
        query: &CallbackQuery,
        headers: &HeaderMap,
        services: Extensions,
    ) -> Result<AuthenticationTicket> {
        if let Some(error) = &query.error {
            let description = query
                .error_description
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string());
            tracing::error!("OAuth callback error: {}: {}", error, description);
            return Err(AuthError::RemoteFailure {
                error: error.clone(),
                description,
            });
        }

        let code = query
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::BadRequest("Missing authorization code".to_string()))?;

        let cookies = RequestCookies::from_headers(headers);
        let redirect_url = self.check_correlation(query.state.as_deref(), &cookies)?;

        let mut token_request = OpenIdConnectMessage::new();
        token_request.set_parameter("grant_type", "authorization_code");
        token_request.set_parameter("code", code);
        token_request.set_parameter("redirect_uri", &self.options.callback_url);
        token_request.set_parameter("client_id", &self.options.client_id);
        if !self.options.client_secret.is_empty() {
            token_request.set_parameter("client_secret", &self.options.client_secret);
        }

        let mut context = AuthorizationCodeReceivedContext::new(
            &self.scheme,
            cookies,
            code,
            token_request,
            services,
        );

        self.options
            .events
            .authorization_code_received(&mut context)
            .await?;

        let tokens = match context.take_token_response() {
            Some(tokens) => {
                tracing::debug!("Code redemption handled by event for scheme {}", self.scheme);
                tokens
            }
            None => {
                let metadata = self.metadata().await?;
                self.redeem(&metadata.token_endpoint, &context.token_endpoint_request)
                    .await?
            }
        };

        let claims = self.claims_from_tokens(&tokens)?;
        tracing::info!("Authenticated via scheme {} ({} claims)", self.scheme, claims.len());

        Ok(AuthenticationTicket {
            scheme: self.scheme.clone(),
            claims,
            tokens,
            redirect_url,
        })
    }

    /// Match the state's correlation id against the cookie and return the post-login redirect.
    fn check_correlation(&self, state: Option<&str>, cookies: &RequestCookies) -> Result<String> {
        let (correlation, redirect_url) = state
            .and_then(decode_state)
            .ok_or_else(|| AuthError::BadRequest("Missing or invalid state".to_string()))?;

        match cookies.get(&self.correlation_cookie_name()) {
            Some(expected) if expected == correlation => Ok(redirect_url),
            Some(_) => {
                tracing::warn!("Correlation mismatch for scheme {}", self.scheme);
                Err(AuthError::BadRequest("Correlation failed".to_string()))
            }
            None => {
                tracing::warn!("Correlation cookie not found for scheme {}", self.scheme);
                Err(AuthError::BadRequest("Correlation failed".to_string()))
            }
        }
    }

    /// POST every token-request parameter as a form to the token endpoint.
    async fn redeem(
        &self,
        token_endpoint: &str,
        request: &OpenIdConnectMessage,
    ) -> Result<TokenResponse> {
        let params: Vec<(&str, &str)> = request.parameters().collect();

        let resp = self
            .http_client
            .post(token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchange(format!("request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchange(format!("({}): {}", status, body)));
        }

        resp.json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::TokenExchange(format!("parse error: {}", e)))
    }

    /// Map the ID-token payload through the scheme's claim actions.
    /// The token signature is not verified here.
    pub fn claims_from_tokens(&self, tokens: &TokenResponse) -> Result<Vec<Claim>> {
        let id_token = tokens.id_token.as_deref().ok_or_else(|| {
            AuthError::InvalidToken("token response did not include an id_token".to_string())
        })?;
        let payload = decode_jwt_payload(id_token)?;
        Ok(self.options.claim_actions.apply(&payload))
    }

    /// Provider logout URL, if the provider advertises one.
    pub async fn end_session_url(
        &self,
        id_token_hint: Option<&str>,
        post_logout_redirect: &str,
    ) -> Result<Option<String>> {
        let metadata = self.metadata().await?;
        let Some(endpoint) = &metadata.end_session_endpoint else {
            return Ok(None);
        };

        let mut url = format!(
            "{}{}client_id={}&post_logout_redirect_uri={}",
            endpoint,
            query_separator(endpoint),
            urlencoding::encode(&self.options.client_id),
            urlencoding::encode(post_logout_redirect),
        );
        if let Some(hint) = id_token_hint {
            url.push_str(&format!("&id_token_hint={}", urlencoding::encode(hint)));
        }
        Ok(Some(url))
    }
}

/// Decode a JWT payload without validation.
fn decode_jwt_payload(token: &str) -> Result<Value> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::InvalidToken("malformed JWT".to_string()));
    }
    let payload = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| AuthError::InvalidToken(format!("payload is not base64url: {}", e)))?;
    Ok(serde_json::from_slice(&payload)?)
}

fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(&bytes)
}

fn query_separator(endpoint: &str) -> char {
    if endpoint.contains('?') {
        '&'
    } else {
        '?'
    }
}

/// Encode the correlation id and redirect URL into a state parameter.
fn encode_state(correlation: &str, redirect_url: &str) -> String {
    // Format: correlation:base64(redirect_url)
    let redirect_b64 = URL_SAFE_NO_PAD.encode(redirect_url.as_bytes());
    format!("{}:{}", correlation, redirect_b64)
}

/// Split a state parameter into its correlation id and redirect URL.
/// A redirect that is not a local path becomes `/`.
fn decode_state(state: &str) -> Option<(String, String)> {
    let (correlation, redirect_b64) = state.split_once(':')?;
    if correlation.is_empty() {
        return None;
    }

    let redirect_url = URL_SAFE_NO_PAD
        .decode(redirect_b64)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .filter(|url| is_local_path(url))
        .unwrap_or_else(|| "/".to_string());
    Some((correlation.to_string(), redirect_url))
}

/// A same-origin path. Rejects protocol-relative forms, including `/\` which browsers treat like `//`.
pub(crate) fn is_local_path(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.starts_with("/\\")
}
