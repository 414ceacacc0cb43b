use serde::Deserialize;
use std::path::Path;

use crate::error::Result;
use crate::options::{MultiTenancyOptions, OpenIdConnectDefaults, OpenIdConnectOptions};

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub oidc: OidcConfig,
    #[serde(default)]
    pub multi_tenancy: MultiTenancyConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OidcConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_display_name")]
    pub display_name: String,
    #[serde(default)]
    pub authority: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub callback_url: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub end_session_endpoint: Option<String>,
}

impl OidcConfig {
    /// Copy the file settings onto scheme options.
    pub fn apply(&self, options: &mut OpenIdConnectOptions) {
        options.authority = self.authority.clone();
        options.client_id = self.client_id.clone();
        options.client_secret = self.client_secret.clone();
        options.callback_url = self.callback_url.clone();
        options.scopes = self.scopes.clone();
        options.authorization_endpoint = self.authorization_endpoint.clone();
        options.token_endpoint = self.token_endpoint.clone();
        options.end_session_endpoint = self.end_session_endpoint.clone();
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultiTenancyConfig {
    #[serde(default = "default_tenant_key")]
    pub tenant_key: String,
}

impl Default for MultiTenancyConfig {
    fn default() -> Self {
        Self {
            tenant_key: default_tenant_key(),
        }
    }
}

impl From<&MultiTenancyConfig> for MultiTenancyOptions {
    fn from(config: &MultiTenancyConfig) -> Self {
        Self {
            tenant_key: config.tenant_key.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default)]
    pub cookie_domain: String,
    #[serde(default = "default_max_age")]
    pub max_age_seconds: u64,
    #[serde(default)]
    pub secure: bool,
}

fn default_listen() -> String {
    "0.0.0.0:4000".to_string()
}

fn default_scheme() -> String {
    OpenIdConnectDefaults::AUTHENTICATION_SCHEME.to_string()
}

fn default_display_name() -> String {
    OpenIdConnectDefaults::DISPLAY_NAME.to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["openid".to_string(), "profile".to_string(), "email".to_string()]
}

fn default_tenant_key() -> String {
    MultiTenancyOptions::DEFAULT_TENANT_KEY.to_string()
}

fn default_cookie_name() -> String {
    "tenant_oidc_session".to_string()
}

fn default_max_age() -> u64 {
    86400
}

impl GatewayConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = GatewayConfig::from_yaml(
            r#"
oidc:
  authority: https://idp.example.com
  client_id: web
  callback_url: https://app.example.com/auth/callback
session:
  secret: 0123456789abcdef0123456789abcdef
"#,
        )
        .unwrap();

        assert_eq!(config.server.listen, "0.0.0.0:4000");
        assert_eq!(config.oidc.scheme, "OpenIdConnect");
        assert_eq!(config.oidc.display_name, "OpenIdConnect");
        assert_eq!(config.oidc.scopes, vec!["openid", "profile", "email"]);
        assert_eq!(config.multi_tenancy.tenant_key, "__tenant");
        assert_eq!(config.session.cookie_name, "tenant_oidc_session");
        assert!(!config.session.secure);
    }

    #[test]
    fn test_apply_oidc_settings() {
        let config = GatewayConfig::from_yaml(
            r#"
server:
  listen: 127.0.0.1:8080
oidc:
  scheme: corp
  client_id: web
  client_secret: s3cret
  callback_url: https://app.example.com/auth/callback
  authorization_endpoint: https://idp.example.com/authorize
  token_endpoint: https://idp.example.com/token
multi_tenancy:
  tenant_key: org
session:
  secret: 0123456789abcdef0123456789abcdef
  secure: true
"#,
        )
        .unwrap();

        let mut options = OpenIdConnectOptions::default();
        config.oidc.apply(&mut options);

        assert!(options.validate().is_ok());
        assert_eq!(options.client_secret, "s3cret");
        assert_eq!(MultiTenancyOptions::from(&config.multi_tenancy).tenant_key, "org");
    }

    #[test]
    fn test_missing_section_is_error() {
        assert!(GatewayConfig::from_yaml("server:\n  listen: x\n").is_err());
    }
}
