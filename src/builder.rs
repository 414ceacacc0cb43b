use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AuthError, Result};
use crate::handler::OpenIdConnectHandler;
use crate::options::OpenIdConnectOptions;

struct SchemeRegistration {
    name: String,
    display_name: String,
    options: OpenIdConnectOptions,
}

/// Collects authentication scheme registrations at startup.
pub struct AuthenticationBuilder {
    registrations: Vec<SchemeRegistration>,
    default_scheme: Option<String>,
    http_client: reqwest::Client,
}

impl Default for AuthenticationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthenticationBuilder {
    pub fn new() -> Self {
        Self::with_http_client(reqwest::Client::new())
    }

    pub fn with_http_client(http_client: reqwest::Client) -> Self {
        Self {
            registrations: Vec::new(),
            default_scheme: None,
            http_client,
        }
    }

    /// Scheme used when a request does not name one. Defaults to the first registered.
    pub fn default_scheme(&mut self, name: impl Into<String>) -> &mut Self {
        self.default_scheme = Some(name.into());
        self
    }

    /// Register an OpenID Connect scheme. `configure` runs once, immediately.
    pub fn add_open_id_connect<F>(
        &mut self,
        scheme: &str,
        display_name: &str,
        configure: F,
    ) -> Result<&mut Self>
    where
        F: FnOnce(&mut OpenIdConnectOptions),
    {
        if self.registrations.iter().any(|r| r.name == scheme) {
            return Err(AuthError::DuplicateScheme(scheme.to_string()));
        }

        let mut options = OpenIdConnectOptions::default();
        configure(&mut options);

        tracing::debug!("Registered OpenID Connect scheme {} ({})", scheme, display_name);
        self.registrations.push(SchemeRegistration {
            name: scheme.to_string(),
            display_name: display_name.to_string(),
            options,
        });
        Ok(self)
    }

    pub fn scheme_names(&self) -> impl Iterator<Item = &str> {
        self.registrations.iter().map(|r| r.name.as_str())
    }

    /// Options as registered, before validation.
    pub fn scheme_options(&self, scheme: &str) -> Option<&OpenIdConnectOptions> {
        self.registrations
            .iter()
            .find(|r| r.name == scheme)
            .map(|r| &r.options)
    }

    pub fn display_name(&self, scheme: &str) -> Option<&str> {
        self.registrations
            .iter()
            .find(|r| r.name == scheme)
            .map(|r| r.display_name.as_str())
    }

    /// Validate every registration and create the scheme handlers.
    pub fn build(self) -> Result<AuthenticationSchemes> {
        if self.registrations.is_empty() {
            return Err(AuthError::ConfigurationError(
                "no authentication schemes registered".to_string(),
            ));
        }

        let default_scheme = match self.default_scheme {
            Some(name) => {
                if !self.registrations.iter().any(|r| r.name == name) {
                    return Err(AuthError::UnknownScheme(name));
                }
                name
            }
            None => self.registrations[0].name.clone(),
        };

        let mut order = Vec::with_capacity(self.registrations.len());
        let mut handlers = HashMap::with_capacity(self.registrations.len());
        for registration in self.registrations {
            registration.options.validate().map_err(|e| match e {
                AuthError::ConfigurationError(msg) => {
                    AuthError::ConfigurationError(format!("scheme {}: {}", registration.name, msg))
                }
                other => other,
            })?;
            order.push(registration.name.clone());
            handlers.insert(
                registration.name.clone(),
                Arc::new(OpenIdConnectHandler::new(
                    registration.name,
                    registration.display_name,
                    registration.options,
                    self.http_client.clone(),
                )),
            );
        }

        Ok(AuthenticationSchemes {
            order,
            handlers,
            default_scheme,
        })
    }
}

/// Built scheme handlers, looked up by name.
pub struct AuthenticationSchemes {
    order: Vec<String>,
    handlers: HashMap<String, Arc<OpenIdConnectHandler>>,
    default_scheme: String,
}

impl AuthenticationSchemes {
    pub fn get(&self, scheme: &str) -> Option<Arc<OpenIdConnectHandler>> {
        self.handlers.get(scheme).cloned()
    }

    pub fn default_handler(&self) -> Arc<OpenIdConnectHandler> {
        Arc::clone(&self.handlers[&self.default_scheme])
    }

    /// Named scheme, or the default when `scheme` is `None`.
    pub fn resolve(&self, scheme: Option<&str>) -> Result<Arc<OpenIdConnectHandler>> {
        match scheme {
            Some(name) => self
                .get(name)
                .ok_or_else(|| AuthError::UnknownScheme(name.to_string())),
            None => Ok(self.default_handler()),
        }
    }

    pub fn default_scheme(&self) -> &str {
        &self.default_scheme
    }

    /// Handlers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = Arc<OpenIdConnectHandler>> + '_ {
        self.order.iter().map(|name| Arc::clone(&self.handlers[name]))
    }
}
