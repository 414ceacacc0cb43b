use async_trait::async_trait;
use axum::http::Extensions;
use std::sync::Arc;

use crate::cookies::RequestCookies;
use crate::error::{AuthError, Result};
use crate::handler::TokenResponse;
use crate::message::OpenIdConnectMessage;

/// State handed to handlers after the identity provider returned an
/// authorization code and before it is redeemed at the token endpoint.
#[derive(Debug)]
pub struct AuthorizationCodeReceivedContext {
    pub scheme: String,
    pub cookies: RequestCookies,
    pub code: String,
    /// Outbound token request. Handlers may add or replace parameters.
    pub token_endpoint_request: OpenIdConnectMessage,
    /// Request-scoped services (request extensions of the callback request).
    pub services: Extensions,
    token_response: Option<TokenResponse>,
}

impl AuthorizationCodeReceivedContext {
    pub fn new(
        scheme: impl Into<String>,
        cookies: RequestCookies,
        code: impl Into<String>,
        token_endpoint_request: OpenIdConnectMessage,
        services: Extensions,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            cookies,
            code: code.into(),
            token_endpoint_request,
            services,
            token_response: None,
        }
    }

    pub fn service<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.services.get::<T>()
    }

    pub fn required_service<T: Send + Sync + 'static>(&self) -> Result<&T> {
        self.services
            .get::<T>()
            .ok_or(AuthError::MissingService(std::any::type_name::<T>()))
    }

    /// Supply the token response directly, skipping the default code redemption.
    pub fn handle_code_redemption(&mut self, token_response: TokenResponse) {
        self.token_response = Some(token_response);
    }

    pub fn handled_code_redemption(&self) -> bool {
        self.token_response.is_some()
    }

    pub(crate) fn take_token_response(&mut self) -> Option<TokenResponse> {
        self.token_response.take()
    }
}

#[async_trait]
pub trait AuthorizationCodeReceivedHandler: Send + Sync {
    async fn on_authorization_code_received(
        &self,
        context: &mut AuthorizationCodeReceivedContext,
    ) -> Result<()>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> AuthorizationCodeReceivedHandler for FnHandler<F>
where
    F: Fn(&mut AuthorizationCodeReceivedContext) -> Result<()> + Send + Sync,
{
    async fn on_authorization_code_received(
        &self,
        context: &mut AuthorizationCodeReceivedContext,
    ) -> Result<()> {
        (self.0)(context)
    }
}

/// Wrap a synchronous closure as an event handler.
pub fn handler_fn<F>(f: F) -> Arc<dyn AuthorizationCodeReceivedHandler>
where
    F: Fn(&mut AuthorizationCodeReceivedContext) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Runs `first`, then `next`. An error from `first` stops the chain.
pub struct ChainedHandler {
    first: Arc<dyn AuthorizationCodeReceivedHandler>,
    next: Arc<dyn AuthorizationCodeReceivedHandler>,
}

impl ChainedHandler {
    pub fn new(
        first: Arc<dyn AuthorizationCodeReceivedHandler>,
        next: Arc<dyn AuthorizationCodeReceivedHandler>,
    ) -> Self {
        Self { first, next }
    }
}

#[async_trait]
impl AuthorizationCodeReceivedHandler for ChainedHandler {
    async fn on_authorization_code_received(
        &self,
        context: &mut AuthorizationCodeReceivedContext,
    ) -> Result<()> {
        self.first.on_authorization_code_received(context).await?;
        self.next.on_authorization_code_received(context).await
    }
}

/// Callbacks invoked by the OpenID Connect handler.
#[derive(Clone, Default)]
pub struct OpenIdConnectEvents {
    pub on_authorization_code_received: Option<Arc<dyn AuthorizationCodeReceivedHandler>>,
}

impl std::fmt::Debug for OpenIdConnectEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenIdConnectEvents")
            .field(
                "on_authorization_code_received",
                &self.on_authorization_code_received.is_some(),
            )
            .finish()
    }
}

impl OpenIdConnectEvents {
    /// Install `handler` ahead of whatever handler is already registered.
    /// The existing handler keeps running after it.
    pub fn prepend_authorization_code_received(
        &mut self,
        handler: Arc<dyn AuthorizationCodeReceivedHandler>,
    ) {
        let installed = match self.on_authorization_code_received.take() {
            Some(prior) => {
                Arc::new(ChainedHandler::new(handler, prior)) as Arc<dyn AuthorizationCodeReceivedHandler>
            }
            None => handler,
        };
        self.on_authorization_code_received = Some(installed);
    }

    pub async fn authorization_code_received(
        &self,
        context: &mut AuthorizationCodeReceivedContext,
    ) -> Result<()> {
        match &self.on_authorization_code_received {
            Some(handler) => handler.on_authorization_code_received(context).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn context() -> AuthorizationCodeReceivedContext {
        AuthorizationCodeReceivedContext::new(
            "OpenIdConnect",
            RequestCookies::default(),
            "code-123",
            OpenIdConnectMessage::new(),
            Extensions::new(),
        )
    }

    fn recording(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Arc<dyn AuthorizationCodeReceivedHandler> {
        let log = Arc::clone(log);
        handler_fn(move |_| {
            log.lock().unwrap().push(name);
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_no_handler_is_noop() {
        let events = OpenIdConnectEvents::default();
        let mut ctx = context();
        events.authorization_code_received(&mut ctx).await.unwrap();
        assert!(ctx.token_endpoint_request.is_empty());
    }

    #[tokio::test]
    async fn test_prepend_runs_new_handler_before_prior() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut events = OpenIdConnectEvents::default();
        events.prepend_authorization_code_received(recording(&log, "prior"));
        events.prepend_authorization_code_received(recording(&log, "new"));

        let mut ctx = context();
        events.authorization_code_received(&mut ctx).await.unwrap();
        events.authorization_code_received(&mut ctx).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["new", "prior", "new", "prior"]);
    }

    #[tokio::test]
    async fn test_chain_stops_on_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let failing = handler_fn(|_| Err(AuthError::BadRequest("nope".to_string())));
        let chain = ChainedHandler::new(failing, recording(&log, "next"));

        let mut ctx = context();
        let result = chain.on_authorization_code_received(&mut ctx).await;

        assert!(matches!(result, Err(AuthError::BadRequest(_))));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_required_service_reports_type() {
        let ctx = context();
        match ctx.required_service::<u32>() {
            Err(AuthError::MissingService(name)) => assert_eq!(name, "u32"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
