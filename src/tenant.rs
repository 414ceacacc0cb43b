//! Tenant-aware OpenID Connect registration.
//!
//! The tenant cookie selected in the browser is forwarded to the token
//! endpoint as an extra parameter, so the identity provider issues tokens
//! for the same tenant the user picked before signing in.

use async_trait::async_trait;
use std::sync::Arc;

use crate::builder::AuthenticationBuilder;
use crate::claims::map_tenant_claim_types;
use crate::error::Result;
use crate::events::{AuthorizationCodeReceivedContext, AuthorizationCodeReceivedHandler};
use crate::options::{MultiTenancyOptions, OpenIdConnectDefaults, OpenIdConnectOptions, OptionsMonitor};

/// Copies the tenant cookie onto the outbound token request.
///
/// The tenant key is read from the [`OptionsMonitor<MultiTenancyOptions>`]
/// in the request services on every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantParameterInjector;

#[async_trait]
impl AuthorizationCodeReceivedHandler for TenantParameterInjector {
    async fn on_authorization_code_received(
        &self,
        context: &mut AuthorizationCodeReceivedContext,
    ) -> Result<()> {
        let tenant_key = context
            .required_service::<OptionsMonitor<MultiTenancyOptions>>()?
            .snapshot()
            .await
            .tenant_key;

        if tenant_key.is_empty() {
            return Ok(());
        }

        if let Some(tenant) = context.cookies.get(&tenant_key) {
            tracing::debug!(
                "Forwarding tenant cookie {}={} to token endpoint (scheme {})",
                tenant_key,
                tenant,
                context.scheme
            );
            let tenant = tenant.to_string();
            context.token_endpoint_request.set_parameter(tenant_key, tenant);
        }

        Ok(())
    }
}

/// Register OpenID Connect schemes that forward the tenant cookie.
pub trait TenantOpenIdConnectExt {
    /// Default scheme and display name, options left as defaults.
    fn add_tenant_open_id_connect(&mut self) -> Result<&mut AuthenticationBuilder>;

    fn add_tenant_open_id_connect_with<F>(
        &mut self,
        configure: F,
    ) -> Result<&mut AuthenticationBuilder>
    where
        F: FnOnce(&mut OpenIdConnectOptions);

    fn add_tenant_open_id_connect_scheme<F>(
        &mut self,
        scheme: &str,
        configure: F,
    ) -> Result<&mut AuthenticationBuilder>
    where
        F: FnOnce(&mut OpenIdConnectOptions);

    fn add_tenant_open_id_connect_named<F>(
        &mut self,
        scheme: &str,
        display_name: &str,
        configure: F,
    ) -> Result<&mut AuthenticationBuilder>
    where
        F: FnOnce(&mut OpenIdConnectOptions);
}

impl TenantOpenIdConnectExt for AuthenticationBuilder {
    fn add_tenant_open_id_connect(&mut self) -> Result<&mut AuthenticationBuilder> {
        self.add_tenant_open_id_connect_with(|_| {})
    }

    fn add_tenant_open_id_connect_with<F>(
        &mut self,
        configure: F,
    ) -> Result<&mut AuthenticationBuilder>
    where
        F: FnOnce(&mut OpenIdConnectOptions),
    {
        self.add_tenant_open_id_connect_scheme(OpenIdConnectDefaults::AUTHENTICATION_SCHEME, configure)
    }

    fn add_tenant_open_id_connect_scheme<F>(
        &mut self,
        scheme: &str,
        configure: F,
    ) -> Result<&mut AuthenticationBuilder>
    where
        F: FnOnce(&mut OpenIdConnectOptions),
    {
        self.add_tenant_open_id_connect_named(scheme, OpenIdConnectDefaults::DISPLAY_NAME, configure)
    }

    fn add_tenant_open_id_connect_named<F>(
        &mut self,
        scheme: &str,
        display_name: &str,
        configure: F,
    ) -> Result<&mut AuthenticationBuilder>
    where
        F: FnOnce(&mut OpenIdConnectOptions),
    {
        self.add_open_id_connect(scheme, display_name, |options| {
            map_tenant_claim_types(&mut options.claim_actions);

            configure(options);

            // Runs ahead of any handler installed by `configure`, which still runs after.
            options
                .events
                .prepend_authorization_code_received(Arc::new(TenantParameterInjector));
        })
    }
}
