//! Multi-tenant OpenID Connect authentication.
//!
//! Register a scheme with [`TenantOpenIdConnectExt`] and the tenant cookie
//! chosen in the browser is forwarded to the identity provider's token
//! endpoint when the authorization code is redeemed.
//!
//! ```no_run
//! use tenant_oidc::{AuthenticationBuilder, TenantOpenIdConnectExt};
//!
//! # fn main() -> tenant_oidc::Result<()> {
//! let mut builder = AuthenticationBuilder::new();
//! builder.add_tenant_open_id_connect_with(|options| {
//!     options.authority = "https://login.example.com".to_string();
//!     options.client_id = "web".to_string();
//!     options.callback_url = "https://app.example.com/auth/callback".to_string();
//! })?;
//! let schemes = builder.build()?;
//! # let _ = schemes;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod builder;
pub mod claims;
pub mod config;
pub mod cookies;
pub mod error;
pub mod events;
pub mod gateway;
pub mod handler;
pub mod message;
pub mod options;
pub mod session;
pub mod tenant;

pub use builder::{AuthenticationBuilder, AuthenticationSchemes};
pub use error::{AuthError, Result};
pub use events::{
    handler_fn, AuthorizationCodeReceivedContext, AuthorizationCodeReceivedHandler,
    OpenIdConnectEvents,
};
pub use handler::{AuthenticationTicket, OpenIdConnectHandler, TokenResponse};
pub use message::OpenIdConnectMessage;
pub use options::{MultiTenancyOptions, OpenIdConnectDefaults, OpenIdConnectOptions, OptionsMonitor};
pub use tenant::{TenantOpenIdConnectExt, TenantParameterInjector};
