//! Token validation and per-catalog authorization (spec.md §4.10, §7).

use crate::context::RequestContext;
use crate::error::{AirportError, Result};
use async_trait::async_trait;

/// Injected bearer-token validator (spec.md §1 "authentication token
/// validation (an injected validator)" — out of scope to implement, but
/// the trait boundary is part of this crate).
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Validate a bearer token extracted from the `authorization` header.
    /// `None` means the header was absent.
    async fn authenticate(&self, token: Option<&str>) -> Result<()>;

    /// Optional: catalog-scoped authorization, called after a successful
    /// `authenticate` with the resolved catalog name (spec.md §4.10).
    async fn authorize_catalog(&self, _catalog: &str) -> Result<()> {
        Ok(())
    }
}

/// An `Authenticator` that accepts every request; used when no auth
/// dependency is injected, and in tests.
pub struct NoopAuthenticator;

#[async_trait]
impl Authenticator for NoopAuthenticator {
    async fn authenticate(&self, _token: Option<&str>) -> Result<()> {
        Ok(())
    }
}

/// Run the auth pipeline of spec.md §4.10: token validation, then
/// (if the authenticator cares) per-catalog authorization.
pub async fn authenticate_and_authorize(
    authenticator: &dyn Authenticator,
    ctx: &RequestContext,
) -> Result<()> {
    authenticator.authenticate(ctx.bearer_token()).await?;
    authenticator.authorize_catalog(&ctx.catalog).await
}
