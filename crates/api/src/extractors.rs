//! Request extractors.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};
use chorus_core::Caller;

/// The caller resolved by the auth middleware.
///
/// Requests that bypassed the middleware are anonymous. Whether the caller
/// may proceed is decided by the service operation, not here.
#[derive(Debug, Clone)]
pub struct CallerContext(pub Caller);

impl<S> FromRequestParts<S> for CallerContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<Caller>()
                .cloned()
                .unwrap_or(Caller::Anonymous),
        ))
    }
}
