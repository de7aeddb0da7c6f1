//! Request extractors for the gateway trust boundary.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::context::CORRELATION_ID_HEADER;
use common::identity::{USER_ID_HEADER, USER_ROLES_HEADER};
use common::{Identity, IdentityError, RequestContext};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the shared secret proving a request came through the
/// gateway.
pub const GATEWAY_TOKEN_HEADER: &str = "x-gateway-token";

/// The authenticated caller of a request.
///
/// Built once per request from the gateway headers. A missing or malformed
/// header set rejects the request with 401. The correlation id is taken from
/// `X-Correlation-Id` when it parses, otherwise a fresh one is assigned.
#[derive(Debug, Clone)]
pub struct Caller(pub RequestContext);

impl Caller {
    pub fn ctx(&self) -> &RequestContext {
        &self.0
    }
}

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let ctx = context_from_headers(&parts.headers, state.gateway_token.as_deref())?;
        tracing::debug!(
            user_id = %ctx.identity.user_id(),
            correlation_id = %ctx.correlation_id,
            "caller identified"
        );
        Ok(Caller(ctx))
    }
}

/// Builds a request context from gateway headers.
///
/// When `gateway_token` is set the request must carry the same value in
/// [`GATEWAY_TOKEN_HEADER`].
pub fn context_from_headers(
    headers: &HeaderMap,
    gateway_token: Option<&str>,
) -> Result<RequestContext, IdentityError> {
    if let Some(expected) = gateway_token {
        if header(headers, GATEWAY_TOKEN_HEADER) != Some(expected) {
            return Err(IdentityError::UntrustedSource);
        }
    }

    let identity = Identity::from_headers(
        header(headers, USER_ID_HEADER),
        header(headers, USER_ROLES_HEADER),
    )?;

    let ctx = match header(headers, CORRELATION_ID_HEADER).and_then(|v| Uuid::parse_str(v).ok()) {
        Some(correlation_id) => RequestContext::with_correlation_id(identity, correlation_id),
        None => RequestContext::new(identity),
    };
    Ok(ctx)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use common::Role;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_builds_context_and_keeps_correlation_id() {
        let id = Uuid::new_v4();
        let ctx = context_from_headers(
            &headers(&[
                (USER_ID_HEADER, "u-1"),
                (USER_ROLES_HEADER, "USER"),
                (CORRELATION_ID_HEADER, &id.to_string()),
            ]),
            None,
        )
        .unwrap();

        assert_eq!(ctx.identity.user_id().as_str(), "u-1");
        assert!(ctx.identity.has_role(Role::User));
        assert_eq!(ctx.correlation_id, id);
    }

    #[test]
    fn test_gateway_token_must_match_when_configured() {
        let base = [(USER_ID_HEADER, "u-1"), (USER_ROLES_HEADER, "USER")];

        let missing = context_from_headers(&headers(&base), Some("s3cret"));
        assert_eq!(missing, Err(IdentityError::UntrustedSource));

        let mut with_token = base.to_vec();
        with_token.push((GATEWAY_TOKEN_HEADER, "wrong"));
        let wrong = context_from_headers(&headers(&with_token), Some("s3cret"));
        assert_eq!(wrong, Err(IdentityError::UntrustedSource));

        with_token.pop();
        with_token.push((GATEWAY_TOKEN_HEADER, "s3cret"));
        assert!(context_from_headers(&headers(&with_token), Some("s3cret")).is_ok());
    }

    #[test]
    fn test_malformed_identity_is_rejected() {
        let result = context_from_headers(&headers(&[(USER_ROLES_HEADER, "USER")]), None);
        assert_eq!(result, Err(IdentityError::MissingUserId));
    }
}
