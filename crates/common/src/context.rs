//! Request-scoped context passed explicitly through every service call.

use uuid::Uuid;

use crate::{Identity, Role};

/// Header used to propagate the correlation id across services.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// The caller and correlation id of one logical request.
///
/// Built at the HTTP boundary, handed to service operations by reference,
/// forwarded on outbound RPC calls and stamped into emitted events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub identity: Identity,
    pub correlation_id: Uuid,
}

impl RequestContext {
    /// Creates a context with a fresh correlation id.
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Creates a context continuing an existing correlation id.
    pub fn with_correlation_id(identity: Identity, correlation_id: Uuid) -> Self {
        Self {
            identity,
            correlation_id,
        }
    }

    /// Context used by background work (consumers, dispatchers) that acts on
    /// behalf of the service itself.
    pub fn system(service: &str) -> Self {
        Self::new(Identity::new(format!("system:{service}"), [Role::SuperAdmin]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_contexts_get_distinct_correlation_ids() {
        let identity = Identity::new("u-1", [Role::User]);
        let a = RequestContext::new(identity.clone());
        let b = RequestContext::new(identity);
        assert_ne!(a.correlation_id, b.correlation_id);
    }

    #[test]
    fn system_context_is_privileged() {
        let ctx = RequestContext::system("order-service");
        assert_eq!(ctx.identity.user_id().as_str(), "system:order-service");
        assert!(ctx.identity.has_role(Role::SuperAdmin));
    }
}
