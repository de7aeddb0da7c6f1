//! Caller identity established at the gateway trust boundary.
//!
//! The gateway authenticates the caller and injects two headers:
//! `X-User-Id` (the user identifier) and `X-User-Roles` (comma separated
//! role names). The services never parse tokens; they build an [`Identity`]
//! exactly once from those headers and reject malformed sets instead of
//! degrading to an anonymous caller.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::UserId;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the caller's comma separated roles.
pub const USER_ROLES_HEADER: &str = "x-user-roles";

/// Roles issued by the authentication service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    SuperAdmin,
    OrderAdmin,
    DeliveryAdmin,
}

impl Role {
    /// Returns the wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::SuperAdmin => "SUPER_ADMIN",
            Role::OrderAdmin => "ORDER_ADMIN",
            Role::DeliveryAdmin => "DELIVERY_ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "USER" => Ok(Role::User),
            "SUPER_ADMIN" => Ok(Role::SuperAdmin),
            "ORDER_ADMIN" => Ok(Role::OrderAdmin),
            "DELIVERY_ADMIN" => Ok(Role::DeliveryAdmin),
            other => Err(IdentityError::UnknownRole(other.to_string())),
        }
    }
}

/// Errors raised while building an identity from gateway headers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// The user id header is absent.
    #[error("missing x-user-id header")]
    MissingUserId,

    /// The user id header is present but blank.
    #[error("blank x-user-id header")]
    BlankUserId,

    /// The roles header is absent or lists no roles.
    #[error("missing x-user-roles header")]
    MissingRoles,

    /// A role name is not recognised.
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// The gateway token is absent or does not match.
    #[error("request did not come through the trusted gateway")]
    UntrustedSource,
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    user_id: UserId,
    roles: BTreeSet<Role>,
}

impl Identity {
    /// Creates an identity directly, for internal callers and tests.
    pub fn new(user_id: impl Into<UserId>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: roles.into_iter().collect(),
        }
    }

    /// Builds an identity from the raw header values.
    pub fn from_headers(
        user_id: Option<&str>,
        roles: Option<&str>,
    ) -> Result<Self, IdentityError> {
        let user_id = user_id.ok_or(IdentityError::MissingUserId)?.trim();
        if user_id.is_empty() {
            return Err(IdentityError::BlankUserId);
        }

        let roles = roles.ok_or(IdentityError::MissingRoles)?;
        let roles = roles
            .split(',')
            .filter(|r| !r.trim().is_empty())
            .map(|r| r.parse::<Role>())
            .collect::<Result<BTreeSet<Role>, _>>()?;
        if roles.is_empty() {
            return Err(IdentityError::MissingRoles);
        }

        Ok(Self {
            user_id: UserId::new(user_id),
            roles,
        })
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.roles.iter().copied()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Renders the roles back into header form.
    pub fn roles_header(&self) -> String {
        self.roles
            .iter()
            .map(Role::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_identity_from_well_formed_headers() {
        let identity = Identity::from_headers(Some("u-1"), Some("USER, ORDER_ADMIN")).unwrap();
        assert_eq!(identity.user_id().as_str(), "u-1");
        assert!(identity.has_role(Role::User));
        assert!(identity.has_role(Role::OrderAdmin));
        assert!(!identity.has_role(Role::SuperAdmin));
        assert_eq!(identity.roles_header(), "USER,ORDER_ADMIN");
    }

    #[test]
    fn rejects_missing_or_blank_user() {
        assert_eq!(
            Identity::from_headers(None, Some("USER")),
            Err(IdentityError::MissingUserId)
        );
        assert_eq!(
            Identity::from_headers(Some("  "), Some("USER")),
            Err(IdentityError::BlankUserId)
        );
    }

    #[test]
    fn rejects_missing_empty_or_unknown_roles() {
        assert_eq!(
            Identity::from_headers(Some("u-1"), None),
            Err(IdentityError::MissingRoles)
        );
        assert_eq!(
            Identity::from_headers(Some("u-1"), Some(" , ")),
            Err(IdentityError::MissingRoles)
        );
        assert_eq!(
            Identity::from_headers(Some("u-1"), Some("USER,ROOT")),
            Err(IdentityError::UnknownRole("ROOT".to_string()))
        );
    }
}
