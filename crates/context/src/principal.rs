use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// How a principal proved its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// No credential was required or presented.
    Anonymous,
    /// A bearer token from the `Authorization` header.
    Token,
    /// An API key from the `X-API-Key` header.
    ApiKey,
}

/// The authenticated identity attached to a request or connection.
///
/// Inserted into request extensions by the auth layer; WebSocket connections
/// inherit the principal resolved during the upgrade request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthPrincipal {
    /// Stable identifier of the credential owner.
    pub subject: String,
    /// The mechanism that authenticated this principal.
    pub method: AuthMethod,
    /// Granted permissions. The wildcard `*` grants everything.
    pub permissions: BTreeSet<String>,
}

impl AuthPrincipal {
    /// The principal used when authentication is disabled.
    pub fn anonymous() -> Self {
        Self {
            subject: "anonymous".to_string(),
            method: AuthMethod::Anonymous,
            permissions: BTreeSet::new(),
        }
    }

    /// Whether this principal holds the given permission, directly or via the
    /// `*` wildcard.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains("*") || self.permissions.contains(permission)
    }
}

impl Default for AuthPrincipal {
    fn default() -> Self {
        Self::anonymous()
    }
}
