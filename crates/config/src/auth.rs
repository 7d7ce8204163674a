use std::collections::BTreeSet;

use secrecy::SecretString;
use serde::Deserialize;

/// Authentication configuration for the gateway.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// The credential mechanism required on `/api` routes.
    pub mode: AuthMode,
    /// Accepted credentials. Required to be non-empty for any mode other
    /// than `none`.
    pub credentials: Vec<CredentialConfig>,
}

impl AuthConfig {
    /// Whether authentication is enforced at all.
    pub fn enabled(&self) -> bool {
        !matches!(self.mode, AuthMode::None)
    }
}

/// Which credential mechanisms the gateway accepts.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// No authentication; every request is anonymous.
    #[default]
    None,
    /// `Authorization: Bearer <token>` only.
    Token,
    /// `X-API-Key: <key>` only.
    ApiKey,
    /// Either bearer token or API key.
    Multi,
}

/// One accepted credential and the permissions it grants.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialConfig {
    /// The secret value compared against the presented credential.
    pub secret: SecretString,
    /// The subject attached to requests authenticated with this credential.
    pub subject: String,
    /// Granted permissions; `*` grants everything, including admin routes.
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}
