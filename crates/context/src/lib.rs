//! Shared request context types passed between the gateway layers and handlers.

#![deny(missing_docs)]

mod principal;

pub use principal::{AuthMethod, AuthPrincipal};
