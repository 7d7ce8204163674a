//! Credential resolution and enforcement.
//!
//! [`AuthLayer`] runs on every request: it resolves the presented
//! credential into an [`AuthPrincipal`] request extension, or rejects
//! outright when an invalid credential is offered. [`RequireAuthLayer`]
//! sits on `/api` routes and turns an anonymous principal into a 401 when
//! an auth mode is configured.

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::response::IntoResponse;
use config::{AuthConfig, AuthMode, CredentialConfig};
use context::{AuthMethod, AuthPrincipal};
use http::{Request, Response};
use secrecy::ExposeSecret;
use tower::Layer;

use crate::error::ApiError;

#[derive(Clone)]
pub struct AuthLayer {
    config: Arc<AuthConfig>,
}

impl AuthLayer {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<Service> Layer<Service> for AuthLayer
where
    Service: Send + Clone,
{
    type Service = AuthService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        AuthService {
            next,
            config: self.config.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthService<Service> {
    next: Service,
    config: Arc<AuthConfig>,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for AuthService<Service>
where
    Service: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    Service::Future: Send,
    Service::Error: Display + 'static,
    ReqBody: http_body::Body + Send + 'static,
{
    type Response = Response<Body>;
    type Error = Service::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let mut next = self.next.clone();
        let config = self.config.clone();

        Box::pin(async move {
            match resolve_principal(&config, &req) {
                Ok(principal) => {
                    req.extensions_mut().insert(principal);
                    next.call(req).await
                }
                Err(error) => Ok(error.into_response()),
            }
        })
    }
}

/// Resolves the request's principal. A missing credential is anonymous; a
/// presented-but-wrong credential is an authentication error regardless of
/// route.
fn resolve_principal<B>(config: &AuthConfig, req: &Request<B>) -> Result<AuthPrincipal, ApiError> {
    if !config.enabled() {
        return Ok(AuthPrincipal::anonymous());
    }

    let bearer = req
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    let api_key = req
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::trim);

    let presented = match config.mode {
        AuthMode::None => None,
        AuthMode::Token => bearer.map(|value| (value, AuthMethod::Token)),
        AuthMode::ApiKey => api_key.map(|value| (value, AuthMethod::ApiKey)),
        AuthMode::Multi => bearer
            .map(|value| (value, AuthMethod::Token))
            .or_else(|| api_key.map(|value| (value, AuthMethod::ApiKey))),
    };

    let Some((value, method)) = presented else {
        return Ok(AuthPrincipal::anonymous());
    };

    match lookup_credential(config, value) {
        Some(credential) => Ok(AuthPrincipal {
            subject: credential.subject.clone(),
            method,
            permissions: credential.permissions.clone(),
        }),
        None => {
            log::debug!("Rejected request with unknown credential");
            Err(ApiError::unauthenticated())
        }
    }
}

fn lookup_credential<'a>(config: &'a AuthConfig, presented: &str) -> Option<&'a CredentialConfig> {
    config
        .credentials
        .iter()
        .find(|credential| credential.secret.expose_secret() == presented)
}

/// Rejects anonymous requests when an auth mode is configured. Applied to
/// `/api` routes only; the landing page, static assets, and the WebSocket
/// handshake stay open.
#[derive(Clone)]
pub struct RequireAuthLayer {
    enabled: bool,
}

impl RequireAuthLayer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            enabled: config.enabled(),
        }
    }
}

impl<Service> Layer<Service> for RequireAuthLayer
where
    Service: Send + Clone,
{
    type Service = RequireAuthService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        RequireAuthService {
            next,
            enabled: self.enabled,
        }
    }
}

#[derive(Clone)]
pub struct RequireAuthService<Service> {
    next: Service,
    enabled: bool,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for RequireAuthService<Service>
where
    Service: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    Service::Future: Send,
    Service::Error: Display + 'static,
    ReqBody: http_body::Body + Send + 'static,
{
    type Response = Response<Body>;
    type Error = Service::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let mut next = self.next.clone();
        let enabled = self.enabled;

        Box::pin(async move {
            if enabled {
                let anonymous = req
                    .extensions()
                    .get::<AuthPrincipal>()
                    .map(|principal| principal.method == AuthMethod::Anonymous)
                    .unwrap_or(true);

                if anonymous {
                    return Ok(ApiError::unauthenticated().into_response());
                }
            }

            next.call(req).await
        })
    }
}

/// Admin gate: open while auth is off (development), otherwise requires the
/// `*` permission.
pub fn require_admin(config: &AuthConfig, principal: &AuthPrincipal) -> Result<(), ApiError> {
    if !config.enabled() {
        return Ok(());
    }

    if principal.has_permission("*") {
        Ok(())
    } else {
        Err(ApiError::forbidden())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn config(mode: AuthMode) -> AuthConfig {
        AuthConfig {
            mode,
            credentials: vec![CredentialConfig {
                secret: "s3cret".to_string().into(),
                subject: "ops".to_string(),
                permissions: BTreeSet::from(["*".to_string()]),
            }],
        }
    }

    fn request(headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder();

        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        builder.body(()).unwrap()
    }

    #[test]
    fn bearer_token_resolves_the_subject() {
        let principal = resolve_principal(&config(AuthMode::Token), &request(&[("authorization", "Bearer s3cret")]))
            .unwrap();

        assert_eq!(principal.subject, "ops");
        assert_eq!(principal.method, AuthMethod::Token);
        assert!(principal.has_permission("*"));
    }

    #[test]
    fn wrong_token_is_rejected_outright() {
        let result = resolve_principal(&config(AuthMode::Token), &request(&[("authorization", "Bearer nope")]));

        assert!(result.is_err());
    }

    #[test]
    fn missing_credential_is_anonymous() {
        let principal = resolve_principal(&config(AuthMode::Token), &request(&[])).unwrap();

        assert_eq!(principal.method, AuthMethod::Anonymous);
    }

    #[test]
    fn api_key_mode_ignores_bearer_tokens() {
        let principal = resolve_principal(&config(AuthMode::ApiKey), &request(&[("authorization", "Bearer s3cret")]))
            .unwrap();

        assert_eq!(principal.method, AuthMethod::Anonymous);

        let principal =
            resolve_principal(&config(AuthMode::ApiKey), &request(&[("x-api-key", "s3cret")])).unwrap();

        assert_eq!(principal.method, AuthMethod::ApiKey);
    }

    #[test]
    fn multi_mode_accepts_either_credential() {
        for headers in [[("authorization", "Bearer s3cret")], [("x-api-key", "s3cret")]] {
            let principal = resolve_principal(&config(AuthMode::Multi), &request(&headers)).unwrap();
            assert_eq!(principal.subject, "ops");
        }
    }

    #[test]
    fn admin_gate_is_open_without_auth() {
        let anonymous = AuthPrincipal::anonymous();

        assert!(require_admin(&AuthConfig::default(), &anonymous).is_ok());
        assert!(require_admin(&config(AuthMode::Token), &anonymous).is_err());
    }
}
