//! Rate limiting middleware for HTTP requests.

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use config::ClientIpConfig;
use http::{Request, Response, StatusCode};
use rate_limit::{RateLimitManager, RateLimitRequest};
use tower::Layer;

use crate::client_ip::extract_client_ip;

#[derive(Clone)]
pub struct RateLimitLayer {
    client_ip_config: ClientIpConfig,
    manager: Option<Arc<RateLimitManager>>,
}

impl RateLimitLayer {
    pub fn new(client_ip_config: ClientIpConfig, manager: Option<Arc<RateLimitManager>>) -> Self {
        Self {
            client_ip_config,
            manager,
        }
    }
}

impl<Service> Layer<Service> for RateLimitLayer
where
    Service: Send + Clone,
{
    type Service = RateLimitService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        RateLimitService {
            next,
            layer: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<Service> {
    next: Service,
    layer: RateLimitLayer,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for RateLimitService<Service>
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

        let Some(manager) = self.layer.manager.clone() else {
            return Box::pin(next.call(req));
        };

        let ip = extract_client_ip(&self.layer.client_ip_config, &req);

        Box::pin(async move {
            let rate_limit_request = RateLimitRequest::builder().ip(ip).build();

            if let Err(err) = manager.check_request(&rate_limit_request).await {
                log::debug!("Request from {ip} rejected: {err}");

                let response = Response::builder()
                    .status(StatusCode::TOO_MANY_REQUESTS)
                    .header("Content-Type", "text/plain")
                    .body(Body::from("Rate limit exceeded"))
                    .unwrap_or_default();

                return Ok(response);
            }

            next.call(req).await
        })
    }
}
