//! Request/response logging middleware.

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use config::LoggingConfig;
use http::{Request, Response};
use tower::Layer;

use crate::hooks::{GatewayEvent, GatewayEvents};

#[derive(Clone)]
pub struct RequestLogLayer {
    config: LoggingConfig,
    hooks: GatewayEvents,
}

impl RequestLogLayer {
    pub fn new(config: LoggingConfig, hooks: GatewayEvents) -> Self {
        Self { config, hooks }
    }
}

impl<Service> Layer<Service> for RequestLogLayer
where
    Service: Send + Clone,
{
    type Service = RequestLogService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        RequestLogService {
            next,
            config: self.config.clone(),
            hooks: self.hooks.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RequestLogService<Service> {
    next: Service,
    config: LoggingConfig,
    hooks: GatewayEvents,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for RequestLogService<Service>
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
        let config = self.config.clone();
        let hooks = self.hooks.clone();

        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        if config.requests {
            log::info!("--> {method} {path}");
        }

        let started = Instant::now();

        Box::pin(async move {
            let response = next.call(req).await?;
            let status = response.status();

            if config.responses {
                log::info!("<-- {method} {path} {} {:?}", status.as_u16(), started.elapsed());
            }

            if config.errors && status.is_server_error() {
                log::error!("{method} {path} failed with {status}");
            }

            hooks.emit(GatewayEvent::Request {
                method,
                path,
                status: status.as_u16(),
            });

            Ok(response)
        })
    }
}
