//! Test harness: a gateway bound to an ephemeral port with scripted
//! collaborators, plus a thin HTTP client.

mod collaborators;
mod model;

use std::net::SocketAddr;
use std::sync::Arc;

use config::Config;
use server::ServeConfig;
use tokio_util::sync::CancellationToken;

pub use collaborators::{EchoToolBroker, MemorySessionStore};
pub use model::ScriptedConnector;

/// A running gateway instance for one test.
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
}

impl TestServer {
    /// Boots a gateway from a TOML snippet with the default scripted
    /// collaborators.
    pub async fn spawn(config_toml: &str) -> Self {
        let config: Config = toml::from_str(config_toml).expect("valid test configuration");

        let shutdown = CancellationToken::new();
        let (bound_tx, bound_rx) = tokio::sync::oneshot::channel();

        let serve_config = ServeConfig {
            listen_address: "127.0.0.1:0".parse().expect("valid loopback address"),
            config,
            shutdown_signal: shutdown.clone(),
            log_filter: "warn".to_string(),
            version: "test".to_string(),
            bound_addr_sender: Some(bound_tx),
            model: Arc::new(ScriptedConnector::new()),
            sessions: Some(Arc::new(MemorySessionStore::with_fixtures())),
            tools: Some(Arc::new(EchoToolBroker)),
        };

        tokio::spawn(async move {
            if let Err(err) = server::serve(serve_config).await {
                eprintln!("test server exited with error: {err}");
            }
        });

        let addr = bound_rx.await.expect("server should report its bound address");

        Self { addr, shutdown }
    }

    /// The bound socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `http://` base URL.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// `ws://` URL of the WebSocket endpoint.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// A client against this server.
    pub fn client(&self) -> TestClient {
        TestClient::new(self.base_url())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Test client for making HTTP requests to the test server.
#[derive(Clone)]
pub struct TestClient {
    base_url: String,
    client: reqwest::Client,
    bearer: Option<String>,
}

impl TestClient {
    /// Creates a client for the given base URL.
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
            bearer: None,
        }
    }

    /// Attaches a bearer token to every request.
    pub fn with_bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Sends a GET request to the given path.
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.apply_auth(self.client.get(format!("{}{}", self.base_url, path)))
            .send()
            .await
            .expect("request should reach the test server")
    }

    /// Sends a POST request with a JSON body.
    pub async fn post<T: serde::Serialize>(&self, path: &str, body: &T) -> reqwest::Response {
        self.apply_auth(self.client.post(format!("{}{}", self.base_url, path)).json(body))
            .send()
            .await
            .expect("request should reach the test server")
    }

    /// Sends a DELETE request.
    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.apply_auth(self.client.delete(format!("{}{}", self.base_url, path)))
            .send()
            .await
            .expect("request should reach the test server")
    }

    /// Builds a request for full control.
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.apply_auth(self.client.request(method, format!("{}{}", self.base_url, path)))
    }
}
