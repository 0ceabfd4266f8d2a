//! Blocking client for the scenario/agent lookup service.
//!
//! Queried once while a session is set up, from the foreground, before any
//! background connection exists.

use reqwest::Url;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use socialstream_core::{AgentProfile, Scenario};
use std::time::Duration;

pub struct LookupClient {
    base: Url,
    http: Client,
}

impl LookupClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LookupError> {
        // A trailing slash makes `join` append instead of replacing the last
        // path segment.
        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base = Url::parse(&base).map_err(|e| LookupError::InvalidUrl(e.to_string()))?;
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { base, http })
    }

    pub fn scenarios(&self) -> Result<Vec<Scenario>, LookupError> {
        self.get("scenarios")
    }

    pub fn agents(&self) -> Result<Vec<AgentProfile>, LookupError> {
        self.get("agents")
    }

    /// Model identifiers agents can be run with.
    pub fn models(&self) -> Result<Vec<String>, LookupError> {
        self.get("models")
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, LookupError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| LookupError::InvalidUrl(e.to_string()))?;
        tracing::debug!("GET {}", url);
        let body = self.http.get(url).send()?.error_for_status()?.json()?;
        Ok(body)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("invalid lookup url: {0}")]
    InvalidUrl(String),
    #[error("lookup request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::get};
    use std::net::SocketAddr;

    /// Serve `app` on an ephemeral port from a background runtime.
    fn serve(app: Router) -> SocketAddr {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
                tx.send(listener.local_addr().unwrap()).unwrap();
                axum::serve(listener, app).await.unwrap();
            });
        });
        rx.recv().unwrap()
    }

    #[test]
    fn fetches_catalogs() {
        let app = Router::new()
            .route(
                "/api/scenarios",
                get(|| async {
                    Json(serde_json::json!([
                        {"codename": "borrow", "pk": "e1", "scenario": "Rent is due."}
                    ]))
                }),
            )
            .route(
                "/api/agents",
                get(|| async {
                    Json(serde_json::json!([
                        {"first_name": "Ava", "last_name": "Lee", "pk": "a1"},
                        {"first_name": "Ben", "last_name": "Ortiz", "pk": "a2"}
                    ]))
                }),
            )
            .route("/api/models", get(|| async { Json(vec!["gpt-4o-mini"]) }));
        let addr = serve(app);

        let client = LookupClient::new(&format!("http://{addr}/api"), Duration::from_secs(5)).unwrap();
        assert_eq!(client.scenarios().unwrap()[0].pk, "e1");
        assert_eq!(client.agents().unwrap()[1].full_name(), "Ben Ortiz");
        assert_eq!(client.models().unwrap(), vec!["gpt-4o-mini".to_string()]);
    }

    #[test]
    fn http_errors_are_reported() {
        let addr = serve(Router::new());
        let client = LookupClient::new(&format!("http://{addr}"), Duration::from_secs(5)).unwrap();
        assert!(matches!(client.agents(), Err(LookupError::Http(_))));
    }
}
