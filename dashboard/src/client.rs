use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::FetchError;

/// JSON client for the Coliseum dashboard API.
#[derive(Clone)]
pub struct ResourceClient {
    base_url: String,
    client: reqwest::Client,
}

/// FastAPI puts the reason in `detail`; some handlers use `error`.
#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
    error: Option<String>,
}

impl ResourceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .context("HTTP client")?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let req = self.client.get(&url).header("Accept", "application/json");
        self.execute(req, path).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.post(&url).header("Accept", "application/json");
        if let Some(body) = body {
            req = req.json(body);
        }
        self.execute(req, path).await
    }

    /// Fetch closure for the cache: a GET of `path` per call.
    pub fn getter<T>(
        &self,
        path: String,
    ) -> impl Fn() -> BoxFuture<'static, Result<T, FetchError>> + Send + Sync + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        let client = self.clone();
        move || {
            let client = client.clone();
            let path = path.clone();
            Box::pin(async move { client.get::<T>(&path).await })
        }
    }

    /// Like [`getter`](Self::getter) but walks `paths` with [`get_first`](Self::get_first).
    pub fn first_getter<T>(
        &self,
        paths: Vec<String>,
    ) -> impl Fn() -> BoxFuture<'static, Result<T, FetchError>> + Send + Sync + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        let client = self.clone();
        move || {
            let client = client.clone();
            let paths = paths.clone();
            Box::pin(async move { client.get_first::<T>(&paths).await })
        }
    }

    /// GET the first path that exists. Falls through to the next path only on 404.
    pub async fn get_first<T: DeserializeOwned>(&self, paths: &[String]) -> Result<T, FetchError> {
        let mut last = FetchError::Http {
            path: String::new(),
            status: 404,
            message: "no paths configured".to_string(),
        };
        for path in paths {
            match self.get(path).await {
                Err(e) if e.is_not_found() => {
                    debug!("{path} not served, trying next");
                    last = e;
                }
                other => return other,
            }
        }
        Err(last)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        path: &str,
    ) -> Result<T, FetchError> {
        let resp = req.send().await.map_err(|e| FetchError::Network {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        let status = resp.status();
        let body = resp.bytes().await.map_err(|e| FetchError::Network {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            let message = error_message(&body);
            warn!("{path} returned {status}: {message}");
            return Err(FetchError::Http {
                path: path.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        decode(path, &body)
    }
}

fn decode<T: DeserializeOwned>(path: &str, body: &[u8]) -> Result<T, FetchError> {
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| FetchError::Decode {
        path: path.to_string(),
        message: e.to_string(),
    })
}

fn error_message(body: &[u8]) -> String {
    if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
        match (parsed.detail, parsed.error) {
            (Some(serde_json::Value::String(s)), _) => return s,
            (Some(other), _) if !other.is_null() => return other.to_string(),
            (_, Some(e)) => return e,
            _ => {}
        }
    }
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        "empty response".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-process backend for client, cache and pipeline tests.

    use axum::Router;
    use std::net::SocketAddr;

    /// Serve `app` on an ephemeral port and return its base URL.
    pub async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    fn client(base: &str) -> ResourceClient {
        ResourceClient::new(base, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_get_decodes_json() {
        let app = Router::new().route(
            "/api/pipeline/status",
            get(|| async { Json(json!({"running": true})) }),
        );
        let base = mock::serve(app).await;
        let status: crate::types::PipelineStatus =
            client(&base).get("/api/pipeline/status").await.unwrap();
        assert!(status.running);
    }

    #[tokio::test]
    async fn test_http_error_carries_detail() {
        let app = Router::new().route(
            "/api/opportunities/missing",
            get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({"detail": "Opportunity missing not found"})),
                )
            }),
        );
        let base = mock::serve(app).await;
        let err = client(&base)
            .get::<serde_json::Value>("/api/opportunities/missing")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        match err {
            FetchError::Http { message, .. } => assert_eq!(message, "Opportunity missing not found"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let app = Router::new().route("/api/agents", get(|| async { "not json" }));
        let base = mock::serve(app).await;
        let err = client(&base)
            .get::<crate::types::AgentStatusResponse>("/api/agents")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn test_unreachable_is_network_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}"))
            .get::<serde_json::Value>("/api/config")
            .await
            .unwrap_err();
        assert!(err.is_network());
    }

    #[tokio::test]
    async fn test_empty_post_body_is_null() {
        let app = Router::new().route("/api/pipeline/run", post(|| async { StatusCode::OK }));
        let base = mock::serve(app).await;
        let body: serde_json::Value = client(&base)
            .post("/api/pipeline/run", None)
            .await
            .unwrap();
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn test_get_first_falls_through_on_404() {
        let app = Router::new().route(
            "/api/state",
            get(|| async { Json(json!({"portfolio": {"total_value": 1.0}})) }),
        );
        let base = mock::serve(app).await;
        let paths = vec!["/api/status".to_string(), "/api/state".to_string()];
        let state: crate::types::PortfolioState = client(&base).get_first(&paths).await.unwrap();
        assert_eq!(state.portfolio.total_value, rust_decimal::Decimal::ONE);
    }
}
