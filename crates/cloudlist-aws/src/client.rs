//! HTTP JSON backend shared by the listing, tagging and detail APIs.
//!
//! Every request is retried on throttling (429), server errors (5xx) and
//! transport failures with exponential backoff. A 404 becomes
//! [`ApiError::NotFound`].

use std::time::Duration;

use cloudlist_core::{ApiError, RetryPolicy, retry_with_backoff};
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::arn::partition_for_region;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest error body kept in messages
const MAX_ERROR_BODY: usize = 200;

/// Where and as whom to call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub region: String,
    pub account_id: String,
    /// Bearer token, sent as `Authorization: Bearer ...`
    pub token: Option<String>,
}

impl Endpoint {
    pub fn partition(&self) -> &'static str {
        partition_for_region(&self.region)
    }
}

/// Transport settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// One page of a primary listing on the wire
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next_token: Option<String>,
}

/// Create an API error from a reqwest error
fn from_reqwest(e: &reqwest::Error) -> ApiError {
    ApiError::Http {
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    }
}

/// Pull a human-readable message out of an error body
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(alias = "Message")]
        message: String,
    }
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_string());
    match message.char_indices().nth(MAX_ERROR_BODY) {
        Some((i, _)) => format!("{}...", &message[..i]),
        None => message,
    }
}

/// Client for the JSON gateway
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: Endpoint,
    retry: RetryPolicy,
}

impl HttpBackend {
    pub fn new(endpoint: Endpoint, settings: HttpSettings) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(settings.timeout)
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| from_reqwest(&e))?;
        Ok(Self {
            client,
            endpoint,
            retry: settings.retry,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.endpoint.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// GET `path` with query parameters, decoding a JSON body
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let this = self;
        retry_with_backoff(path, self.retry, move || async move {
            let req = this.authorized(this.client.get(this.url(path)).query(query));
            this.send(req, path).await
        })
        .await
    }

    /// POST a JSON body to `path`, decoding a JSON body
    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let this = self;
        retry_with_backoff(path, self.retry, move || async move {
            let req = this.authorized(this.client.post(this.url(path)).json(body));
            this.send(req, path).await
        })
        .await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        path: &str,
    ) -> Result<T, ApiError> {
        let resp = req.send().await.map_err(|e| from_reqwest(&e))?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                status: Some(status.as_u16()),
                message: error_message(&body),
            });
        }
        let bytes = resp.bytes().await.map_err(|e| from_reqwest(&e))?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(format!("{path}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_from_json() {
        assert_eq!(
            error_message(r#"{"__type":"ThrottlingException","message":"Rate exceeded"}"#),
            "Rate exceeded"
        );
        assert_eq!(error_message(r#"{"Message":"Access denied"}"#), "Access denied");
    }

    #[test]
    fn error_message_plain_text_truncated() {
        assert_eq!(error_message("  bad gateway \n"), "bad gateway");
        let long = "x".repeat(500);
        let msg = error_message(&long);
        assert_eq!(msg.len(), MAX_ERROR_BODY + 3);
        assert!(msg.ends_with("..."));
    }

    #[test]
    fn url_joins_without_double_slash() {
        let backend = HttpBackend::new(
            Endpoint {
                base_url: "http://localhost:4566/".into(),
                region: "us-east-1".into(),
                account_id: "123456789012".into(),
                token: None,
            },
            HttpSettings::default(),
        )
        .unwrap();
        assert_eq!(
            backend.url("logs/log-groups"),
            "http://localhost:4566/logs/log-groups"
        );
        assert_eq!(backend.endpoint().partition(), "aws");
    }
}
