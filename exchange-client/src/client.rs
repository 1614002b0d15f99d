//! REST client: builds signed requests and decodes JSON responses.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::auth::{signed_headers, Account, HEADER_ACCESS_KEY, HEADER_ACCESS_SIGNATURE, HEADER_ACCESS_TIMESTAMP};
use crate::errors::{ExchangeError, Result};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Binds an HTTP client, an optional signing identity, and a base URL.
///
/// Public endpoints (market listing, orderbook) work without an `Account`;
/// anything under a private namespace returns [`ExchangeError::Signing`] if
/// called unauthenticated.
#[derive(Clone)]
pub struct ExchangeClient {
    http: reqwest::Client,
    account: Option<Account>,
    base_url: String,
    retry_policy: RetryPolicy,
}

impl ExchangeClient {
    pub fn new(base_url: impl Into<String>, account: Option<Account>) -> Self {
        Self {
            http: reqwest::Client::new(),
            account,
            base_url: base_url.into(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` with `query` url-encoded, signing the request if an
    /// [`Account`] is configured. The signature covers `path` only, never
    /// the query string, per the exchange's signing contract.
    pub async fn get<Q, R>(&self, path: &str, query: &Q) -> Result<R>
    where
        Q: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let query_string = serde_urlencoded::to_string(query)?;
        let url = if query_string.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query_string)
        };

        retry_with_backoff(self.retry_policy, || {
            let url = url.clone();
            async move { self.send(Method::GET, path, url).await }
        })
        .await
    }

    /// POST a JSON body to `path`, signing the request if configured.
    pub async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        retry_with_backoff(self.retry_policy, || {
            let url = url.clone();
            async move { self.send_with_body(Method::POST, path, url, body).await }
        })
        .await
    }

    async fn send<R>(&self, method: Method, path: &str, url: String) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let mut request = self.http.request(method.clone(), &url);
        request = self.apply_auth(request, method.as_str(), path)?;
        self.execute(request).await
    }

    async fn send_with_body<B, R>(&self, method: Method, path: &str, url: String, body: &B) -> Result<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let mut request = self.http.request(method.clone(), &url).json(body);
        request = self.apply_auth(request, method.as_str(), path)?;
        self.execute(request).await
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder, method: &str, path: &str) -> Result<reqwest::RequestBuilder> {
        let Some(account) = &self.account else {
            return Ok(request);
        };
        let (key_id, timestamp, signature) = signed_headers(account, method, path)?;
        Ok(request
            .header(HEADER_ACCESS_KEY, key_id)
            .header(HEADER_ACCESS_TIMESTAMP, timestamp)
            .header(HEADER_ACCESS_SIGNATURE, signature))
    }

    async fn execute<R>(&self, request: reqwest::RequestBuilder) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(ExchangeError::Http {
                status: status.as_u16(),
                body,
            });
        }
        if status.is_client_error() {
            return Err(ExchangeError::Http {
                status: status.as_u16(),
                body,
            });
        }

        debug!(%status, bytes = body.len(), "exchange response received");
        serde_json::from_str(&body).map_err(|e| ExchangeError::Parse(e, body))
    }
}
