//! HTTP Collaborator
//!
//! Thin JSON client over `reqwest` exposing GET/POST/PUT/DELETE and
//! returning `{data, status}` pairs. Non-2xx responses become
//! [`QueryError::Network`] with the status attached.

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{QueryError, Result};

/// Decoded response payload with its HTTP status.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub data: T,
    pub status: u16,
}

/// JSON client bound to one API base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Shares an existing connection pool.
    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins `path` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>> {
        let req = self.request(Method::GET, path);
        Self::json(req).await
    }

    /// GET with query string parameters.
    pub async fn get_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<ApiResponse<T>> {
        let req = self.request(Method::GET, path).query(query);
        Self::json(req).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<ApiResponse<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let req = self.request(Method::POST, path).json(body);
        Self::json(req).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<ApiResponse<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let req = self.request(Method::PUT, path).json(body);
        Self::json(req).await
    }

    /// DELETE; any response body is discarded.
    pub async fn delete(&self, path: &str) -> Result<ApiResponse<()>> {
        let resp = self.request(Method::DELETE, path).send().await?;
        let resp = Self::check(resp).await?;
        Ok(ApiResponse {
            data: (),
            status: resp.status().as_u16(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!(%method, %url, "api request");
        self.http.request(method, url)
    }

    async fn json<T: DeserializeOwned>(req: RequestBuilder) -> Result<ApiResponse<T>> {
        let resp = Self::check(req.send().await?).await?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await?;
        let data = serde_json::from_slice(&bytes)
            .map_err(|e| QueryError::Decode(format!("failed to parse body: {}", e)))?;
        Ok(ApiResponse { data, status })
    }

    async fn check(resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let url = resp.url().to_string();
        let text = resp.text().await.unwrap_or_default();
        Err(QueryError::http_status(
            status.as_u16(),
            format!("{} returned {} {}", url, status, text.trim()),
        ))
    }
}
