//! HTTP client for an OpenFGA-compatible store.

use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{ApiError, ChangesPage, TupleKey};

/// Client bound to a single store on a single API endpoint.
pub struct FgaClient {
    http: Client,
    api_url: String,
    store_id: String,
    token: Option<String>,
}

impl FgaClient {
    /// Create a new client for `store_id` at `api_url`.
    pub fn new(api_url: impl Into<String>, store_id: impl Into<String>) -> Result<Self, ApiError> {
        let api_url = api_url.into();
        Url::parse(&api_url).map_err(|e| ApiError::InvalidUrl {
            url: api_url.clone(),
            reason: e.to_string(),
        })?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            store_id: store_id.into(),
            token: None,
        })
    }

    /// Send a bearer token with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Get the API URL.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Get the store identifier.
    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    /// Read a page of the change feed.
    pub async fn read_changes(
        &self,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<ChangesPage, ApiError> {
        let url = format!("{}/stores/{}/changes", self.api_url, self.store_id);

        let mut query: Vec<(&str, String)> = vec![("page_size", page_size.to_string())];
        if let Some(cursor) = cursor {
            query.push(("continuation_token", cursor.to_string()));
        }

        let response = self.authorized(self.http.get(&url)).query(&query).send().await?;
        let page: ChangesPage = self.handle_response(response).await?;

        debug!(
            changes = page.changes.len(),
            cursor = ?page.next_cursor(),
            "read changes"
        );
        Ok(page)
    }

    /// Write tuples.
    pub async fn write_tuples(&self, tuples: &[TupleKey]) -> Result<(), ApiError> {
        self.post_write(&WriteRequest {
            writes: Some(TupleKeys { tuple_keys: tuples }),
            deletes: None,
        })
        .await?;
        debug!(count = tuples.len(), "wrote tuples");
        Ok(())
    }

    /// Delete tuples.
    pub async fn delete_tuples(&self, tuples: &[TupleKey]) -> Result<(), ApiError> {
        self.post_write(&WriteRequest {
            writes: None,
            deletes: Some(TupleKeys { tuple_keys: tuples }),
        })
        .await?;
        debug!(count = tuples.len(), "deleted tuples");
        Ok(())
    }

    async fn post_write(&self, body: &WriteRequest<'_>) -> Result<(), ApiError> {
        let url = format!("{}/stores/{}/write", self.api_url, self.store_id);
        let response = self.authorized(self.http.post(&url)).json(body).send().await?;
        let _: serde_json::Value = self.handle_response(response).await?;
        Ok(())
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Handle HTTP response and parse JSON, classifying failures by status.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(ApiError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let text = response.text().await.map_err(|e| ApiError::Server {
                status: status.as_u16(),
                message: format!("failed to read response: {}", e),
            })?;
            return Err(classify_failure(status, &text));
        }

        let body = response.json().await?;
        Ok(body)
    }
}

/// Map a non-success status and body onto the error taxonomy.
fn classify_failure(status: StatusCode, body: &str) -> ApiError {
    let parsed = serde_json::from_str::<StoreError>(body).ok();
    let message = parsed
        .as_ref()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| body.to_string());

    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::NOT_FOUND
        | StatusCode::CONFLICT
        | StatusCode::UNPROCESSABLE_ENTITY => ApiError::Rejected {
            status: status.as_u16(),
            code: parsed.map(|e| e.code).unwrap_or_default(),
            message,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized {
            status: status.as_u16(),
            message,
        },
        _ => ApiError::Server {
            status: status.as_u16(),
            message,
        },
    }
}

/// Error body returned by the store.
#[derive(Debug, Deserialize)]
struct StoreError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct WriteRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    writes: Option<TupleKeys<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deletes: Option<TupleKeys<'a>>,
}

#[derive(Debug, Serialize)]
struct TupleKeys<'a> {
    tuple_keys: &'a [TupleKey],
}
