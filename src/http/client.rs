//! HTTP client for the build-service XML API.

use anyhow::{Context, Result};
use log::{debug, warn};
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::{Client, Method, RequestBuilder, Response};

use super::retry::{MAX_RETRIES, NonRetryableError, RETRY_DELAY_MS, status_error};

/// Basic-auth credentials sent with every request.
#[derive(Clone, Debug, PartialEq)]
pub struct Credentials {
    pub user: String,
    pub password: Option<String>,
}

/// HTTP client with retry logic for idempotent reads.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    credentials: Option<Credentials>,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            credentials: None,
        }
    }

    /// Sends basic-auth credentials with every request.
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Performs a GET request and returns the response body.
    /// Automatically retries on transient errors.
    #[tracing::instrument(skip(self))]
    pub async fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String> {
        debug!("GET {} {:?}...", url, query);

        self.with_retry("GET", || async {
            self.send_once(Method::GET, url, query, None).await
        })
        .await
    }

    /// Performs a PUT request with the given body. Never retried.
    #[tracing::instrument(skip(self, body))]
    pub async fn put_text(&self, url: &str, body: String) -> Result<String> {
        debug!("PUT {} ({} bytes)...", url, body.len());
        self.send_once(Method::PUT, url, &[], Some(body)).await
    }

    /// Performs a POST request. Never retried.
    #[tracing::instrument(skip(self, body))]
    pub async fn post_text(
        &self,
        url: &str,
        query: &[(&str, &str)],
        body: Option<String>,
    ) -> Result<String> {
        debug!("POST {} {:?}...", url, query);
        self.send_once(Method::POST, url, query, body).await
    }

    /// Performs a DELETE request. Never retried.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, url: &str, query: &[(&str, &str)]) -> Result<String> {
        debug!("DELETE {} {:?}...", url, query);
        self.send_once(Method::DELETE, url, query, None).await
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<String>,
    ) -> Result<String> {
        let mut request = self.authorized(self.client.request(method, url));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.context("Failed to send request")?;
        let response = check_status(response).await?;

        response
            .text()
            .await
            .context("Failed to read response body")
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(creds) => request.basic_auth(&creds.user, creds.password.as_deref()),
            None => request,
        }
    }

    /// Executes an async operation with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !is_retryable_error(&e) {
                        debug!("{}: non-retryable error: {}", operation_name, e);
                        return Err(e);
                    }

                    if attempt < MAX_RETRIES {
                        warn!(
                            "{}: attempt {}/{} failed ({}), retrying in {}ms...",
                            operation_name, attempt, MAX_RETRIES, e, RETRY_DELAY_MS
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(RETRY_DELAY_MS)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow::anyhow!("{}: failed after {} attempts", operation_name, MAX_RETRIES)
        }))
    }
}

/// Turns an unsuccessful response into an error carrying the service's summary.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    let summary = status_summary(&body).unwrap_or_else(|| status.to_string());
    Err(status_error(status, &url, &summary))
}

/// Extracts `<summary>` from a build-service `<status>` error document.
fn status_summary(body: &str) -> Option<String> {
    let mut reader = Reader::from_str(body);
    let mut in_summary = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"summary" => in_summary = true,
            Ok(Event::Text(e)) if in_summary => {
                let text = e.unescape().ok()?;
                let text = text.trim();
                return (!text.is_empty()).then(|| text.to_string());
            }
            Ok(Event::End(_)) => in_summary = false,
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

fn is_retryable_error(e: &anyhow::Error) -> bool {
    e.downcast_ref::<NonRetryableError>().is_none()
}
