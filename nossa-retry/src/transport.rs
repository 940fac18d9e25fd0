//! HTTP transport with automatic retries on network failures.

use crate::config::RetryOptions;
use crate::error::FetchError;
use crate::executor::execute_network_request;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::Connection(err.to_string())
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::status(status.as_u16(), err.to_string())
        } else if err.is_builder() {
            FetchError::Other(err.into())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// HTTP client wrapper that retries network failures.
///
/// Timeouts, connection failures and other transport errors are retried
/// with backoff. Error statuses are returned as [`FetchError::Status`] and
/// not retried unless the options carry their own predicate.
#[derive(Debug, Clone)]
pub struct RetryClient {
    client: Client,
    options: RetryOptions<FetchError>,
}

impl RetryClient {
    /// Create a new retry client with a default reqwest client.
    pub fn new(options: RetryOptions<FetchError>) -> Self {
        Self {
            client: Client::new(),
            options,
        }
    }

    /// Create with a custom reqwest client.
    pub fn with_client(client: Client, options: RetryOptions<FetchError>) -> Self {
        Self { client, options }
    }

    /// Create a builder.
    pub fn builder() -> RetryClientBuilder {
        RetryClientBuilder::default()
    }

    /// Get a reference to the underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Get a reference to the retry options.
    pub fn options(&self) -> &RetryOptions<FetchError> {
        &self.options
    }

    /// Execute a GET request with retries.
    pub async fn get(&self, url: &str) -> Result<Response, FetchError> {
        self.request(Method::GET, url, Option::<()>::None).await
    }

    /// GET and decode a JSON body. Decoding is part of each attempt.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let client = self.client.clone();
        execute_network_request(
            || {
                let request = client.get(url);
                async move {
                    debug!(url = %url, "Fetching JSON");
                    let response = check_response(request.send().await?).await?;
                    response.json::<T>().await.map_err(FetchError::from)
                }
            },
            self.options.clone(),
        )
        .await
    }

    /// Execute a POST request with retries.
    pub async fn post<B: Serialize>(&self, url: &str, body: B) -> Result<Response, FetchError> {
        self.request(Method::POST, url, Some(body)).await
    }

    /// Execute a PUT request with retries.
    pub async fn put<B: Serialize>(&self, url: &str, body: B) -> Result<Response, FetchError> {
        self.request(Method::PUT, url, Some(body)).await
    }

    /// Execute a DELETE request with retries.
    pub async fn delete(&self, url: &str) -> Result<Response, FetchError> {
        self.request(Method::DELETE, url, Option::<()>::None).await
    }

    async fn request<B: Serialize>(
        &self,
        method: Method,
        url: &str,
        body: Option<B>,
    ) -> Result<Response, FetchError> {
        execute_network_request(
            || {
                let mut request = self.client.request(method.clone(), url);
                if let Some(b) = &body {
                    request = request.json(b);
                }
                let method = method.clone();

                async move {
                    debug!(method = %method, url = %url, "Making HTTP request");
                    check_response(request.send().await?).await
                }
            },
            self.options.clone(),
        )
        .await
    }
}

/// Turn non-success statuses into [`FetchError::Status`].
async fn check_response(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(FetchError::status(status.as_u16(), body))
}

/// Builder for creating a retry client.
#[derive(Debug, Default)]
pub struct RetryClientBuilder {
    client: Option<Client>,
    options: RetryOptions<FetchError>,
    timeout: Option<Duration>,
}

impl RetryClientBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the underlying HTTP client. Overrides `timeout`.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set max attempts.
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.options = self.options.max_attempts(n);
        self
    }

    /// Set initial delay.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.options = self.options.initial_delay(delay);
        self
    }

    /// Set max delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.options = self.options.max_delay(delay);
        self
    }

    /// Set a custom retry predicate.
    pub fn is_retryable<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&FetchError) -> bool + Send + Sync + 'static,
    {
        self.options = self.options.is_retryable(predicate);
        self
    }

    /// Set per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the retry client.
    pub fn build(self) -> Result<RetryClient, FetchError> {
        let client = match self.client {
            Some(client) => client,
            None => {
                let mut builder = Client::builder();
                if let Some(timeout) = self.timeout {
                    builder = builder.timeout(timeout);
                }
                builder.build()?
            }
        };

        Ok(RetryClient::with_client(client, self.options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Post {
        id: u32,
        title: String,
    }

    fn fast_client(max_attempts: u32) -> RetryClient {
        RetryClient::builder()
            .max_attempts(max_attempts)
            .initial_delay(Duration::from_millis(5))
            .max_delay(Duration::from_millis(20))
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder() {
        let client = RetryClient::builder()
            .max_attempts(5)
            .initial_delay(Duration::from_millis(100))
            .max_delay(Duration::from_secs(30))
            .build()
            .unwrap();

        let config = client.options().resolve();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_delay, Duration::from_millis(100));
        assert_eq!(config.max_delay, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_get_json_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/posts/1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": 1, "title": "Primeiro trimestre" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let post: Post = fast_client(3)
            .get_json(&format!("{}/posts/1", server.uri()))
            .await
            .unwrap();

        assert_eq!(
            post,
            Post {
                id: 1,
                title: "Primeiro trimestre".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("User not found"))
            .expect(1)
            .mount(&server)
            .await;

        let err = fast_client(3)
            .get(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(404));
    }

    #[tokio::test]
    async fn test_timeout_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .expect(2)
            .mount(&server)
            .await;

        let err = fast_client(2)
            .get(&format!("{}/slow", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Timeout));
    }

    #[tokio::test]
    async fn test_custom_predicate_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/habits"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = RetryClient::builder()
            .max_attempts(3)
            .initial_delay(Duration::from_millis(1))
            .is_retryable(|e| e.status_code().is_some_and(|s| s >= 500))
            .build()
            .unwrap();

        let err = client
            .post(
                &format!("{}/habits", server.uri()),
                serde_json::json!({ "name": "hidratação" }),
            )
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(503));
    }

    #[tokio::test]
    async fn test_connection_refused_is_classified() {
        let client = fast_client(1);
        let err = client.get("http://127.0.0.1:1/").await.unwrap_err();
        assert!(crate::policy::is_network_error(&err), "{err}");
    }
}
