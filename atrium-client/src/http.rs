//! Cookie-authenticated HTTP plumbing
//!
//! Requests are described by [`ApiRequest`] values so a 401 can be
//! replayed identically after a session refresh. Credentials live in a
//! shared cookie jar that the backend populates via `Set-Cookie`.

use crate::refresh::TokenRefreshCoordinator;
use atrium_core::{ApiConfig, AtriumError, AtriumResult, ErrorContext, User};
use log::debug;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, USER_AGENT};
use reqwest::{Client, Method, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL for the API
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
    /// Additional headers sent with every request
    pub headers: HashMap<String, String>,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            timeout_seconds: 30,
            user_agent: "atrium-client/0.1".to_string(),
            headers: HashMap::new(),
        }
    }
}

impl ApiClientConfig {
    /// Set additional header
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

impl From<&ApiConfig> for ApiClientConfig {
    fn from(config: &ApiConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            timeout_seconds: config.timeout_seconds,
            user_agent: config.user_agent.clone(),
            headers: HashMap::new(),
        }
    }
}

/// A request the client can rebuild at will.
///
/// `reqwest` requests are consumed on send, so the retry-after-refresh
/// path reconstructs the request from this description instead of
/// trying to clone a half-consumed builder.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the configured base URL.
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub headers: HashMap<String, String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HashMap::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Build the shared HTTP client with every request carrying the
/// configured headers, the cookie jar, and caching disabled.
pub fn create_http_client(config: &ApiClientConfig, jar: Arc<Jar>) -> AtriumResult<Client> {
    let mut headers = HeaderMap::new();

    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&config.user_agent).map_err(|e| AtriumError::Validation {
            message: format!("Invalid user agent: {}", e),
            field: Some("user_agent".to_string()),
            context: ErrorContext::new("http_client").with_operation("create_client"),
        })?,
    );

    // Session responses must never be served from an intermediary cache.
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

    for (key, value) in &config.headers {
        let header_name =
            HeaderName::from_bytes(key.as_bytes()).map_err(|e| AtriumError::Validation {
                message: format!("Invalid header name '{}': {}", key, e),
                field: Some(key.clone()),
                context: ErrorContext::new("http_client").with_operation("create_client"),
            })?;

        let header_value =
            HeaderValue::from_str(value).map_err(|e| AtriumError::Validation {
                message: format!("Invalid header value for '{}': {}", key, e),
                field: Some(key.clone()),
                context: ErrorContext::new("http_client").with_operation("create_client"),
            })?;

        headers.insert(header_name, header_value);
    }

    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .default_headers(headers)
        .cookie_provider(jar)
        .build()
        .map_err(|e| atrium_core::http_error!("Failed to create HTTP client", e))?;

    Ok(client)
}

/// Request wrapper that transparently survives one session expiry.
///
/// Every request goes out with the jar's cookies attached. A 401 asks
/// the [`TokenRefreshCoordinator`] for one refresh and, only if that
/// succeeds, replays the identical request once. Whatever response the
/// last attempt produced is returned, a second 401 included.
pub struct AuthClient {
    client: Client,
    jar: Arc<Jar>,
    config: ApiClientConfig,
    base: Url,
    coordinator: Arc<TokenRefreshCoordinator>,
}

impl AuthClient {
    /// Build a client with its own cookie jar.
    pub fn new(
        config: ApiClientConfig,
        coordinator: Arc<TokenRefreshCoordinator>,
    ) -> AtriumResult<Self> {
        let jar = Arc::new(Jar::default());
        let client = create_http_client(&config, Arc::clone(&jar))?;
        Self::from_parts(client, jar, config, coordinator)
    }

    /// Assemble from pre-built parts. The client must have been created
    /// with `jar` as its cookie provider, otherwise refreshed cookies
    /// will not reach subsequent requests.
    pub fn from_parts(
        client: Client,
        jar: Arc<Jar>,
        config: ApiClientConfig,
        coordinator: Arc<TokenRefreshCoordinator>,
    ) -> AtriumResult<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| AtriumError::Config {
            message: format!("Invalid API base URL '{}': {}", config.base_url, e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("http_client")
                .with_operation("from_parts")
                .with_suggestion("Use an absolute URL like http://localhost:3000/api"),
        })?;

        Ok(Self {
            client,
            jar,
            config,
            base,
            coordinator,
        })
    }

    /// The underlying `reqwest` client, sharing this client's cookie jar.
    pub fn http(&self) -> &Client {
        &self.client
    }

    pub fn coordinator(&self) -> &Arc<TokenRefreshCoordinator> {
        &self.coordinator
    }

    /// Issue the request, refreshing the session and replaying once on a
    /// 401. The caller receives the final response either way.
    pub async fn execute(&self, request: &ApiRequest) -> AtriumResult<reqwest::Response> {
        let response = self.send(request).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(
            "request to {} returned 401, attempting session refresh",
            request.path
        );
        if !self.coordinator.refresh().await {
            // Session is gone. Hand the original 401 back unchanged.
            return Ok(response);
        }

        debug!("replaying {} after session refresh", request.path);
        self.send(request).await
    }

    /// Convenience wrapper over [`execute`](Self::execute) for bare GETs.
    pub async fn get(&self, path: &str) -> AtriumResult<reqwest::Response> {
        self.execute(&ApiRequest::get(path)).await
    }

    /// Convenience wrapper over [`execute`](Self::execute) for JSON POSTs.
    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> AtriumResult<reqwest::Response> {
        self.execute(&ApiRequest::post(path).with_body(body.clone()))
            .await
    }

    async fn send(&self, request: &ApiRequest) -> AtriumResult<reqwest::Response> {
        let url = self.api_url(&request.path);
        let mut builder = self.client.request(request.method.clone(), &url);

        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        builder
            .send()
            .await
            .map_err(|e| self.send_error(e, request))
    }

    fn api_url(&self, path: &str) -> String {
        // Absolute URLs already name their host; only relative paths
        // are joined onto the configured base.
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }

        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn send_error(&self, error: reqwest::Error, request: &ApiRequest) -> AtriumError {
        if error.is_timeout() {
            return AtriumError::Timeout {
                operation: format!("{} {}", request.method, request.path),
                duration_ms: self.config.timeout_seconds * 1000,
                context: ErrorContext::new("http_client")
                    .with_operation("send")
                    .with_suggestion("Increase api.timeout_seconds or check backend latency"),
            };
        }

        atrium_core::http_error!(format!("request to {} failed", request.path), error)
    }

    /// Read the lightweight user snapshot the backend mirrors into the
    /// client-readable `user` cookie. Unreadable snapshots are treated
    /// as absent rather than fatal.
    pub fn user_cookie_snapshot(&self) -> Option<User> {
        let header = self.jar.cookies(&self.base)?;
        let raw = header.to_str().ok()?;
        let encoded = raw
            .split(';')
            .map(str::trim)
            .find_map(|pair| pair.strip_prefix("user="))?;

        let decoded = match urlencoding::decode(encoded) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!("user cookie is not valid percent-encoding: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<User>(&decoded) {
            Ok(user) => Some(user),
            Err(e) => {
                debug!("user cookie present but unreadable: {}", e);
                None
            }
        }
    }

    /// Expire the session cookies locally. The backend's own logout
    /// endpoint is a separate concern; this only guarantees the next
    /// request goes out unauthenticated.
    pub fn clear_session_cookies(&self) {
        for name in ["user", "access_token", "refresh_token"] {
            self.jar
                .add_cookie_str(&format!("{}=; Max-Age=0; Path=/", name), &self.base);
        }
    }
}

/// Turn a non-success response into a structured error, consuming the
/// body for the message.
pub async fn response_error(response: reqwest::Response, operation: &str) -> AtriumError {
    let status = response.status();
    let url = response.url().clone();

    let error_body = response.text().await.unwrap_or_default();

    AtriumError::Api {
        message: format!(
            "HTTP {} for {}: {}",
            status.as_u16(),
            url,
            if error_body.is_empty() {
                status.canonical_reason().unwrap_or("unknown error")
            } else {
                &error_body
            }
        ),
        status: status.as_u16(),
        context: ErrorContext::new("api_client")
            .with_operation(operation)
            .with_suggestion(match status.as_u16() {
                401 => "Sign in again to obtain fresh session cookies",
                403 => "Check the signed-in user's role and permissions",
                404 => "Check the API base URL and backend version",
                _ => "Check backend availability and logs",
            }),
    }
}
