//! Transport configuration for the client.

use std::collections::HashMap;
use std::time::Duration;

/// Default service root used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://beta.character.ai";

/// Client identity string sent with every request.
pub const DEFAULT_USER_AGENT: &str = "Chrome/79";

/// Root under which character avatar files are served.
pub const DEFAULT_AVATAR_BASE_URL: &str = "https://characterai.io/i/400/static/avatars/";

/// A secret string type for sensitive data like authentication tokens.
/// Prevents accidental logging or display of secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// Generic transport options containing truly generic transport fields
/// and transport-specific configuration.
///
/// # Example
/// ```rust
/// use charai::options::{HttpTransport, TransportOptions};
/// use std::time::Duration;
///
/// let options = TransportOptions::new(
///     HttpTransport::default().with_base_url("http://localhost:8080".to_string()),
/// )
/// .with_timeout(Duration::from_secs(30));
///
/// assert_eq!(options.provider.base_url(), "http://localhost:8080");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransportOptions<T> {
    /// Request timeout. Applies to the whole exchange, streaming bodies included.
    pub timeout: Option<Duration>,

    /// Transport-specific options
    pub provider: T,
}

impl<T> TransportOptions<T> {
    /// Create new transport options with transport-specific configuration.
    pub fn new(provider: T) -> Self {
        Self {
            timeout: None,
            provider,
        }
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// HTTP-specific transport options.
/// Used as the provider field in `TransportOptions<HttpTransport>`.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    /// Service root; endpoint paths are appended to it
    pub base_url: Option<String>,

    /// Root for avatar image URLs
    pub avatar_base_url: Option<String>,

    /// Value of the `User-Agent` header
    pub user_agent: Option<String>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,
}

impl HttpTransport {
    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Set the avatar base URL.
    pub fn with_avatar_base_url(mut self, avatar_base_url: String) -> Self {
        self.avatar_base_url = Some(avatar_base_url);
        self
    }

    /// Override the client identity string.
    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = Some(user_agent);
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Set extra headers.
    pub fn with_extra_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.extra_headers = Some(headers);
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }

    /// Effective base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    /// Effective avatar base URL.
    pub fn avatar_base_url(&self) -> &str {
        self.avatar_base_url
            .as_deref()
            .unwrap_or(DEFAULT_AVATAR_BASE_URL)
    }

    /// Effective `User-Agent` value.
    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }
}
