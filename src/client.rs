//! Request facade and error types.

use futures::Stream;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::http::build_headers;
use crate::options::{HttpTransport, TransportOptions};
use crate::session::Session;
use crate::stream::{MalformedPolicy, RecordStreamExt};
use crate::transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A request requiring a token was attempted with none set.
    /// Raised before anything is sent.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Non-200 status on a request/response call.
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// Non-200 status on a streaming call.
    #[error("HTTP status {0} on streaming request")]
    StreamHttpStatus(u16),

    /// A delimited record was not valid JSON.
    #[error("malformed record ({source}): {preview}")]
    MalformedRecord {
        preview: String,
        #[source]
        source: serde_json::Error,
    },

    /// The stream ended inside a record.
    #[error("stream ended with {buffered} bytes of an unterminated record")]
    TruncatedStream { buffered: usize },

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// A response lacked a field the client relies on.
    #[error("response is missing field `{0}`")]
    MissingField(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Build a [`ClientError::MalformedRecord`] with a short preview of the payload.
    pub fn malformed_record(source: serde_json::Error, payload: &[u8]) -> Self {
        Self::MalformedRecord {
            preview: String::from_utf8_lossy(payload).chars().take(100).collect(),
            source,
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::HttpStatus(status) | ClientError::StreamHttpStatus(status) => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if this error is related to authentication.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ClientError::NotAuthenticated) || matches!(self.status(), Some(401 | 403))
    }
}

/// Authenticated or anonymous access to the service.
///
/// Owns the [`Session`] whose token is attached to requests, and the
/// [`Transport`] they travel over. Every streaming call gets its own
/// decoder, so several may run at once against the same client.
///
/// # Example
/// ```no_run
/// use charai::client::Client;
/// use charai::options::{HttpTransport, TransportOptions};
/// use futures::StreamExt;
/// use serde_json::{json, Value};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut client = Client::new(TransportOptions::new(HttpTransport::default()))?;
///     client.authenticate("identity-provider-token").await?;
///
///     let categories: Value = client.get_json(&client.url("/chat/character/categories/"), true).await?;
///     println!("{}", categories);
///
///     let url = client.url("/chat/streaming/");
///     let records = client.post_streaming::<_, Value>(&url, &json!({"text": "hi"}), true).await?;
///     futures::pin_mut!(records);
///     while let Some(record) = records.next().await {
///         println!("{}", record?);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Client<T = ReqwestTransport> {
    transport: T,
    transport_options: TransportOptions<HttpTransport>,
    session: Session,
    malformed_policy: MalformedPolicy,
}

impl Client<ReqwestTransport> {
    /// Create an unauthenticated client talking HTTP through reqwest.
    pub fn new(transport_options: TransportOptions<HttpTransport>) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::new(&transport_options)?;
        Ok(Self::with_transport(transport, transport_options))
    }
}

impl<T: Transport> Client<T> {
    /// Create an unauthenticated client over a custom transport.
    pub fn with_transport(transport: T, transport_options: TransportOptions<HttpTransport>) -> Self {
        Self {
            transport,
            transport_options,
            session: Session::new(),
            malformed_policy: MalformedPolicy::default(),
        }
    }

    /// Replace the session, e.g. with one restored from a saved token.
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    /// Set how streaming calls treat records that fail to parse.
    pub fn with_malformed_policy(mut self, policy: MalformedPolicy) -> Self {
        self.malformed_policy = policy;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_options(&self) -> &TransportOptions<HttpTransport> {
        &self.transport_options
    }

    /// Absolute URL for an endpoint path such as `/chat/user/`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.transport_options.provider.base_url(), path)
    }

    /// Headers for one request; see [`build_headers`].
    pub fn build_headers(&self, require_auth: bool) -> Result<HeaderMap, ClientError> {
        build_headers(&self.session, &self.transport_options.provider, require_auth)
    }

    /// Issue a GET and parse a 200 body as JSON.
    ///
    /// Any other status is returned as [`ClientError::HttpStatus`] without
    /// reading the body.
    pub async fn get_json<R: DeserializeOwned>(&self, url: &str, require_auth: bool) -> Result<R, ClientError> {
        let response = self.dispatch(Method::GET, url, None, require_auth).await?;
        ensure_ok(response.status, ClientError::HttpStatus)?;
        response.json().await
    }

    /// Issue a POST with a JSON body and parse a 200 body as JSON.
    ///
    /// Status handling is the same as [`get_json`](Self::get_json).
    pub async fn post_json<B, R>(&self, url: &str, body: &B, require_auth: bool) -> Result<R, ClientError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        let response = self.dispatch(Method::POST, url, Some(body), require_auth).await?;
        ensure_ok(response.status, ClientError::HttpStatus)?;
        response.json().await
    }

    /// Issue a POST whose 200 body is a newline-delimited record stream.
    ///
    /// Returns once the response head is in; records are then decoded
    /// lazily as chunks arrive. A non-200 status is
    /// [`ClientError::StreamHttpStatus`] and no chunk is read.
    pub async fn post_streaming<B, R>(
        &self,
        url: &str,
        body: &B,
        require_auth: bool,
    ) -> Result<impl Stream<Item = Result<R, ClientError>> + Send + 'static, ClientError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let body = serde_json::to_value(body)?;
        let response = self.dispatch(Method::POST, url, Some(body), require_auth).await?;
        ensure_ok(response.status, ClientError::StreamHttpStatus)?;
        Ok(response.body.records(self.malformed_policy))
    }

    async fn dispatch(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
        require_auth: bool,
    ) -> Result<TransportResponse, ClientError> {
        let headers = self.build_headers(require_auth)?;
        tracing::debug!(%method, url, require_auth, "dispatching request");

        let response = self
            .transport
            .send(TransportRequest {
                method,
                url: url.to_string(),
                headers,
                body,
            })
            .await?;

        tracing::debug!(status = response.status.as_u16(), url, "response received");
        Ok(response)
    }
}

fn ensure_ok(status: StatusCode, error: fn(u16) -> ClientError) -> Result<(), ClientError> {
    if status == StatusCode::OK {
        Ok(())
    } else {
        Err(error(status.as_u16()))
    }
}
