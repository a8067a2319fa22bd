//! The channel requests travel over.
//!
//! A [`Transport`] turns one [`TransportRequest`] into a status code plus a
//! lazy body of raw byte chunks. The status is known before any chunk is
//! requested, so callers can reject a response without touching its body.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, Stream, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::ClientError;
use crate::http::build_http_client;
use crate::options::{HttpTransport, TransportOptions};

/// Body of a response: chunks in arrival order, ending on connection close.
pub type ChunkStream = BoxStream<'static, Result<Bytes, ClientError>>;

/// One fully described HTTP exchange.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    /// JSON body, sent for POST requests
    pub body: Option<Value>,
}

/// Status plus not-yet-consumed body of a response.
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: ChunkStream,
}

impl TransportResponse {
    pub fn new(
        status: StatusCode,
        body: impl Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
    ) -> Self {
        Self {
            status,
            body: body.boxed(),
        }
    }

    /// Read the whole body and parse it as one JSON document.
    pub async fn json<T: DeserializeOwned>(mut self) -> Result<T, ClientError> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(serde_json::from_slice(&buffer)?)
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Sends requests and hands back streaming responses.
///
/// Implement this trait to route the client over something other than
/// reqwest, e.g. an in-memory channel in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the exchange up to the response head.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, ClientError>;
}

/// [`Transport`] backed by a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build the underlying HTTP client from transport options.
    pub fn new(transport_options: &TransportOptions<HttpTransport>) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_http_client(transport_options)?,
        })
    }

    /// Wrap an already configured HTTP client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, ClientError> {
        let mut req = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);

        if let Some(body) = &request.body {
            req = req.json(body);
        }

        let response = req.send().await?;
        let status = response.status();

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ClientError::from));

        Ok(TransportResponse::new(status, body))
    }
}
