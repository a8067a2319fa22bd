//! HTTP client utilities.
//!
//! This module provides reqwest client construction and the header
//! building shared by every request the facade dispatches.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use std::collections::HashMap;

use crate::client::ClientError;
use crate::options::{HttpTransport, TransportOptions};
use crate::session::Session;

/// Build a configured HTTP client from transport options.
///
/// This applies common configuration like timeouts and proxies.
///
/// # Example
/// ```ignore
/// let client = build_http_client(&transport_options)?;
/// ```
pub fn build_http_client(
    transport_options: &TransportOptions<HttpTransport>,
) -> Result<reqwest::Client, ClientError> {
    let mut builder = reqwest::Client::builder();

    if let Some(timeout) = transport_options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy_url) = &transport_options.provider.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ClientError::Config(format!("invalid proxy URL {}: {}", proxy_url, e)))?;
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}

/// Build the header set for one request.
///
/// Content type and client identity are always present. When
/// `require_auth` is set and the session holds no token this fails with
/// [`ClientError::NotAuthenticated`]; otherwise a present token is attached
/// as `Authorization: Token <token>`.
pub fn build_headers(
    session: &Session,
    transport: &HttpTransport,
    require_auth: bool,
) -> Result<HeaderMap, ClientError> {
    if require_auth && !session.is_authenticated() {
        return Err(ClientError::NotAuthenticated);
    }

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, header_value(transport.user_agent())?);

    add_extra_headers(&mut headers, &transport.extra_headers)?;

    if let Some(token) = session.token() {
        let mut value = header_value(&format!("Token {}", token.expose_secret()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    Ok(headers)
}

/// Add extra headers to a header set if specified in transport options.
///
/// # Example
/// ```ignore
/// add_extra_headers(&mut headers, &transport_options.provider.extra_headers)?;
/// ```
pub fn add_extra_headers(
    headers: &mut HeaderMap,
    extra_headers: &Option<HashMap<String, String>>,
) -> Result<(), ClientError> {
    if let Some(extra) = extra_headers {
        for (key, value) in extra {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| ClientError::InvalidHeader(key.clone()))?;
            headers.insert(name, header_value(value)?);
        }
    }
    Ok(())
}

fn header_value(value: &str) -> Result<HeaderValue, ClientError> {
    // Never echo the value back: it may be a token.
    HeaderValue::from_str(value)
        .map_err(|_| ClientError::InvalidHeader("header value contains illegal characters".to_string()))
}
