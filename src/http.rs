//! HTTP client utilities for making requests to chat providers.
//!
//! Client construction, extra headers and the status check that runs before
//! a response body is handed to the stream reader.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::client::ClientError;
use crate::options::{HttpTransport, TransportOptions};

/// Build a configured HTTP client from transport options.
///
/// Applies the timeout and proxy. A proxy URL that does not parse is
/// logged and skipped.
pub fn build_http_client(
    transport_options: &TransportOptions<HttpTransport>,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder();

    if let Some(timeout) = transport_options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy_url) = &transport_options.provider.proxy {
        match reqwest::Proxy::all(proxy_url) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(err) => warn!(error = %err, "ignoring invalid proxy url"),
        }
    }

    builder.build()
}

/// Add extra headers to a request if specified in transport options.
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &Option<HashMap<String, String>>,
) -> RequestBuilder {
    if let Some(headers) = extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}

/// Pass a successful response through; turn anything else into an error.
///
/// The body of a failed response is read and handed to `on_error`, which
/// builds the provider-specific error.
pub async fn ensure_success(
    response: Response,
    on_error: fn(StatusCode, &str) -> ClientError,
) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(err) => {
            debug!(error = %err, "failed to read error response body");
            String::new()
        }
    };
    warn!(status = status.as_u16(), "provider rejected request");
    Err(on_error(status, &body))
}
