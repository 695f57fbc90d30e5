//! HTTP Response representation for handlers

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Header marking a body that was base64-encoded for transport
pub const BINARY_RESPONSE_HEADER: &str = "X-Binary-Response";

/// Represents an outgoing HTTP response.
///
/// # Quick Reference
///
/// | Method | Status | Use Case |
/// |--------|--------|----------|
/// | `ok(body)` | 200 | Successful JSON response |
/// | `text(status, body)` | any | Plain text |
/// | `html(status, body)` | any | HTML page |
/// | `binary(status, bytes, type)` | any | Files, images |
/// | `redirect(status, location)` | 3xx | Redirects |
/// | `not_found()` | 404 | Resource not found |
/// | `internal_error(msg)` | 500 | Server error |
/// | `service_unavailable(msg)` | 503 | Module not available |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// HTTP status code
    pub status: u16,

    /// Response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Response body
    #[serde(default)]
    pub body: Option<String>,
}

impl Response {
    /// Create a new response with the given status code (no body).
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Create a 200 OK response with JSON body.
    ///
    /// # Example
    /// ```ignore
    /// Response::ok(json!({"message": "Success"}))
    /// ```
    pub fn ok<T: Serialize>(body: T) -> Self {
        Self::json(200, body)
    }

    /// Create a JSON response with a custom status code.
    pub fn json<T: Serialize>(status: u16, body: T) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: serde_json::to_string(&body).ok(),
        }
        .with_header("Content-Type", "application/json")
    }

    /// Create a plain text response.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_body(body)
    }

    /// Create an HTML response.
    pub fn html(status: u16, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_header("Content-Type", "text/html; charset=utf-8")
            .with_body(body)
    }

    /// Create a binary response (for files, images, etc.).
    ///
    /// The data is base64-encoded so it can travel in the string body.
    /// The host decodes it before writing to the client.
    ///
    /// # Example
    /// ```ignore
    /// Response::binary(200, image_bytes, "image/png")
    /// ```
    pub fn binary(status: u16, data: impl AsRef<[u8]>, content_type: impl Into<String>) -> Self {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(data.as_ref());

        Self::new(status)
            .with_header("Content-Type", content_type)
            .with_header(BINARY_RESPONSE_HEADER, "base64")
            .with_body(encoded)
    }

    /// Create a redirect response.
    ///
    /// # Example
    /// ```ignore
    /// Response::redirect(303, "https://example.com/new-location")
    /// ```
    pub fn redirect(status: u16, location: impl Into<String>) -> Self {
        Self::new(status).with_header("Location", location)
    }

    /// Create a 404 Not Found response.
    pub fn not_found() -> Self {
        Self::json(404, serde_json::json!({"error": "Not Found"}))
    }

    /// Create a 500 Internal Server Error response.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::json(500, serde_json::json!({"error": message.into()}))
    }

    /// Create a 503 Service Unavailable response.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::json(503, serde_json::json!({"error": message.into()}))
    }

    /// Create a 504 Gateway Timeout response.
    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::json(504, serde_json::json!({"error": message.into()}))
    }

    /// Add a header to the response (builder pattern).
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the body (builder pattern).
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Whether the body carries base64-encoded binary data
    pub fn is_binary(&self) -> bool {
        self.headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case(BINARY_RESPONSE_HEADER) && v == "base64")
    }

    /// The body as raw bytes, undoing the binary transport encoding.
    ///
    /// Returns `None` when a binary body is not valid base64.
    pub fn decoded_body(&self) -> Option<Vec<u8>> {
        let body = match &self.body {
            Some(body) => body,
            None => return Some(Vec::new()),
        };

        if self.is_binary() {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD.decode(body).ok()
        } else {
            Some(body.as_bytes().to_vec())
        }
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(200)
    }
}
