//! HTTP Request representation for handlers

use crate::error::HandlerError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Represents an inbound HTTP request as delivered to a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// HTTP method (GET, POST, PUT, DELETE, etc.)
    pub method: String,

    /// Request path (e.g., "/items/123")
    pub path: String,

    /// Query parameters
    #[serde(default)]
    pub query: HashMap<String, String>,

    /// HTTP headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request body
    #[serde(default)]
    pub body: Option<String>,

    /// Request ID for tracing
    #[serde(default)]
    pub request_id: String,
}

impl Request {
    /// Create a request with the given method and path.
    ///
    /// # Example
    /// ```ignore
    /// let req = Request::new("POST", "/items").with_body(r#"{"name":"x"}"#);
    /// ```
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Set a header (builder pattern).
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the body (builder pattern).
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Parse the body as JSON into a typed struct.
    ///
    /// # Example
    /// ```ignore
    /// #[derive(Deserialize)]
    /// struct CreateUser { name: String, email: String }
    ///
    /// let user: CreateUser = req.json()?;
    /// ```
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, HandlerError> {
        Ok(serde_json::from_str(self.body.as_deref().unwrap_or("null"))?)
    }

    /// Get a query parameter as a string reference.
    pub fn query_param(&self, key: &str) -> Option<&String> {
        self.query.get(key)
    }

    /// Get a query parameter parsed as a specific type.
    /// Returns None if the parameter doesn't exist or can't be parsed.
    ///
    /// # Example
    /// ```ignore
    /// // URL: /items?page=2
    /// let page: i64 = req.query_param_as("page").unwrap_or(1);
    /// ```
    pub fn query_param_as<T: FromStr>(&self, key: &str) -> Option<T> {
        self.query.get(key).and_then(|v| v.parse().ok())
    }

    /// Get a header value (case-insensitive lookup).
    pub fn header(&self, key: &str) -> Option<&String> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// Check if request method matches (case-insensitive).
    pub fn is_method(&self, method: &str) -> bool {
        self.method.eq_ignore_ascii_case(method)
    }

    /// Get the raw body as bytes.
    pub fn body_bytes(&self) -> Vec<u8> {
        self.body.as_ref()
            .map(|b| b.as_bytes().to_vec())
            .unwrap_or_default()
    }

    /// Get the Content-Type header value.
    pub fn content_type(&self) -> Option<&String> {
        self.header("Content-Type")
    }
}

impl Default for Request {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            path: "/".to_string(),
            query: HashMap::new(),
            headers: HashMap::new(),
            body: None,
            request_id: String::new(),
        }
    }
}
