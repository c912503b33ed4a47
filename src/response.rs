//! Responses emitted by mocked handlers.

use serde_json::Value;

/// A fully formed HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers, in insertion order
    pub headers: Vec<(String, String)>,
    /// Raw body
    pub body: Vec<u8>,
}

impl MockResponse {
    /// Empty response with the given status.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// JSON response with status 200.
    pub fn json(value: &Value) -> Self {
        Self::status(200)
            .with_header("Content-Type", "application/json")
            .with_body(value.to_string())
    }

    /// Plain text response with status 200.
    pub fn text(body: impl Into<String>) -> Self {
        Self::status(200)
            .with_header("Content-Type", "text/plain")
            .with_body(body.into())
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Add a header, replacing an existing one with the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body parsed as JSON, if it is JSON.
    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// Body as UTF-8 text (lossy).
    pub fn text_body(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_response() {
        let response = MockResponse::json(&json!({"success": true}));
        assert_eq!(response.status, 200);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.json_body(), Some(json!({"success": true})));
    }

    #[test]
    fn test_header_replacement() {
        let response = MockResponse::text("hi")
            .with_header("content-type", "text/html")
            .with_status(201);
        assert_eq!(response.headers.len(), 1);
        assert_eq!(response.header("Content-Type"), Some("text/html"));
        assert_eq!(response.status, 201);
        assert_eq!(response.text_body(), "hi");
    }
}
