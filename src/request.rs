//! Intercepted requests and the per-request data view.
//!
//! The interception layer hands over an [`InterceptedRequest`] plus the route
//! params and cookies it parsed ([`RequestInfo`]). [`RequestView::assemble`]
//! turns that into the five-section structure rules are evaluated against,
//! materializing only the sections the rule set actually reads.

use crate::body::{decode_body, RequestBodyType};
use crate::error::{DecodeError, MockError};
use crate::path::{resolve_segments, FieldPath};
use crate::qs;
use crate::rules::{RuleSet, Section};
use bytes::Bytes;
use serde_json::{Map, Value};
use url::Url;

/// An already-parsed HTTP request.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    method: String,
    url: Url,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl InterceptedRequest {
    pub fn new(method: &str, url: &str) -> Result<Self, MockError> {
        let url = Url::parse(url).map_err(|source| MockError::Url {
            url: url.to_string(),
            source,
        })?;
        Ok(Self {
            method: method.to_ascii_uppercase(),
            url,
            headers: Vec::new(),
            body: Bytes::new(),
        })
    }

    pub fn get(url: &str) -> Result<Self, MockError> {
        Self::new("GET", url)
    }

    pub fn post(url: &str) -> Result<Self, MockError> {
        Self::new("POST", url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// JSON body with a matching content type.
    pub fn with_json(self, value: &Value) -> Self {
        self.with_header("Content-Type", "application/json")
            .with_body(value.to_string())
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Headers keyed by lower-cased name; repeats are joined with `", "`.
    pub fn header_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for (name, value) in &self.headers {
            let name = name.to_ascii_lowercase();
            match map.get_mut(&name) {
                Some(Value::String(existing)) => {
                    existing.push_str(", ");
                    existing.push_str(value);
                }
                _ => {
                    map.insert(name, Value::String(value.clone()));
                }
            }
        }
        map
    }

    /// Cookies from every `Cookie` header; the first occurrence of a name wins.
    pub fn cookie_map(&self) -> Map<String, Value> {
        let mut cookies = Map::new();
        let pairs = self
            .headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("cookie"))
            .flat_map(|(_, v)| v.split(';'));

        for pair in pairs {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() || cookies.contains_key(name) {
                continue;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            cookies.insert(name.to_string(), Value::String(decode_component(value)));
        }
        cookies
    }

    /// Query string decoded into nested form.
    pub fn query_value(&self) -> Value {
        qs::parse_query(self.url.query().unwrap_or_default())
    }
}

/// Percent-decode a path segment or cookie value, keeping the raw text when
/// the result is not UTF-8.
pub fn decode_component(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// What the interception layer passes to a resolver.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub request: InterceptedRequest,
    /// Route parameters captured from the URL pattern
    pub params: Map<String, Value>,
    pub cookies: Map<String, Value>,
}

impl RequestInfo {
    pub fn new(request: InterceptedRequest, params: Map<String, Value>) -> Self {
        let cookies = request.cookie_map();
        Self {
            request,
            params,
            cookies,
        }
    }
}

/// The sections of one request that some rule reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestView {
    pub params: Option<Value>,
    pub headers: Option<Value>,
    pub query: Option<Value>,
    pub cookies: Option<Value>,
    pub body: Option<Value>,
}

impl RequestView {
    /// Build the view, computing each referenced section exactly once.
    ///
    /// The body is decoded from a shared handle, never consumed.
    pub async fn assemble(
        info: &RequestInfo,
        rules: &RuleSet,
        body_type: RequestBodyType,
    ) -> Result<Self, DecodeError> {
        let wants = |section| rules.references(section);
        let request = &info.request;

        let body = if wants(Section::Body) {
            let value = decode_body(request.body(), request.header("content-type"), body_type).await?;
            Some(value)
        } else {
            None
        };

        Ok(Self {
            params: wants(Section::Params).then(|| Value::Object(info.params.clone())),
            headers: wants(Section::Headers).then(|| Value::Object(request.header_map())),
            query: wants(Section::Query).then(|| request.query_value()),
            cookies: wants(Section::Cookies).then(|| Value::Object(info.cookies.clone())),
            body,
        })
    }

    pub fn section(&self, section: Section) -> Option<&Value> {
        match section {
            Section::Params => self.params.as_ref(),
            Section::Headers => self.headers.as_ref(),
            Section::Query => self.query.as_ref(),
            Section::Cookies => self.cookies.as_ref(),
            Section::Body => self.body.as_ref(),
        }
    }

    /// Resolve a rule path; the first segment names the section.
    pub fn resolve(&self, path: &FieldPath) -> Option<&Value> {
        let section = path.head().and_then(Section::from_name)?;
        let root = self.section(section)?;
        resolve_segments(root, &path.segments()[1..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{defined, Rule};
    use serde_json::json;

    fn info(request: InterceptedRequest) -> RequestInfo {
        let mut params = Map::new();
        params.insert("id".into(), json!("1234"));
        RequestInfo::new(request, params)
    }

    #[test]
    fn test_header_map_lowercases_and_joins() {
        let request = InterceptedRequest::get("http://mock.test/orders")
            .unwrap()
            .with_header("User-Agent", "googlebot")
            .with_header("Accept", "text/html")
            .with_header("accept", "application/json");

        assert_eq!(
            Value::Object(request.header_map()),
            json!({"user-agent": "googlebot", "accept": "text/html, application/json"})
        );
    }

    #[test]
    fn test_cookie_map() {
        let request = InterceptedRequest::get("http://mock.test/orders")
            .unwrap()
            .with_header("Cookie", "promo=50PCT;admin=1; quoted=\"x y\"; junk")
            .with_header("cookie", "promo=SALE");

        assert_eq!(
            Value::Object(request.cookie_map()),
            json!({"promo": "50PCT", "admin": "1", "quoted": "x y"})
        );
    }

    #[test]
    fn test_cookie_values_are_percent_decoded() {
        let request = InterceptedRequest::get("http://mock.test/orders")
            .unwrap()
            .with_header("Cookie", "promo=50%25; name=Jos%C3%A9; bad=%FF; plus=a+b");

        assert_eq!(
            Value::Object(request.cookie_map()),
            json!({"promo": "50%", "name": "José", "bad": "%FF", "plus": "a+b"})
        );
    }

    #[tokio::test]
    async fn test_only_referenced_sections_are_built() {
        let request = InterceptedRequest::post("http://mock.test/orders?limit=5&customer[id]=7")
            .unwrap()
            .with_header("Cookie", "promo=SALE")
            .with_body("this is not json");
        let rules = RuleSet::new()
            .rule("query.limit", "5")
            .rule("cookies", defined());

        let view = RequestView::assemble(&info(request), &rules, RequestBodyType::Json)
            .await
            .unwrap();

        assert_eq!(view.query, Some(json!({"limit": "5", "customer": {"id": "7"}})));
        assert_eq!(view.cookies, Some(json!({"promo": "SALE"})));
        assert!(view.params.is_none());
        assert!(view.headers.is_none());
        // The body is never parsed, so the malformed payload is not an error.
        assert!(view.body.is_none());
    }

    #[tokio::test]
    async fn test_body_decode_error_propagates() {
        let request = InterceptedRequest::post("http://mock.test/orders")
            .unwrap()
            .with_body("{broken");
        let rules = RuleSet::new().rule("body.total", Rule::absent());

        let err = RequestView::assemble(&info(request), &rules, RequestBodyType::Json)
            .await
            .unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[tokio::test]
    async fn test_resolve_against_view() {
        let request = InterceptedRequest::post("http://mock.test/orders")
            .unwrap()
            .with_json(&json!({"items": ["5678", "1234"]}));
        let rules = RuleSet::new().rule("body.items[0]", "1234").rule("params.id", "1");

        let info = info(request);
        let view = RequestView::assemble(&info, &rules, RequestBodyType::Json)
            .await
            .unwrap();

        assert_eq!(view.resolve(&FieldPath::parse("body.items[0]")), Some(&json!("5678")));
        assert_eq!(view.resolve(&FieldPath::parse("params")), Some(&json!({"id": "1234"})));
        assert_eq!(view.resolve(&FieldPath::parse("headers")), None);
        assert_eq!(view.resolve(&FieldPath::parse("session.id")), None);
        // The request body is still intact for later readers.
        assert_eq!(
            serde_json::from_slice::<Value>(info.request.body()).unwrap(),
            json!({"items": ["5678", "1234"]})
        );
    }
}
