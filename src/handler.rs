//! Mocked handlers.
//!
//! [`define_http_handler`] turns a configuration into a [`HandlerFactory`].
//! Each call to [`HandlerFactory::handler`] yields a fresh [`MockHandler`]
//! with its own invocation counter, ready to be registered with the
//! interception layer.

use crate::body::RequestBodyType;
use crate::error::{ConfigError, DecodeError};
use crate::request::{InterceptedRequest, RequestInfo, RequestView};
use crate::response::MockResponse;
use crate::router::{Resolver, UrlPattern};
use crate::rules::RuleSet;
use crate::validate::validate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// HTTP method a handler answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Any method
    All,
    Head,
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::All => "ALL",
            Method::Head => "HEAD",
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Options => "OPTIONS",
        }
    }

    pub fn matches(self, method: &str) -> bool {
        self == Method::All || self.as_str().eq_ignore_ascii_case(method)
    }
}

impl FromStr for Method {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ALL" => Ok(Method::All),
            "HEAD" => Ok(Method::Head),
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "OPTIONS" => Ok(Method::Options),
            _ => Err(ConfigError::UnknownMethod(s.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a dynamic response builder sees.
#[derive(Debug, Clone, Copy)]
pub struct InvocationInfo<'a> {
    pub request: &'a InterceptedRequest,
    pub params: &'a Map<String, Value>,
    pub cookies: &'a Map<String, Value>,
    /// 1 for the first request that passed validation
    pub invocation: u64,
}

/// Result of a dynamic response builder.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Sent as a 200 JSON response
    Json(Value),
    /// Sent unchanged
    Response(MockResponse),
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Json(value)
    }
}

impl From<MockResponse> for Reply {
    fn from(response: MockResponse) -> Self {
        Reply::Response(response)
    }
}

pub type ReplyFn = Arc<dyn Fn(&InvocationInfo<'_>) -> Reply + Send + Sync>;

/// The response a handler sends once validation passes.
#[derive(Clone)]
pub enum ResponseSpec {
    Json(Value),
    Response(MockResponse),
    Dynamic(ReplyFn),
}

impl ResponseSpec {
    pub fn dynamic<F, R>(build: F) -> Self
    where
        F: Fn(&InvocationInfo<'_>) -> R + Send + Sync + 'static,
        R: Into<Reply>,
    {
        ResponseSpec::Dynamic(Arc::new(move |info: &InvocationInfo<'_>| -> Reply {
            build(info).into()
        }))
    }

    fn resolve(&self, info: &InvocationInfo<'_>) -> MockResponse {
        let reply = match self {
            ResponseSpec::Json(value) => return MockResponse::json(value),
            ResponseSpec::Response(response) => return response.clone(),
            ResponseSpec::Dynamic(build) => build(info),
        };
        match reply {
            Reply::Json(value) => MockResponse::json(&value),
            Reply::Response(response) => response,
        }
    }
}

impl fmt::Debug for ResponseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseSpec::Json(value) => f.debug_tuple("Json").field(value).finish(),
            ResponseSpec::Response(response) => f.debug_tuple("Response").field(response).finish(),
            ResponseSpec::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<Value> for ResponseSpec {
    fn from(value: Value) -> Self {
        ResponseSpec::Json(value)
    }
}

impl From<MockResponse> for ResponseSpec {
    fn from(response: MockResponse) -> Self {
        ResponseSpec::Response(response)
    }
}

/// Everything needed to mock one endpoint.
#[derive(Debug, Clone)]
pub struct HttpHandlerConfig {
    pub method: Method,
    /// URL pattern, absolute or path-only (`/orders/:id`)
    pub url: String,
    pub request_body_type: RequestBodyType,
    pub validate: RuleSet,
    pub returns: ResponseSpec,
}

impl HttpHandlerConfig {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            request_body_type: RequestBodyType::default(),
            validate: RuleSet::new(),
            returns: ResponseSpec::Json(Value::Null),
        }
    }

    pub fn request_body_type(mut self, body_type: RequestBodyType) -> Self {
        self.request_body_type = body_type;
        self
    }

    pub fn validate(mut self, rules: RuleSet) -> Self {
        self.validate = rules;
        self
    }

    pub fn returns(mut self, returns: impl Into<ResponseSpec>) -> Self {
        self.returns = returns.into();
        self
    }

    /// Check rule keys and the URL pattern.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate.validate()?;
        UrlPattern::parse(&self.url)?;
        Ok(())
    }
}

/// Produces independent handlers from one configuration.
#[derive(Debug, Clone)]
pub struct HandlerFactory {
    config: Arc<HttpHandlerConfig>,
}

/// Define a mocked endpoint.
///
/// ```
/// use mock_validate::{define_http_handler, HttpHandlerConfig, Method, RuleSet};
/// use serde_json::json;
///
/// let factory = define_http_handler(
///     HttpHandlerConfig::new(Method::Get, "/customer/:id/orders")
///         .validate(RuleSet::new().rule("params.id", "1234"))
///         .returns(json!({"orders": []})),
/// );
/// let handler = factory.handler();
/// assert_eq!(handler.invocations(), 0);
/// ```
pub fn define_http_handler(config: HttpHandlerConfig) -> HandlerFactory {
    HandlerFactory {
        config: Arc::new(config),
    }
}

impl HandlerFactory {
    /// A new handler whose invocation count starts at zero.
    pub fn handler(&self) -> MockHandler {
        MockHandler {
            config: Arc::clone(&self.config),
            invocations: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &HttpHandlerConfig {
        &self.config
    }
}

/// One registration of a mocked endpoint.
#[derive(Debug, Clone)]
pub struct MockHandler {
    config: Arc<HttpHandlerConfig>,
    invocations: Arc<AtomicU64>,
}

impl MockHandler {
    pub fn method(&self) -> Method {
        self.config.method
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Requests that passed validation so far.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Validate the request and build the response.
    pub async fn respond(&self, info: &RequestInfo) -> Result<MockResponse, DecodeError> {
        let config = &self.config;
        let view = RequestView::assemble(info, &config.validate, config.request_body_type).await?;

        if let Err(failure) = validate(&view, &config.validate) {
            return Ok(failure.into());
        }

        let invocation = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            method = %config.method,
            url = %config.url,
            invocation,
            "Request passed validation"
        );

        Ok(config.returns.resolve(&InvocationInfo {
            request: &info.request,
            params: &info.params,
            cookies: &info.cookies,
            invocation,
        }))
    }
}

#[async_trait]
impl Resolver for MockHandler {
    async fn resolve(&self, info: &RequestInfo) -> Result<MockResponse, DecodeError> {
        self.respond(info).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{defined, Rule};
    use serde_json::json;

    fn request_info(request: InterceptedRequest, params: Value) -> RequestInfo {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        RequestInfo::new(request, params)
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<Method>(), Ok(Method::Get));
        assert_eq!("ALL".parse::<Method>(), Ok(Method::All));
        assert_eq!(
            "FETCH".parse::<Method>(),
            Err(ConfigError::UnknownMethod("FETCH".into()))
        );
        assert!(Method::All.matches("DELETE"));
        assert!(Method::Post.matches("post"));
        assert!(!Method::Post.matches("GET"));
    }

    #[test]
    fn test_config_check() {
        let config = HttpHandlerConfig::new(Method::Get, "/orders")
            .validate(RuleSet::new().rule("headers.authorization", defined()));
        assert!(config.check().is_ok());

        let config = config.validate(RuleSet::new().rule("session", defined()));
        assert_eq!(config.check(), Err(ConfigError::UnknownSection("session".into())));
    }

    #[tokio::test]
    async fn test_success_returns_json() {
        let handler = define_http_handler(
            HttpHandlerConfig::new(Method::Get, "/orders")
                .validate(RuleSet::new().rule("cookies.promo", "SALE"))
                .returns(json!({"success": true})),
        )
        .handler();

        let request = InterceptedRequest::get("http://mock.test/orders")
            .unwrap()
            .with_header("Cookie", "promo=SALE");
        let response = handler.respond(&request_info(request, json!({}))).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.json_body(), Some(json!({"success": true})));
        assert_eq!(handler.invocations(), 1);
    }

    #[tokio::test]
    async fn test_rejection_does_not_count() {
        let handler = define_http_handler(
            HttpHandlerConfig::new(Method::Get, "/orders")
                .validate(RuleSet::new().rule("cookies.admin", Rule::absent()))
                .returns(json!({"success": true})),
        )
        .handler();

        let request = InterceptedRequest::get("http://mock.test/orders")
            .unwrap()
            .with_header("Cookie", "admin=1");
        let response = handler.respond(&request_info(request, json!({}))).await.unwrap();

        assert_eq!(response.status, 400);
        assert_eq!(
            response.json_body(),
            Some(json!({"path": "cookies.admin", "value": "1", "error": "expecting undefined"}))
        );
        assert_eq!(handler.invocations(), 0);
    }

    #[tokio::test]
    async fn test_static_response_is_sent_unchanged() {
        let teapot = MockResponse::text("short and stout").with_status(418);
        let handler = define_http_handler(
            HttpHandlerConfig::new(Method::Get, "/teapot").returns(teapot.clone()),
        )
        .handler();

        let request = InterceptedRequest::get("http://mock.test/teapot").unwrap();
        let response = handler.respond(&request_info(request, json!({}))).await.unwrap();
        assert_eq!(response, teapot);
    }

    #[tokio::test]
    async fn test_dynamic_response_per_invocation() {
        let factory = define_http_handler(
            HttpHandlerConfig::new(Method::Get, "/test/:id").returns(ResponseSpec::dynamic(
                |info: &InvocationInfo<'_>| {
                    let body = json!({"id": info.params["id"], "invocation": info.invocation});
                    if info.invocation == 1 {
                        Reply::Json(body)
                    } else {
                        Reply::Response(MockResponse::json(&body).with_header("X-Invocation", "explicit"))
                    }
                },
            )),
        );
        let handler = factory.handler();

        let first = handler
            .respond(&request_info(
                InterceptedRequest::get("http://mock.test/test/1234").unwrap(),
                json!({"id": "1234"}),
            ))
            .await
            .unwrap();
        assert_eq!(first.status, 200);
        assert_eq!(first.json_body(), Some(json!({"id": "1234", "invocation": 1})));
        assert_eq!(first.header("x-invocation"), None);

        let second = handler
            .respond(&request_info(
                InterceptedRequest::get("http://mock.test/test/5678").unwrap(),
                json!({"id": "5678"}),
            ))
            .await
            .unwrap();
        assert_eq!(second.status, 200);
        assert_eq!(second.json_body(), Some(json!({"id": "5678", "invocation": 2})));
        assert_eq!(second.header("x-invocation"), Some("explicit"));

        // A fresh registration counts from the start again.
        let again = factory.handler();
        let response = again
            .respond(&request_info(
                InterceptedRequest::get("http://mock.test/test/9").unwrap(),
                json!({"id": "9"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.json_body(), Some(json!({"id": "9", "invocation": 1})));
        assert_eq!(handler.invocations(), 2);
    }

    #[tokio::test]
    async fn test_counter_under_concurrent_dispatch() {
        let handler = define_http_handler(
            HttpHandlerConfig::new(Method::Get, "/count").returns(ResponseSpec::dynamic(
                |info: &InvocationInfo<'_>| json!(info.invocation),
            )),
        )
        .handler();

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let handler = handler.clone();
            tasks.push(tokio::spawn(async move {
                let request = InterceptedRequest::get("http://mock.test/count").unwrap();
                let response = handler.respond(&RequestInfo::new(request, Map::new())).await.unwrap();
                response.json_body().and_then(|v| v.as_u64()).unwrap()
            }));
        }

        let mut seen = Vec::new();
        for task in tasks {
            seen.push(task.await.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=32).collect::<Vec<u64>>());
        assert_eq!(handler.invocations(), 32);
    }

    #[tokio::test]
    async fn test_decode_error_is_not_a_rejection() {
        let handler = define_http_handler(
            HttpHandlerConfig::new(Method::Post, "/orders")
                .validate(RuleSet::new().rule("body.total", "42")),
        )
        .handler();

        let request = InterceptedRequest::post("http://mock.test/orders")
            .unwrap()
            .with_body("total=42");
        let err = handler.respond(&request_info(request, json!({}))).await.unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
        assert_eq!(handler.invocations(), 0);
    }
}
