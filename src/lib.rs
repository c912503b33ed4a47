//! Mock Validate
//!
//! Request validation for mocked HTTP endpoints. A handler declares the
//! values it expects in a request's path params, headers, query string,
//! cookies and body; requests that deviate are answered with a structured
//! 400 instead of the mocked response.
//!
//! # Features
//!
//! - **Ordered Rules**: Literal values or predicates keyed by field path
//! - **Lazy Decoding**: Only the request sections a rule reads are built
//! - **Form Bodies**: Multipart and URL-encoded forms decode like query strings
//! - **Invocation Counting**: Dynamic responses see how many calls passed
//! - **YAML Stubs**: Handlers declared in a config file, with templates
//!
//! # Example
//!
//! ```
//! use mock_validate::{define_http_handler, HttpHandlerConfig, Method, MockServer, RuleSet};
//! use mock_validate::request::InterceptedRequest;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let orders = define_http_handler(
//!     HttpHandlerConfig::new(Method::Get, "/customer/:id/orders")
//!         .validate(RuleSet::new().rule("params.id", "1234"))
//!         .returns(json!({"orders": []})),
//! );
//!
//! let mut server = MockServer::new();
//! server.use_handler(orders.handler()).unwrap();
//!
//! let request = InterceptedRequest::get("http://api.test/customer/1/orders").unwrap();
//! let response = server.handle(request).await.unwrap().unwrap();
//! assert_eq!(response.status, 400);
//! assert_eq!(
//!     response.json_body(),
//!     Some(json!({"path": "params.id", "value": "1", "error": "expecting \"1234\""}))
//! );
//! # });
//! ```

pub mod body;
pub mod config;
pub mod error;
pub mod handler;
pub mod path;
pub mod qs;
pub mod request;
pub mod response;
pub mod router;
pub mod rules;
pub mod template;
pub mod validate;

pub use body::RequestBodyType;
pub use config::MockServerConfig;
pub use error::{ConfigError, DecodeError, MockError};
pub use handler::{
    define_http_handler, HandlerFactory, HttpHandlerConfig, InvocationInfo, Method, MockHandler,
    Reply, ResponseSpec,
};
pub use response::MockResponse;
pub use router::MockServer;
pub use rules::{Rule, RuleSet, Verdict};
pub use validate::{Failure, Rejection};
