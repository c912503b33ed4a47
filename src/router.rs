//! Request interception.
//!
//! A minimal route table standing in for the host interception layer: it
//! matches method and URL pattern, extracts path params and cookies, and
//! hands the request to the registered [`Resolver`].

use crate::error::{ConfigError, DecodeError, MockError};
use crate::handler::{Method, MockHandler};
use crate::request::{decode_component, InterceptedRequest, RequestInfo};
use crate::response::MockResponse;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Produces the response for a matched request.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, info: &RequestInfo) -> Result<MockResponse, DecodeError>;
}

/// A compiled URL pattern such as `/orders/:id/:action`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPattern {
    /// Origin the request must come from, for absolute patterns
    origin: Option<String>,
    segments: Vec<PatternSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    Literal(String),
    Param(String),
    /// `*`, matching the rest of the path
    Wildcard,
}

impl UrlPattern {
    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        let (origin, path) = if pattern.starts_with("http://") || pattern.starts_with("https://") {
            let url = Url::parse(pattern)
                .map_err(|_| ConfigError::InvalidPattern(pattern.to_string()))?;
            (Some(url.origin().ascii_serialization()), url.path().to_string())
        } else {
            (None, pattern.to_string())
        };

        let mut segments = Vec::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            let segment = if part == "*" {
                PatternSegment::Wildcard
            } else if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() {
                    return Err(ConfigError::InvalidPattern(pattern.to_string()));
                }
                PatternSegment::Param(name.to_string())
            } else {
                PatternSegment::Literal(part.to_string())
            };
            segments.push(segment);
        }

        Ok(Self { origin, segments })
    }

    /// Match a request URL, returning captured params.
    pub fn matches(&self, url: &Url) -> Option<Map<String, Value>> {
        if let Some(origin) = &self.origin {
            if *origin != url.origin().ascii_serialization() {
                return None;
            }
        }

        let mut params = Map::new();
        let mut parts = url.path().split('/').filter(|p| !p.is_empty());

        for segment in &self.segments {
            match segment {
                PatternSegment::Wildcard => return Some(params),
                PatternSegment::Literal(literal) => {
                    if parts.next()? != literal {
                        return None;
                    }
                }
                PatternSegment::Param(name) => {
                    let value = parts.next()?;
                    params.insert(name.clone(), Value::String(decode_component(value)));
                }
            }
        }

        // Must consume entire path
        if parts.next().is_none() {
            Some(params)
        } else {
            None
        }
    }
}

struct Route {
    method: Method,
    pattern: UrlPattern,
    resolver: Arc<dyn Resolver>,
}

/// Routes requests to mocked handlers.
pub struct MockServer {
    /// Newest registration first
    routes: Vec<Route>,
    log_matches: bool,
    log_unhandled: bool,
    requests_total: AtomicU64,
    requests_handled: AtomicU64,
    requests_unhandled: AtomicU64,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            log_matches: true,
            log_unhandled: true,
            requests_total: AtomicU64::new(0),
            requests_handled: AtomicU64::new(0),
            requests_unhandled: AtomicU64::new(0),
        }
    }

    pub fn with_logging(mut self, log_matches: bool, log_unhandled: bool) -> Self {
        self.log_matches = log_matches;
        self.log_unhandled = log_unhandled;
        self
    }

    /// Register a handler ahead of everything registered before it.
    pub fn use_handler(&mut self, handler: MockHandler) -> Result<(), ConfigError> {
        let method = handler.method();
        let pattern = UrlPattern::parse(handler.url())?;
        self.use_route(method, pattern, Arc::new(handler));
        Ok(())
    }

    pub fn use_route(&mut self, method: Method, pattern: UrlPattern, resolver: Arc<dyn Resolver>) {
        self.routes.insert(
            0,
            Route {
                method,
                pattern,
                resolver,
            },
        );
    }

    /// Drop every registered route.
    pub fn reset_handlers(&mut self) {
        self.routes.clear();
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Dispatch a request; `Ok(None)` when no route matches.
    pub async fn handle(&self, request: InterceptedRequest) -> Result<Option<MockResponse>, MockError> {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        let matched = self.routes.iter().find_map(|route| {
            if !route.method.matches(request.method()) {
                return None;
            }
            route.pattern.matches(request.url()).map(|params| (route, params))
        });

        let Some((route, params)) = matched else {
            self.requests_unhandled.fetch_add(1, Ordering::Relaxed);
            if self.log_unhandled {
                warn!(
                    method = %request.method(),
                    url = %request.url(),
                    "No matching handler found"
                );
            }
            return Ok(None);
        };

        self.requests_handled.fetch_add(1, Ordering::Relaxed);
        let info = RequestInfo::new(request, params);
        let response = route.resolver.resolve(&info).await?;

        if self.log_matches {
            info!(
                method = %info.request.method(),
                url = %info.request.url(),
                status = response.status,
                "Request handled"
            );
        }

        Ok(Some(response))
    }

    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn total_handled(&self) -> u64 {
        self.requests_handled.load(Ordering::Relaxed)
    }

    pub fn total_unhandled(&self) -> u64 {
        self.requests_unhandled.load(Ordering::Relaxed)
    }
}
