//! Configuration for file-defined mock handlers.
//!
//! Defines stubs (method, URL pattern, ordered validation rules and the
//! response to send) and server-wide settings.

use crate::body::RequestBodyType;
use crate::error::ConfigError;
use crate::handler::{define_http_handler, HttpHandlerConfig, InvocationInfo, Method, ResponseSpec};
use crate::response::MockResponse;
use crate::router::{MockServer, UrlPattern};
use crate::rules::{self, equals, PredicateFn, Rule, RuleSet, Verdict};
use crate::template::{TemplateContext, TemplateEngine};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockServerConfig {
    /// List of stub definitions
    #[serde(default)]
    pub stubs: Vec<StubDefinition>,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl MockServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for (i, stub) in self.stubs.iter().enumerate() {
            stub.validate()
                .map_err(|e| anyhow::anyhow!("Stub {}: {}", i, e))?;
            if !seen.insert(stub.id.as_str()) {
                anyhow::bail!("Stub {}: duplicate id `{}`", i, stub.id);
            }
        }
        Ok(())
    }

    /// Build a server with one handler per stub.
    ///
    /// Earlier stubs take precedence over later ones.
    pub fn build_server(&self) -> anyhow::Result<MockServer> {
        let engine = Arc::new(TemplateEngine::new());
        let mut server = MockServer::new()
            .with_logging(self.settings.log_matches, self.settings.log_unmatched);

        for stub in self.stubs.iter().rev() {
            let config = stub.to_handler_config(Arc::clone(&engine))?;
            config.check()?;
            server.use_handler(define_http_handler(config).handler())?;
        }
        Ok(server)
    }
}

/// A single stub definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StubDefinition {
    /// Unique identifier for this stub
    pub id: String,

    /// Optional name/description
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_method")]
    pub method: Method,

    /// URL pattern, relative (`/orders/:id`) or absolute
    pub url: String,

    #[serde(default)]
    pub request_body_type: RequestBodyType,

    /// Rules, checked in the order written
    #[serde(default)]
    pub validate: RuleDefinitions,

    #[serde(default)]
    pub response: ResponseDefinition,
}

fn default_method() -> Method {
    Method::All
}

impl StubDefinition {
    /// Validate the stub definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.id.is_empty() {
            anyhow::bail!("Stub id cannot be empty");
        }
        UrlPattern::parse(&self.url)?;
        self.rule_set()?.validate()?;
        self.response.validate()?;
        Ok(())
    }

    pub fn rule_set(&self) -> anyhow::Result<RuleSet> {
        let mut rules = RuleSet::new();
        for (key, definition) in self.validate.iter() {
            if let RuleDefinition::Check(CheckDefinition { status: Some(status), .. }) = definition {
                check_status(*status)?;
            }
            let rule = definition
                .to_rule()
                .map_err(|e| anyhow::anyhow!("Rule `{}`: invalid regex: {}", key, e))?;
            rules.push(key.clone(), rule);
        }
        Ok(rules)
    }

    /// Translate into a handler configuration.
    pub fn to_handler_config(&self, engine: Arc<TemplateEngine>) -> anyhow::Result<HttpHandlerConfig> {
        let returns = if self.response.template {
            let response = self.response.clone();
            let stub_id = self.id.clone();
            ResponseSpec::dynamic(move |info: &InvocationInfo<'_>| -> MockResponse {
                let ctx = TemplateContext::from_invocation(info);
                response.render(&engine, &ctx).unwrap_or_else(|e| {
                    warn!(stub_id = %stub_id, error = %e, "Template rendering failed");
                    MockResponse::status(500)
                })
            })
        } else {
            ResponseSpec::Response(self.response.to_response()?)
        };

        Ok(HttpHandlerConfig::new(self.method, self.url.clone())
            .request_body_type(self.request_body_type)
            .validate(self.rule_set()?)
            .returns(returns))
    }
}

/// Ordered `key: rule` mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleDefinitions(pub Vec<(String, RuleDefinition)>);

impl RuleDefinitions {
    pub fn iter(&self) -> impl Iterator<Item = &(String, RuleDefinition)> {
        self.0.iter()
    }
}

impl Serialize for RuleDefinitions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, rule) in &self.0 {
            map.serialize_entry(key, rule)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RuleDefinitions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = RuleDefinitions;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of field paths to rules")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry::<String, RuleDefinition>()? {
                    entries.push(entry);
                }
                Ok(RuleDefinitions(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

/// One validation rule as written in YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleDefinition {
    Check(CheckDefinition),
    /// Value the field must equal
    Literal(Value),
}

/// A named check with optional failure overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckDefinition {
    #[serde(flatten)]
    pub kind: CheckKind,

    /// Message reported instead of the default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Reply with this status instead of a rejection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckKind {
    /// Field must be present
    Defined,
    /// Field must be missing
    Absent,
    /// String field must match a regex
    Matches { pattern: String },
    /// Field must equal one of the values
    OneOf { values: Vec<Value> },
    /// String contains, or list holds, the value
    Contains { value: String },
    /// Numeric bounds, inclusive
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
}

impl RuleDefinition {
    pub fn to_rule(&self) -> Result<Rule, regex::Error> {
        match self {
            RuleDefinition::Literal(value) => Ok(Rule::Literal(Some(value.clone()))),
            RuleDefinition::Check(check) => {
                let rule = match &check.kind {
                    CheckKind::Defined => rules::defined(),
                    CheckKind::Absent => Rule::absent(),
                    CheckKind::Matches { pattern } => rules::matches(pattern)?,
                    CheckKind::OneOf { values } => rules::one_of(values.iter().cloned()),
                    CheckKind::Contains { value } => rules::contains(value.as_str()),
                    CheckKind::Range { min, max } => rules::within(*min, *max),
                };
                Ok(with_overrides(rule, check.error.clone(), check.status))
            }
        }
    }
}

fn with_overrides(rule: Rule, error: Option<String>, status: Option<u16>) -> Rule {
    if error.is_none() && status.is_none() {
        return rule;
    }

    let check: PredicateFn = match rule {
        Rule::Predicate(check) => check,
        Rule::Literal(expected) => Arc::new(move |value: Option<&Value>| -> Verdict {
            Verdict::from(equals(value, expected.as_ref()))
        }),
    };

    Rule::predicate(move |value: Option<&Value>| match check(value) {
        Verdict::Fail(reason) => match status {
            Some(status) => Verdict::Respond(MockResponse::status(status)),
            None => Verdict::Fail(error.clone().unwrap_or(reason)),
        },
        verdict => verdict,
    })
}

/// Response definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Response headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Response body
    #[serde(default)]
    pub body: Option<ResponseBody>,

    /// Whether this is a template response
    #[serde(default)]
    pub template: bool,
}

fn default_status() -> u16 {
    200
}

impl Default for ResponseDefinition {
    fn default() -> Self {
        Self {
            status: default_status(),
            headers: BTreeMap::new(),
            body: None,
            template: false,
        }
    }
}

impl ResponseDefinition {
    /// Validate the response definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        check_status(self.status)?;
        if let Some(body) = &self.body {
            body.to_bytes()?;
        }
        Ok(())
    }

    /// The static response.
    pub fn to_response(&self) -> anyhow::Result<MockResponse> {
        self.build(self.body.as_ref())
    }

    /// The response with templates in the body rendered.
    pub fn render(&self, engine: &TemplateEngine, ctx: &TemplateContext) -> anyhow::Result<MockResponse> {
        let body = match &self.body {
            Some(ResponseBody::Text { content }) => Some(ResponseBody::Text {
                content: engine.render(content, ctx)?,
            }),
            Some(ResponseBody::Json { content }) => Some(ResponseBody::Json {
                content: engine.render_json(content, ctx)?,
            }),
            other => other.clone(),
        };
        self.build(body.as_ref())
    }

    fn build(&self, body: Option<&ResponseBody>) -> anyhow::Result<MockResponse> {
        let mut response = MockResponse::status(self.status);
        if let Some(body) = body {
            if let Some(content_type) = body.content_type() {
                response = response.with_header("Content-Type", content_type);
            }
            response = response.with_body(body.to_bytes()?);
        }
        for (name, value) in &self.headers {
            response = response.with_header(name.clone(), value.clone());
        }
        Ok(response)
    }
}

fn check_status(status: u16) -> Result<(), ConfigError> {
    if (100..=599).contains(&status) {
        Ok(())
    } else {
        Err(ConfigError::InvalidStatus(status))
    }
}

/// Response body configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Plain text body
    Text { content: String },
    /// JSON body
    Json { content: Value },
    /// Base64 encoded binary
    Base64 { content: String },
    Empty,
}

impl ResponseBody {
    /// Get the body content as bytes.
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        match self {
            ResponseBody::Text { content } => Ok(content.as_bytes().to_vec()),
            ResponseBody::Json { content } => Ok(serde_json::to_vec(content)?),
            ResponseBody::Base64 { content } => {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD
                    .decode(content)
                    .map_err(|e| anyhow::anyhow!("Invalid base64: {}", e))
            }
            ResponseBody::Empty => Ok(Vec::new()),
        }
    }

    /// Get content type for this body.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            ResponseBody::Text { .. } => Some("text/plain"),
            ResponseBody::Json { .. } => Some("application/json"),
            ResponseBody::Base64 { .. } => Some("application/octet-stream"),
            ResponseBody::Empty => None,
        }
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Log handled requests
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log requests no stub handles
    #[serde(default = "default_true")]
    pub log_unmatched: bool,
}

fn default_true() -> bool {
    true
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
        }
    }
}
