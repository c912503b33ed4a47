//! Rule evaluation.

use crate::request::RequestView;
use crate::response::MockResponse;
use crate::rules::{equals, Rule, RuleSet, Verdict};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Status used for rejections.
pub const REJECTION_STATUS: u16 = 400;

const GENERIC_FAILURE: &str = "validation failed";

/// The `{path, value, error}` payload of a failed rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    /// Rule key that failed
    pub path: String,
    /// Value found at that key, omitted when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Reason for the failure
    pub error: String,
}

impl Rejection {
    pub fn into_response(self) -> MockResponse {
        let body = serde_json::to_value(&self).unwrap_or_default();
        MockResponse::json(&body).with_status(REJECTION_STATUS)
    }
}

/// Why a request did not pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    Rejected(Rejection),
    /// A predicate chose the response itself.
    Overridden(MockResponse),
}

impl From<Failure> for MockResponse {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Rejected(rejection) => rejection.into_response(),
            Failure::Overridden(response) => response,
        }
    }
}

/// Evaluate `rules` in order against `view`, stopping at the first failure.
pub fn validate(view: &RequestView, rules: &RuleSet) -> Result<(), Failure> {
    for entry in rules.iter() {
        let actual = view.resolve(&entry.path);

        let error = match &entry.rule {
            Rule::Predicate(check) => match check(actual) {
                Verdict::Pass => continue,
                Verdict::Respond(response) => {
                    debug!(path = %entry.key, status = response.status, "Predicate replied directly");
                    return Err(Failure::Overridden(response));
                }
                Verdict::Fail(reason) if reason.is_empty() => GENERIC_FAILURE.to_string(),
                Verdict::Fail(reason) => reason,
            },
            Rule::Literal(expected) => {
                if equals(actual, expected.as_ref()) {
                    continue;
                }
                expecting(expected.as_ref())
            }
        };

        debug!(path = %entry.key, error = %error, "Request failed validation");
        return Err(Failure::Rejected(Rejection {
            path: entry.key.clone(),
            value: actual.map(integral_floats),
            error,
        }));
    }

    Ok(())
}

fn expecting(expected: Option<&Value>) -> String {
    match expected {
        Some(value) => format!("expecting {}", integral_floats(value)),
        None => "expecting undefined".to_string(),
    }
}

/// Copy of `value` with integral floats turned into integers, so `1.0`
/// prints as `1`.
fn integral_floats(value: &Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => Value::from(f as i64),
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(integral_floats).collect()),
        Value::Object(object) => Value::Object(
            object
                .iter()
                .map(|(k, v)| (k.clone(), integral_floats(v)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{defined, Rule};
    use serde_json::json;

    fn view() -> RequestView {
        RequestView {
            params: Some(json!({"id": "1234", "action": "cancel"})),
            query: Some(json!({"status": ["ordered", "canceled"], "limit": "999"})),
            cookies: Some(json!({"admin": "1"})),
            body: Some(json!({"items": ["5678", "1234"]})),
            ..Default::default()
        }
    }

    fn rejection(result: Result<(), Failure>) -> Rejection {
        match result {
            Err(Failure::Rejected(rejection)) => rejection,
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_literal_mismatch() {
        let rules = RuleSet::new().rule("body.items[0]", "1234");
        let failed = rejection(validate(&view(), &rules));
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"path": "body.items[0]", "value": "5678", "error": "expecting \"1234\""})
        );
    }

    #[test]
    fn test_expected_absent() {
        let rules = RuleSet::new().rule("cookies.admin", Rule::absent());
        let failed = rejection(validate(&view(), &rules));
        assert_eq!(failed.error, "expecting undefined");
        assert_eq!(failed.value, Some(json!("1")));

        let rules = RuleSet::new().rule("cookies.promo", Rule::absent());
        assert!(validate(&view(), &rules).is_ok());
    }

    #[test]
    fn test_list_message_and_absent_value() {
        let rules = RuleSet::new().rule("query.status", vec!["ordered", "shipped"]);
        let listed = rejection(validate(&view(), &rules));
        assert_eq!(listed.error, r#"expecting ["ordered","shipped"]"#);
        assert_eq!(listed.value, Some(json!(["ordered", "canceled"])));

        let rules = RuleSet::new().rule("headers.authorization", "Basic secret");
        let missing = rejection(validate(&view(), &rules));
        assert_eq!(missing.value, None);
        assert_eq!(
            serde_json::to_value(&missing).unwrap(),
            json!({"path": "headers.authorization", "error": "expecting \"Basic secret\""})
        );
    }

    #[test]
    fn test_predicate_messages() {
        let rules = RuleSet::new().rule("query.limit", Rule::predicate(|_: Option<&Value>| false));
        assert_eq!(rejection(validate(&view(), &rules)).error, "validation failed");

        let rules = RuleSet::new().rule("query.limit", Rule::predicate(|_: Option<&Value>| ""));
        assert_eq!(rejection(validate(&view(), &rules)).error, "validation failed");

        let rules = RuleSet::new().rule(
            "query.limit",
            Rule::predicate(|limit: Option<&Value>| {
                let limit = limit.and_then(Value::as_str).and_then(|s| s.parse::<i64>().ok());
                Verdict::require(limit.is_some_and(|l| l <= 10), "limit too high")
            }),
        );
        let failed = rejection(validate(&view(), &rules));
        assert_eq!(failed.error, "limit too high");
        assert_eq!(failed.value, Some(json!("999")));
    }

    #[test]
    fn test_whole_section_predicate_sees_section() {
        let rules = RuleSet::new().rule(
            "params",
            Rule::predicate(|params: Option<&Value>| {
                params.is_some_and(|p| p["action"] == "view")
            }),
        );
        let failed = rejection(validate(&view(), &rules));
        assert_eq!(failed.path, "params");
        assert_eq!(failed.value, Some(json!({"id": "1234", "action": "cancel"})));
    }

    #[test]
    fn test_override_short_circuits() {
        let rules = RuleSet::new()
            .rule(
                "params.action",
                Rule::predicate(|action: Option<&Value>| {
                    if action == Some(&json!("cancel")) {
                        Verdict::Respond(MockResponse::status(405))
                    } else {
                        Verdict::Pass
                    }
                }),
            )
            .rule("params.id", "never checked");

        let failure = validate(&view(), &rules).unwrap_err();
        assert_eq!(failure, Failure::Overridden(MockResponse::status(405)));
        assert_eq!(MockResponse::from(failure).status, 405);
    }

    #[test]
    fn test_first_failure_wins() {
        let a = ("params.id", Rule::from("9999"));
        let b = ("cookies.admin", Rule::absent());

        let rules = RuleSet::new().rule(a.0, a.1.clone()).rule(b.0, b.1.clone());
        assert_eq!(rejection(validate(&view(), &rules)).path, "params.id");

        let rules = RuleSet::new().rule(b.0, b.1).rule(a.0, a.1);
        assert_eq!(rejection(validate(&view(), &rules)).path, "cookies.admin");
    }

    #[test]
    fn test_all_pass() {
        let rules = RuleSet::new()
            .rule("params.id", "1234")
            .rule("body.items", vec!["5678", "1234"])
            .rule("cookies.admin", defined())
            .rule("headers.authorization", Rule::absent());
        assert!(validate(&view(), &rules).is_ok());
        assert!(validate(&view(), &RuleSet::new()).is_ok());
    }

    #[test]
    fn test_integral_floats_print_as_integers() {
        let view = RequestView {
            body: Some(json!({"total": 2.0, "ratio": 0.5})),
            ..Default::default()
        };

        let rules = RuleSet::new().rule("body.total", json!(1.0));
        let failed = rejection(validate(&view, &rules));
        assert_eq!(failed.error, "expecting 1");
        assert_eq!(serde_json::to_value(&failed).unwrap()["value"].to_string(), "2");

        let rules = RuleSet::new().rule("body", Rule::predicate(|_: Option<&Value>| false));
        let failed = rejection(validate(&view, &rules));
        assert_eq!(failed.value.unwrap().to_string(), r#"{"total":2,"ratio":0.5}"#);

        let rules = RuleSet::new().rule("body.ratio", json!([1.5, 3.0]));
        assert_eq!(rejection(validate(&view, &rules)).error, "expecting [1.5,3]");
    }

    #[test]
    fn test_rejection_response() {
        let response = Rejection {
            path: "params.id".into(),
            value: Some(json!("1")),
            error: "expecting \"1234\"".into(),
        }
        .into_response();

        assert_eq!(response.status, 400);
        assert_eq!(
            response.json_body(),
            Some(json!({"path": "params.id", "value": "1", "error": "expecting \"1234\""}))
        );
    }
}
