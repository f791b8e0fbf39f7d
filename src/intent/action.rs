//! Action records returned by the intent model

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{Error, Result};

/// Extra fields copied from a `call_service` record into the request body
const FORWARDED_FIELDS: [&str; 1] = ["source"];

/// A hub service invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCall {
    /// Service domain (e.g. "switch")
    pub domain: String,

    /// Service name (e.g. "turn_off")
    pub service: String,

    /// Target entity (e.g. "switch.kitchen_light")
    pub entity_id: String,

    /// Additional body fields, such as `source` for media players
    pub extra: BTreeMap<String, String>,
}

impl ServiceCall {
    /// Create a call with no extra fields
    #[must_use]
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            entity_id: entity_id.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Add an extra body field
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// JSON body for the service call: `entity_id` plus the extra fields
    #[must_use]
    pub fn body(&self) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        body.insert(
            "entity_id".to_string(),
            serde_json::Value::String(self.entity_id.clone()),
        );
        for (key, value) in &self.extra {
            body.insert(key.clone(), serde_json::Value::String(value.clone()));
        }
        serde_json::Value::Object(body)
    }
}

/// One step of a decision, executed in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRecord {
    /// Call a hub service
    ServiceCall(ServiceCall),

    /// Say something back to the user
    ChatReply {
        /// Text to speak
        response: String,
    },

    /// A record with an action tag this relay does not handle
    Unknown(String),
}

/// Wire shape of a single record, before validation
#[derive(Debug, Deserialize)]
struct RawAction {
    action: String,
    domain: Option<String>,
    service: Option<String>,
    entity_id: Option<String>,
    response: Option<String>,
    #[serde(flatten)]
    rest: BTreeMap<String, serde_json::Value>,
}

impl TryFrom<RawAction> for ActionRecord {
    type Error = Error;

    fn try_from(raw: RawAction) -> Result<Self> {
        match raw.action.as_str() {
            "call_service" => {
                let field = |value: Option<String>, name: &str| {
                    value.ok_or_else(|| Error::Llm(format!("call_service without {name}")))
                };

                let mut extra = BTreeMap::new();
                for name in FORWARDED_FIELDS {
                    match raw.rest.get(name) {
                        None | Some(serde_json::Value::Null) => {}
                        Some(serde_json::Value::String(value)) => {
                            extra.insert(name.to_string(), value.clone());
                        }
                        Some(other) => {
                            return Err(Error::Llm(format!(
                                "call_service {name} must be a string, got {other}"
                            )));
                        }
                    }
                }

                Ok(Self::ServiceCall(ServiceCall {
                    domain: field(raw.domain, "domain")?,
                    service: field(raw.service, "service")?,
                    entity_id: field(raw.entity_id, "entity_id")?,
                    extra,
                }))
            }
            "chat" => raw
                .response
                .map(|response| Self::ChatReply { response })
                .ok_or_else(|| Error::Llm("chat without response".to_string())),
            other => Ok(Self::Unknown(other.to_string())),
        }
    }
}

/// Remove markdown code fences around a model reply
///
/// Text outside the first fenced block is dropped; unfenced text is only trimmed.
#[must_use]
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };

    let body = skip_info_string(&trimmed[open + 3..]);

    let body = body.find("```").map_or(body, |close| &body[..close]);
    body.trim()
}

/// Skip the label after an opening fence, with or without a newline after it
fn skip_info_string(after_open: &str) -> &str {
    if after_open
        .get(..4)
        .is_some_and(|label| label.eq_ignore_ascii_case("json"))
    {
        return &after_open[4..];
    }

    match after_open.split_once('\n') {
        Some((label, rest)) if label.trim().chars().all(|c| c.is_ascii_alphanumeric()) => rest,
        _ => after_open,
    }
}

/// Parse a model reply into action records
///
/// Accepts a JSON array of records or a single record object, optionally
/// wrapped in a markdown code fence.
///
/// # Errors
///
/// Returns error if the reply is not JSON or a record has the wrong shape
pub fn parse_actions(raw: &str) -> Result<Vec<ActionRecord>> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fences(raw))?;

    let items = match value {
        serde_json::Value::Array(items) => items,
        object @ serde_json::Value::Object(_) => vec![object],
        other => {
            return Err(Error::Llm(format!(
                "expected an array or object of actions, got {other}"
            )));
        }
    };

    items
        .into_iter()
        .map(|item| ActionRecord::try_from(serde_json::from_value::<RawAction>(item)?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_code_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fences("Sure:\n```JSON\n[]\n```\nDone."), "[]");
        assert_eq!(strip_code_fences("  [1, 2] "), "[1, 2]");
    }

    #[test]
    fn test_unterminated_fence() {
        assert_eq!(strip_code_fences("```json\n[1]"), "[1]");
        assert_eq!(strip_code_fences("```[1]```"), "[1]");
    }

    #[test]
    fn test_single_line_fences() {
        assert_eq!(strip_code_fences("```json[1]```"), "[1]");
        assert_eq!(strip_code_fences("```json {\"a\":1} ```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```JSON [] ```"), "[]");
        assert_eq!(strip_code_fences("```text\n[1]\n```"), "[1]");

        let actions =
            parse_actions("```json[{\"action\":\"chat\",\"response\":\"hi\"}]```").unwrap();
        assert_eq!(
            actions,
            vec![ActionRecord::ChatReply {
                response: "hi".to_string()
            }]
        );
    }

    #[test]
    fn test_body_merges_extra() {
        let call = ServiceCall::new("media_player", "select_source", "media_player.tv")
            .with_extra("source", "YouTube");
        assert_eq!(
            call.body(),
            serde_json::json!({"entity_id": "media_player.tv", "source": "YouTube"})
        );
    }

    #[test]
    fn test_only_source_is_forwarded() {
        let actions = parse_actions(
            r#"[{"action": "call_service", "domain": "light", "service": "turn_on",
                 "entity_id": "light.desk", "brightness": "80", "source": "HDMI 1"}]"#,
        )
        .unwrap();

        let ActionRecord::ServiceCall(call) = &actions[0] else {
            panic!("expected service call");
        };
        assert_eq!(call.extra.len(), 1);
        assert_eq!(call.extra["source"], "HDMI 1");
    }

    #[test]
    fn test_missing_fields_are_errors() {
        assert!(parse_actions(r#"[{"action": "call_service", "service": "turn_on"}]"#).is_err());
        assert!(parse_actions(r#"[{"action": "chat"}]"#).is_err());
        assert!(parse_actions(r#"[{"domain": "light"}]"#).is_err());
        assert!(parse_actions(r#""turn on the light""#).is_err());
        assert!(parse_actions("[42]").is_err());
    }

    #[test]
    fn test_unknown_tag_is_kept() {
        let actions = parse_actions(r#"[{"action": "dance"}]"#).unwrap();
        assert_eq!(actions, vec![ActionRecord::Unknown("dance".to_string())]);
    }
}
