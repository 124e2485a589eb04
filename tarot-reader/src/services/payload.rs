//! Webhook payload parsing
//!
//! Remote replies arrive in several shapes. Every parser here runs the same
//! chain:
//! 1. direct fields on the object
//! 2. an array wrapping one object
//! 3. a legacy `output` field holding JSON-encoded text
//!
//! Text bodies are tried as JSON first.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use super::webhook_client::WebhookBody;

/// Legacy field carrying a JSON-encoded reply
const LEGACY_OUTPUT_FIELD: &str = "output";

/// Payload shape errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Empty reply body")]
    Empty,

    #[error("Unexpected reply shape: {0}")]
    Shape(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Expected 3 card indices, found {0}")]
    TooFewIndices(usize),

    #[error("Invalid JSON in `{field}`: {message}")]
    EmbeddedJson { field: &'static str, message: String },
}

/// Reading reply before clamping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReading {
    /// Exactly three indices, possibly out of range
    pub indices: Vec<i64>,
    pub message: Option<String>,
    pub question: Option<String>,
    pub deck: Option<String>,
}

/// Login reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginReply {
    pub user_id: String,
    pub runs_today: bool,
}

/// Narrative fields pulled from any reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Narrative {
    pub message: Option<String>,
    pub question: Option<String>,
}

fn body_value(body: &WebhookBody) -> Result<Value, PayloadError> {
    match body {
        WebhookBody::Json(value) => Ok(value.clone()),
        WebhookBody::Text(text) => serde_json::from_str(text.trim())
            .map_err(|_| PayloadError::Shape("text reply is not JSON".to_string())),
        WebhookBody::Empty => Err(PayloadError::Empty),
    }
}

/// Walk the parser chain down to the object carrying the reply fields
fn resolve_object(value: &Value) -> Result<Map<String, Value>, PayloadError> {
    let value = match value {
        Value::Array(items) => items
            .first()
            .ok_or_else(|| PayloadError::Shape("empty array".to_string()))?,
        other => other,
    };

    let object = value
        .as_object()
        .ok_or_else(|| PayloadError::Shape(format!("expected object, found {}", kind(value))))?;

    match object.get(LEGACY_OUTPUT_FIELD) {
        Some(Value::String(encoded)) if !has_reply_fields(object) => {
            let inner: Value = serde_json::from_str(encoded).map_err(|e| {
                PayloadError::EmbeddedJson {
                    field: LEGACY_OUTPUT_FIELD,
                    message: e.to_string(),
                }
            })?;
            resolve_object(&inner)
        }
        Some(inner @ (Value::Object(_) | Value::Array(_))) if !has_reply_fields(object) => {
            resolve_object(inner)
        }
        _ => Ok(object.clone()),
    }
}

fn has_reply_fields(object: &Map<String, Value>) -> bool {
    ["selected_cards", "message", "question", "userid"]
        .iter()
        .any(|k| object.contains_key(*k))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn non_empty_str(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn as_index(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse a reading webhook reply
///
/// Extra indices beyond the third are ignored.
pub fn parse_reading_reply(body: &WebhookBody) -> Result<RawReading, PayloadError> {
    let object = resolve_object(&body_value(body)?)?;

    let cards = object
        .get("selected_cards")
        .and_then(Value::as_array)
        .ok_or(PayloadError::MissingField("selected_cards"))?;

    let indices: Vec<i64> = cards.iter().filter_map(as_index).take(3).collect();
    if indices.len() < 3 {
        return Err(PayloadError::TooFewIndices(indices.len()));
    }

    Ok(RawReading {
        indices,
        message: non_empty_str(&object, "message"),
        question: non_empty_str(&object, "question"),
        deck: non_empty_str(&object, "deck"),
    })
}

/// Parse a login webhook reply (`{userid, runs_today}` or an array of one)
pub fn parse_login_reply(body: &WebhookBody) -> Result<LoginReply, PayloadError> {
    let object = resolve_object(&body_value(body)?)?;

    let user_id = match object.get("userid") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(PayloadError::MissingField("userid")),
    };

    let runs_today = match object.get("runs_today") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };

    Ok(LoginReply {
        user_id,
        runs_today,
    })
}

/// Pull `message` and `question` from a raw reply value
///
/// Never fails; shape problems are logged and whatever was found is kept.
pub fn extract_narrative(value: &Value) -> Narrative {
    match resolve_object(value) {
        Ok(object) => Narrative {
            message: non_empty_str(&object, "message"),
            question: non_empty_str(&object, "question"),
        },
        Err(PayloadError::EmbeddedJson { field, message }) => {
            warn!(field, error = %message, "Legacy reply field is not JSON, using it as text");
            let text = unwrap_first(value)
                .and_then(Value::as_object)
                .and_then(|o| non_empty_str(o, field));
            Narrative {
                message: text,
                question: None,
            }
        }
        Err(e) => {
            warn!(error = %e, "Could not read narrative from reply");
            Narrative::default()
        }
    }
}

/// Narrative from a text reply: JSON when it parses, else the text itself
pub fn extract_narrative_text(text: &str) -> Narrative {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Narrative::default();
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => extract_narrative(&value),
        _ => Narrative {
            message: Some(trimmed.to_string()),
            question: None,
        },
    }
}

fn unwrap_first(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.first(),
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reading_direct_fields() {
        let body = WebhookBody::Json(json!({
            "selected_cards": [7, 2, 15],
            "message": "Change is coming",
            "question": "What next?",
            "deck": "crypto"
        }));
        let reading = parse_reading_reply(&body).unwrap();
        assert_eq!(reading.indices, vec![7, 2, 15]);
        assert_eq!(reading.message.as_deref(), Some("Change is coming"));
        assert_eq!(reading.question.as_deref(), Some("What next?"));
        assert_eq!(reading.deck.as_deref(), Some("crypto"));
    }

    #[test]
    fn test_reading_array_wrapped() {
        let body = WebhookBody::Json(json!([{ "selected_cards": [1, 2, 3, 4] }]));
        let reading = parse_reading_reply(&body).unwrap();
        assert_eq!(reading.indices, vec![1, 2, 3]);
        assert!(reading.message.is_none());
    }

    #[test]
    fn test_reading_legacy_output_string() {
        let encoded = json!({ "selected_cards": [-5, 999, 2], "message": "m" }).to_string();
        let body = WebhookBody::Json(json!([{ "output": encoded }]));
        let reading = parse_reading_reply(&body).unwrap();
        assert_eq!(reading.indices, vec![-5, 999, 2]);
    }

    #[test]
    fn test_reading_from_text_body() {
        let body = WebhookBody::Text(r#"{"selected_cards":["4","5","6"]}"#.to_string());
        assert_eq!(parse_reading_reply(&body).unwrap().indices, vec![4, 5, 6]);
    }

    #[test]
    fn test_reading_shape_errors() {
        assert_eq!(parse_reading_reply(&WebhookBody::Empty), Err(PayloadError::Empty));
        assert_eq!(
            parse_reading_reply(&WebhookBody::Json(json!({ "message": "x" }))),
            Err(PayloadError::MissingField("selected_cards"))
        );
        assert_eq!(
            parse_reading_reply(&WebhookBody::Json(json!({ "selected_cards": [1, "a"] }))),
            Err(PayloadError::TooFewIndices(1))
        );
        assert!(matches!(
            parse_reading_reply(&WebhookBody::Text("Workflow started".to_string())),
            Err(PayloadError::Shape(_))
        ));
    }

    #[test]
    fn test_login_object_and_array() {
        let direct = WebhookBody::Json(json!({ "userid": "u-1", "runs_today": true }));
        assert_eq!(
            parse_login_reply(&direct).unwrap(),
            LoginReply {
                user_id: "u-1".to_string(),
                runs_today: true
            }
        );

        let wrapped = WebhookBody::Json(json!([{ "userid": 42, "runs_today": 0 }]));
        let reply = parse_login_reply(&wrapped).unwrap();
        assert_eq!(reply.user_id, "42");
        assert!(!reply.runs_today);
    }

    #[test]
    fn test_login_missing_user_id() {
        let body = WebhookBody::Json(json!({ "runs_today": false }));
        assert_eq!(parse_login_reply(&body), Err(PayloadError::MissingField("userid")));
    }

    #[test]
    fn test_narrative_legacy_plain_text_output() {
        let narrative = extract_narrative(&json!([{ "output": "The tower falls" }]));
        assert_eq!(narrative.message.as_deref(), Some("The tower falls"));
    }

    #[test]
    fn test_narrative_from_text() {
        let narrative = extract_narrative_text(r#"{"message":"m","question":"q"}"#);
        assert_eq!(narrative.message.as_deref(), Some("m"));
        assert_eq!(narrative.question.as_deref(), Some("q"));

        let plain = extract_narrative_text("  just words ");
        assert_eq!(plain.message.as_deref(), Some("just words"));
        assert_eq!(extract_narrative_text("   "), Narrative::default());
    }
}
