//! Turns a raw model reply into plain text or a schema-validated object.
//!
//! Pure: the same raw reply and schema always give the same result.

use parley_core::error::{Error, Result};
use parley_core::schema::{OutputSchema, StructuredResult};

/// A model reply after normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedResponse {
    Text(String),
    Structured(StructuredResult),
}

impl NormalizedResponse {
    /// The reply as text. Structured results render as compact JSON.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(result) => serde_json::Value::Object(result.fields.clone()).to_string(),
        }
    }
}

/// Normalize a raw model reply.
///
/// Without a schema the trimmed text is returned. With one, the reply
/// (optionally wrapped in a markdown code fence) must parse as a JSON
/// object that validates against it.
pub fn normalize(raw: &str, schema: Option<&OutputSchema>) -> Result<NormalizedResponse> {
    let Some(schema) = schema else {
        return Ok(NormalizedResponse::Text(raw.trim().to_string()));
    };

    let invalid = |reason: String| Error::SchemaValidation {
        schema: schema.name.clone(),
        reason,
    };

    let body = strip_code_fences(raw);
    if body.is_empty() {
        return Err(invalid("empty response".into()));
    }

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| invalid(format!("not valid JSON: {e}")))?;

    schema.validate(&value).map_err(invalid)?;

    match value {
        serde_json::Value::Object(fields) => Ok(NormalizedResponse::Structured(StructuredResult {
            schema_name: schema.name.clone(),
            fields,
        })),
        other => Err(invalid(format!("expected a JSON object, got {other}"))),
    }
}

/// Remove a surrounding markdown code fence (```` ``` ```` or ```` ```json ````).
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line.
    let rest = match rest.find('\n') {
        Some(newline) if !rest[..newline].contains('{') => &rest[newline + 1..],
        _ => rest.strip_prefix("json").unwrap_or(rest),
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::schema::Report;

    #[test]
    fn text_is_trimmed() {
        let out = normalize("  Hello there!\n", None).unwrap();
        assert_eq!(out, NormalizedResponse::Text("Hello there!".into()));
    }

    #[test]
    fn valid_report_parses() {
        let raw = r#"{"name": "Fish", "suggestion_list": ["Read RFC 793", "Practice with Wireshark"]}"#;
        let out = normalize(raw, Some(&OutputSchema::report())).unwrap();

        let NormalizedResponse::Structured(result) = out else {
            panic!("expected structured output");
        };
        assert_eq!(result.schema_name, "report");
        let report: Report = result.deserialize().unwrap();
        assert_eq!(report.name, "Fish");
        assert_eq!(report.suggestion_list.len(), 2);
    }

    #[test]
    fn fenced_json_is_accepted() {
        let raw = "```json\n{\"name\": \"Fish\", \"suggestion_list\": []}\n```";
        assert!(normalize(raw, Some(&OutputSchema::report())).is_ok());

        let bare = "```\n{\"name\": \"Fish\", \"suggestion_list\": []}\n```";
        assert!(normalize(bare, Some(&OutputSchema::report())).is_ok());
    }

    #[test]
    fn prose_fails_validation() {
        let err = normalize("Sure! Here is your report.", Some(&OutputSchema::report())).unwrap_err();
        assert!(matches!(err, Error::SchemaValidation { ref schema, .. } if schema == "report"));
    }

    #[test]
    fn missing_field_fails_validation() {
        let err = normalize(r#"{"name": "Fish"}"#, Some(&OutputSchema::report())).unwrap_err();
        let Error::SchemaValidation { reason, .. } = err else {
            panic!("expected schema validation error");
        };
        assert!(reason.contains("suggestion_list"));
    }

    #[test]
    fn wrong_item_type_fails_validation() {
        let raw = r#"{"name": "Fish", "suggestion_list": [1, 2]}"#;
        assert!(normalize(raw, Some(&OutputSchema::report())).is_err());
    }

    #[test]
    fn empty_reply_fails_validation() {
        assert!(normalize("   ", Some(&OutputSchema::report())).is_err());
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = "```json\n{\"name\": \"Fish\", \"suggestion_list\": [\"a\"]}\n```";
        let schema = OutputSchema::report();
        let first = normalize(raw, Some(&schema)).unwrap();
        let second = normalize(raw, Some(&schema)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn strip_code_fences_variants() {
        assert_eq!(strip_code_fences(r#"{"key": "value"}"#), r#"{"key": "value"}"#);
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), r#"{"a": 1}"#);
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```"), r#"{"a": 1}"#);
        assert_eq!(strip_code_fences("```json{\"a\": 1}```"), r#"{"a": 1}"#);
    }
}
