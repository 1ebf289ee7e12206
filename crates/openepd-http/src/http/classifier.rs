//! Error response classification
//!
//! Turns a failed [`Response`] into a [`ClassifiedError`]: a summary, an optional
//! machine error code and optional field-level validation messages. OpenEPD error
//! bodies look like
//!
//! ```json
//! {"detail": "bad field", "validation_errors": {"code": "E1", "name": ["required"]}}
//! ```
//!
//! Parsing never fails; anything unexpected falls back to the raw body text.

use std::collections::BTreeMap;
use std::fmt;

use reqwest::StatusCode;
use serde_json::{Map, Value};

use crate::http::response::Response;

/// Which typed error a classified response maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// 400
    Validation,
    /// 401
    NotAuthorized,
    /// 403
    AccessDenied,
    /// 404
    NotFound,
    /// 500
    Server,
    /// Any other failed status
    Http,
}

impl ApiErrorKind {
    pub fn for_status(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_REQUEST => ApiErrorKind::Validation,
            StatusCode::UNAUTHORIZED => ApiErrorKind::NotAuthorized,
            StatusCode::FORBIDDEN => ApiErrorKind::AccessDenied,
            StatusCode::NOT_FOUND => ApiErrorKind::NotFound,
            StatusCode::INTERNAL_SERVER_ERROR => ApiErrorKind::Server,
            _ => ApiErrorKind::Http,
        }
    }
}

/// Structured diagnostic parsed from a failed response
#[derive(Debug)]
pub struct ClassifiedError {
    pub kind: ApiErrorKind,
    pub status: StatusCode,
    /// Human-readable message, prefixed with `[code]` when a code is present
    pub summary: String,
    /// Machine error code from `validation_errors.code`
    pub code: Option<String>,
    /// Field name to messages
    pub field_errors: Option<BTreeMap<String, Vec<String>>>,
    response: Response,
}

impl ClassifiedError {
    /// The originating response, with its body buffered
    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn into_response(self) -> Response {
        self.response
    }

    /// Messages for one field
    pub fn field_error(&self, field: &str) -> Option<&[String]> {
        self.field_errors.as_ref()?.get(field).map(Vec::as_slice)
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary)?;
        if let Some(fields) = self.field_errors.as_ref().filter(|fields| !fields.is_empty()) {
            write!(f, "\nValidation errors:")?;
            for (field, messages) in fields {
                write!(f, "\n{}:", field)?;
                for message in messages {
                    write!(f, "\n  {}", message)?;
                }
            }
        }
        Ok(())
    }
}

/// Result of parsing an error body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedErrorBody {
    pub summary: String,
    pub code: Option<String>,
    pub field_errors: Option<BTreeMap<String, Vec<String>>>,
}

impl ParsedErrorBody {
    fn raw(text: &str) -> Self {
        Self {
            summary: text.to_string(),
            code: None,
            field_errors: None,
        }
    }
}

/// Builds [`ClassifiedError`]s from failed responses
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify with the kind implied by the status code
    pub fn classify(response: Response) -> ClassifiedError {
        let kind = ApiErrorKind::for_status(response.status());
        Self::classify_as(response, kind)
    }

    /// Classify as `kind`, buffering the body
    ///
    /// The summary comes from the body; an empty body yields the status's
    /// canonical reason phrase instead (e.g. `Not Found`).
    pub fn classify_as(mut response: Response, kind: ApiErrorKind) -> ClassifiedError {
        let status = response.status();
        let text = match response.buffer() {
            Ok(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Err(e) => {
                log::warn!("Failed to read error response body: {}", e);
                String::new()
            }
        };

        let mut parsed = parse_error_body(response.content_type(), &text);
        if parsed.summary.is_empty() {
            parsed.summary = status.canonical_reason().unwrap_or("Unknown error").to_string();
        }

        tracing::debug!(status = status.as_u16(), kind = ?kind, "Classified error response");

        ClassifiedError {
            kind,
            status,
            summary: parsed.summary,
            code: parsed.code,
            field_errors: parsed.field_errors,
            response,
        }
    }
}

/// True for `application/json` and `+json` media types, ignoring parameters
pub fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

/// Parse an error body; never fails
pub fn parse_error_body(content_type: Option<&str>, text: &str) -> ParsedErrorBody {
    if !content_type.is_some_and(is_json_content_type) {
        return ParsedErrorBody::raw(text);
    }

    let Ok(Value::Object(body)) = serde_json::from_str::<Value>(text) else {
        return ParsedErrorBody::raw(text);
    };

    let mut summary = match body.get("detail") {
        Some(Value::String(detail)) => detail.clone(),
        Some(Value::Null) | None => text.to_string(),
        Some(other) => other.to_string(),
    };

    let Some(Value::Object(validation)) = body.get("validation_errors") else {
        return ParsedErrorBody {
            summary,
            code: None,
            field_errors: None,
        };
    };

    let code = match validation.get("code") {
        Some(Value::String(code)) => Some(code.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    };

    let field_errors = match validation.get("detail") {
        Some(Value::String(detail)) => {
            summary = detail.clone();
            BTreeMap::from([("msg".to_string(), vec![detail.clone()])])
        }
        _ => field_messages(validation),
    };

    if let Some(code) = &code {
        summary = format!("[{}] {}", code, summary);
    }

    ParsedErrorBody {
        summary,
        code,
        field_errors: Some(field_errors),
    }
}

fn field_messages(validation: &Map<String, Value>) -> BTreeMap<String, Vec<String>> {
    validation
        .iter()
        .filter(|(field, _)| field.as_str() != "code")
        .map(|(field, value)| {
            let messages = match value {
                Value::Array(items) => items.iter().map(message_text).collect(),
                other => vec![message_text(other)],
            };
            (field.clone(), messages)
        })
        .collect()
}

fn message_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
