//! Submission validation.
//!
//! Checks raw JSON answers against a form schema and converts them into
//! typed [`Answer`] values. The pipeline only ever sees accepted answers.

use crate::models::{Answer, Answers, Field, FieldKind, Form};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub field_id: String,
    pub message: String,
}

/// All reasons a submission was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub errors: Vec<ValidationIssue>,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field_id, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for Rejection {}

/// Validate raw answers against `form`.
///
/// Every violation is collected. Answers for fields the form does not
/// declare are dropped rather than rejected.
pub fn check(form: &Form, raw: &Map<String, Value>) -> Result<Answers, Rejection> {
    let mut errors = Vec::new();
    let mut answers = Answers::new();

    for field in &form.fields {
        let Some(value) = raw.get(&field.id) else {
            if field.required {
                errors.push(issue(field, "field is required"));
            }
            continue;
        };

        match check_field(field, value) {
            Ok(answer) => {
                answers.insert(field.id.clone(), answer);
            }
            Err(mut field_errors) => errors.append(&mut field_errors),
        }
    }

    let ignored = raw.keys().filter(|k| form.field(k).is_none()).count();
    if ignored > 0 {
        debug!("Ignoring {} answers for undeclared fields", ignored);
    }

    if errors.is_empty() {
        Ok(answers)
    } else {
        Err(Rejection { errors })
    }
}

fn check_field(field: &Field, value: &Value) -> Result<Answer, Vec<ValidationIssue>> {
    match &field.kind {
        FieldKind::Text => match value {
            Value::String(s) => Ok(Answer::Text(s.clone())),
            _ => Err(vec![issue(field, "must be a string")]),
        },
        FieldKind::SingleChoice { options } => {
            let Value::String(id) = value else {
                return Err(vec![issue(field, "must be a string option id")]);
            };
            if options.iter().any(|o| &o.id == id) {
                Ok(Answer::Text(id.clone()))
            } else {
                Err(vec![issue(field, "invalid option")])
            }
        }
        FieldKind::MultiChoice { options } => {
            let Value::Array(items) = value else {
                return Err(vec![issue(field, "must be an array of option ids")]);
            };
            let mut ids = Vec::with_capacity(items.len());
            let mut errors = Vec::new();
            for item in items {
                match item.as_str() {
                    Some(id) if options.iter().any(|o| o.id == id) => ids.push(id.to_string()),
                    _ => errors.push(issue(field, &format!("invalid option {}", item))),
                }
            }
            if errors.is_empty() {
                Ok(Answer::List(ids))
            } else {
                Err(errors)
            }
        }
        FieldKind::Rating { .. } => {
            let Some(num) = value.as_f64() else {
                return Err(vec![issue(field, "must be a number")]);
            };
            // Bounds are inclusive and exact; an inverted pair accepts nothing.
            let (min, max) = field.rating_bounds().unwrap_or((1, 5));
            if num < min as f64 || num > max as f64 {
                return Err(vec![issue(
                    field,
                    &format!("must be between {} and {}", min, max),
                )]);
            }
            Ok(Answer::Number(num))
        }
    }
}

fn issue(field: &Field, message: &str) -> ValidationIssue {
    ValidationIssue {
        field_id: field.id.clone(),
        message: message.to_string(),
    }
}
