//! Data models for live form analytics.
//!
//! This module contains the form schema, stored responses with their typed
//! answers, and the aggregate report that is recomputed on every trigger.

use chrono::serde::ts_seconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a form. Also names the live topic for that form.
pub type FormId = String;

/// Identifier of a field, unique within its form.
pub type FieldId = String;

/// Typed answers of one response, keyed by field id.
pub type Answers = BTreeMap<FieldId, Answer>;

/// Default rating bounds when a field leaves them unset.
pub const DEFAULT_MIN_RATING: i64 = 1;
pub const DEFAULT_MAX_RATING: i64 = 5;

/// One selectable option of a choice field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    /// Stable identifier stored in answers.
    pub id: String,
    /// Human readable label used as the report key.
    pub label: String,
}

impl ChoiceOption {
    #[allow(dead_code)] // Builder for programmatic schemas
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Type-specific part of a field definition.
///
/// The wire tags follow the form builder: `multiple_choice` is a single-choice
/// question and `checkbox` a multi-choice one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text answer.
    Text,
    /// Exactly one option id.
    #[serde(rename = "multiple_choice", alias = "single_choice")]
    SingleChoice {
        #[serde(default)]
        options: Vec<ChoiceOption>,
    },
    /// Any number of option ids.
    #[serde(rename = "checkbox", alias = "multi_choice")]
    MultiChoice {
        #[serde(default)]
        options: Vec<ChoiceOption>,
    },
    /// Numeric score between two bounds.
    Rating {
        #[serde(
            default,
            rename = "minRating",
            skip_serializing_if = "Option::is_none"
        )]
        min_rating: Option<i64>,
        #[serde(
            default,
            rename = "maxRating",
            skip_serializing_if = "Option::is_none"
        )]
        max_rating: Option<i64>,
    },
}

impl FieldKind {
    /// The bare type tag of this kind.
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldKind::Text => FieldType::Text,
            FieldKind::SingleChoice { .. } => FieldType::SingleChoice,
            FieldKind::MultiChoice { .. } => FieldType::MultiChoice,
            FieldKind::Rating { .. } => FieldType::Rating,
        }
    }
}

/// Closed set of field type tags, as reported in analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    #[serde(rename = "multiple_choice")]
    SingleChoice,
    #[serde(rename = "checkbox")]
    MultiChoice,
    Rating,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Text => write!(f, "Text"),
            FieldType::SingleChoice => write!(f, "Single choice"),
            FieldType::MultiChoice => write!(f, "Multiple choice"),
            FieldType::Rating => write!(f, "Rating"),
        }
    }
}

/// One question of a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Identifier unique within the form.
    pub id: FieldId,
    /// Question text.
    #[serde(default)]
    pub label: String,
    /// Whether a submission must answer this field.
    #[serde(default)]
    pub required: bool,
    /// Optional input hint shown by clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Type tag and type-specific metadata.
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl Field {
    #[allow(dead_code)] // Builder for programmatic schemas
    pub fn new(id: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            required: false,
            placeholder: None,
            kind,
        }
    }

    /// Mark the field as required.
    #[allow(dead_code)] // Builder for programmatic schemas
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn field_type(&self) -> FieldType {
        self.kind.field_type()
    }

    /// Declared options; empty for non-choice fields.
    pub fn options(&self) -> &[ChoiceOption] {
        match &self.kind {
            FieldKind::SingleChoice { options } | FieldKind::MultiChoice { options } => options,
            _ => &[],
        }
    }

    /// Effective `(min, max)` bounds of a rating field.
    ///
    /// Unset or non-positive bounds fall back to 1 and 5.
    pub fn rating_bounds(&self) -> Option<(i64, i64)> {
        match &self.kind {
            FieldKind::Rating {
                min_rating,
                max_rating,
            } => {
                let min = min_rating.filter(|v| *v > 0).unwrap_or(DEFAULT_MIN_RATING);
                let max = max_rating.filter(|v| *v > 0).unwrap_or(DEFAULT_MAX_RATING);
                Some((min, max))
            }
            _ => None,
        }
    }
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Read a timestamp written either as RFC 3339 text or as Unix seconds.
fn flexible_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Timestamp {
        Seconds(#[serde(deserialize_with = "ts_seconds::deserialize")] DateTime<Utc>),
        Text(DateTime<Utc>),
    }

    match Timestamp::deserialize(deserializer)? {
        Timestamp::Seconds(at) | Timestamp::Text(at) => Ok(at),
    }
}

/// Treat an explicit `null` like a missing value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A form schema: an ordered sequence of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    pub id: FormId,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fields: Vec<Field>,
    #[serde(default = "now", deserialize_with = "flexible_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "now", deserialize_with = "flexible_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Form {
    #[allow(dead_code)] // Builder for programmatic schemas
    pub fn new(id: impl Into<String>, title: impl Into<String>, fields: Vec<Field>) -> Self {
        let created_at = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            fields,
            created_at,
            updated_at: created_at,
        }
    }

    /// Look up a field by id.
    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }
}

/// A typed answer value.
///
/// Single-choice answers are a `Text` holding the option id; multi-choice
/// answers are a `List` of option ids. Integer JSON numbers read as `Number`.
/// Any other stored shape is kept as `Other` and counts as unanswered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Number(f64),
    Text(String),
    List(Vec<String>),
    Other(serde_json::Value),
}

impl Answer {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Answer::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Answer::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Answer::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for Answer {
    fn from(s: &str) -> Self {
        Answer::Text(s.to_string())
    }
}

impl From<f64> for Answer {
    fn from(n: f64) -> Self {
        Answer::Number(n)
    }
}

impl From<Vec<&str>> for Answer {
    fn from(items: Vec<&str>) -> Self {
        Answer::List(items.into_iter().map(String::from).collect())
    }
}

/// Identifier of a stored response.
///
/// The store hands out sequential numbers. Responses exported from other
/// systems keep their string ids (e.g. hex object ids).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseId {
    Assigned(u64),
    Imported(String),
}

impl fmt::Display for ResponseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseId::Assigned(n) => write!(f, "{}", n),
            ResponseId::Imported(id) => write!(f, "{}", id),
        }
    }
}

/// A response that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewResponse {
    pub form_id: FormId,
    pub answers: Answers,
    pub created_at: DateTime<Utc>,
}

impl NewResponse {
    /// A response stamped with the current time.
    pub fn now(form_id: impl Into<String>, answers: Answers) -> Self {
        Self {
            form_id: form_id.into(),
            answers,
            created_at: Utc::now(),
        }
    }
}

/// One respondent's stored answers to a form. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: ResponseId,
    pub form_id: FormId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub answers: Answers,
    #[serde(deserialize_with = "flexible_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Response {
    pub fn answer(&self, field_id: &str) -> Option<&Answer> {
        self.answers.get(field_id)
    }
}

/// Count of one option label in a choice distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionCount {
    pub label: String,
    pub count: usize,
}

/// Type-specific summary of one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldSummary {
    /// Option counts in declared option order.
    Choice { counts: Vec<OptionCount> },
    /// Mean of the valid numeric answers; `None` when nothing was answered.
    Rating {
        #[serde(skip_serializing_if = "Option::is_none")]
        average: Option<f64>,
    },
    /// Most recent non-empty answers, newest first.
    Text {
        #[serde(rename = "recentTexts")]
        recent_texts: Vec<String>,
    },
}

/// Aggregated distribution of one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDistribution {
    pub field_id: FieldId,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub label: String,
    /// Number of responses that answered this field.
    #[serde(rename = "count")]
    pub answered: usize,
    #[serde(flatten)]
    pub summary: FieldSummary,
}

#[allow(dead_code)] // Accessors for callers inspecting a single field
impl FieldDistribution {
    /// Count for an option label, if this is a choice field.
    pub fn option_count(&self, label: &str) -> Option<usize> {
        match &self.summary {
            FieldSummary::Choice { counts } => {
                counts.iter().find(|c| c.label == label).map(|c| c.count)
            }
            _ => None,
        }
    }

    pub fn average(&self) -> Option<f64> {
        match &self.summary {
            FieldSummary::Rating { average } => *average,
            _ => None,
        }
    }

    pub fn recent_texts(&self) -> &[String] {
        match &self.summary {
            FieldSummary::Text { recent_texts } => recent_texts,
            _ => &[],
        }
    }
}

/// Summary of every response to a form, recomputed from scratch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReport {
    pub form_id: FormId,
    pub fields: Vec<FieldDistribution>,
    pub total_responses: usize,
}

impl AggregateReport {
    #[allow(dead_code)] // Accessor for callers inspecting a single field
    pub fn field(&self, field_id: &str) -> Option<&FieldDistribution> {
        self.fields.iter().find(|f| f.field_id == field_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_kind_wire_tags() {
        let json = r#"{
            "id": "f1",
            "type": "multiple_choice",
            "label": "Pick one",
            "required": true,
            "options": [{"id": "a", "label": "A"}, {"id": "b", "label": "B"}]
        }"#;
        let field: Field = serde_json::from_str(json).unwrap();
        assert_eq!(field.field_type(), FieldType::SingleChoice);
        assert!(field.required);
        assert_eq!(field.options().len(), 2);

        let field: Field =
            serde_json::from_str(r#"{"id": "f2", "type": "checkbox", "label": "Many"}"#).unwrap();
        assert_eq!(field.field_type(), FieldType::MultiChoice);
        assert!(field.options().is_empty());

        let field: Field =
            serde_json::from_str(r#"{"id": "f3", "type": "multi_choice", "options": []}"#)
                .unwrap();
        assert_eq!(field.field_type(), FieldType::MultiChoice);
    }

    #[test]
    fn test_rating_bounds_fallback() {
        let field: Field = serde_json::from_str(
            r#"{"id": "r", "type": "rating", "label": "Score", "minRating": 0, "maxRating": 10}"#,
        )
        .unwrap();
        assert_eq!(field.rating_bounds(), Some((1, 10)));

        let field: Field = serde_json::from_str(r#"{"id": "r", "type": "rating"}"#).unwrap();
        assert_eq!(field.rating_bounds(), Some((1, 5)));

        let text = Field::new("t", "Text", FieldKind::Text);
        assert_eq!(text.rating_bounds(), None);
    }

    #[test]
    fn test_answer_shapes() {
        let answers: Answers =
            serde_json::from_str(r#"{"a": 4, "b": 2.5, "c": "hello", "d": ["x", "y"]}"#).unwrap();
        assert_eq!(answers["a"].as_number(), Some(4.0));
        assert_eq!(answers["b"].as_number(), Some(2.5));
        assert_eq!(answers["c"].as_text(), Some("hello"));
        assert_eq!(answers["d"].as_list().map(|l| l.len()), Some(2));
        assert_eq!(answers["c"].as_number(), None);
    }

    #[test]
    fn test_unexpected_answer_shapes_are_kept_as_other() {
        let answers: Answers =
            serde_json::from_str(r#"{"flag": true, "empty": null, "mixed": ["a", 1]}"#).unwrap();
        assert_eq!(answers.len(), 3);
        for answer in answers.values() {
            assert!(matches!(answer, Answer::Other(_)));
            assert_eq!(answer.as_text(), None);
            assert_eq!(answer.as_number(), None);
            assert_eq!(answer.as_list(), None);
        }
    }

    #[test]
    fn test_response_accepts_exported_shape() {
        let response: Response = serde_json::from_str(
            r#"{
                "id": "65a1f0c2e4b0a1b2c3d4e5f6",
                "formId": "f",
                "answers": {"q": "b", "extra": true},
                "createdAt": 1700000000
            }"#,
        )
        .unwrap();
        assert_eq!(
            response.id,
            ResponseId::Imported("65a1f0c2e4b0a1b2c3d4e5f6".to_string())
        );
        assert_eq!(response.created_at.timestamp(), 1_700_000_000);
        assert_eq!(response.answer("q").and_then(|a| a.as_text()), Some("b"));

        let response: Response = serde_json::from_str(
            r#"{"id": 7, "formId": "f", "answers": null, "createdAt": "2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(response.id, ResponseId::Assigned(7));
        assert_eq!(response.id.to_string(), "7");
        assert!(response.answers.is_empty());
        assert_eq!(response.created_at.timestamp(), 1_704_067_200);
    }

    #[test]
    fn test_form_defaults_timestamps() {
        let form: Form = serde_json::from_str(r#"{"id": "form-1", "fields": []}"#).unwrap();
        assert_eq!(form.id, "form-1");
        assert!(form.title.is_empty());
        assert!(form.field("missing").is_none());

        let form: Form = serde_json::from_str(
            r#"{"id": "form-2", "fields": null, "createdAt": 1700000000, "updatedAt": 1700000060}"#,
        )
        .unwrap();
        assert!(form.fields.is_empty());
        assert_eq!(form.created_at.timestamp(), 1_700_000_000);
        assert_eq!(form.updated_at.timestamp(), 1_700_000_060);
    }

    #[test]
    fn test_report_wire_shape() {
        let report = AggregateReport {
            form_id: "form-1".to_string(),
            total_responses: 2,
            fields: vec![
                FieldDistribution {
                    field_id: "color".to_string(),
                    field_type: FieldType::SingleChoice,
                    label: "Color".to_string(),
                    answered: 2,
                    summary: FieldSummary::Choice {
                        counts: vec![OptionCount {
                            label: "Red".to_string(),
                            count: 2,
                        }],
                    },
                },
                FieldDistribution {
                    field_id: "score".to_string(),
                    field_type: FieldType::Rating,
                    label: "Score".to_string(),
                    answered: 0,
                    summary: FieldSummary::Rating { average: None },
                },
            ],
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["formId"], "form-1");
        assert_eq!(value["totalResponses"], 2);
        assert_eq!(value["fields"][0]["type"], "multiple_choice");
        assert_eq!(value["fields"][0]["count"], 2);
        assert_eq!(value["fields"][0]["counts"][0]["label"], "Red");
        assert!(value["fields"][1].get("average").is_none());
        assert_eq!(report.field("color").and_then(|f| f.option_count("Red")), Some(2));
    }
}
