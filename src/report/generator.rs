//! Analytics report rendering.
//!
//! This module renders an aggregate report as Markdown for people or as
//! JSON for other tools.

use crate::models::{AggregateReport, FieldDistribution, FieldSummary, Form, OptionCount};
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Width of the share bars in choice tables.
const BAR_WIDTH: usize = 20;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(form: &Form, report: &AggregateReport) -> String {
    let mut output = String::new();

    // Title
    let title = if form.title.is_empty() {
        form.id.as_str()
    } else {
        form.title.as_str()
    };
    output.push_str(&format!("# FormCast Analytics: {}\n\n", title));

    output.push_str(&generate_metadata_section(report, Utc::now()));
    output.push_str(&generate_fields_section(&report.fields));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(report: &AggregateReport, generated_at: DateTime<Utc>) -> String {
    let mut section = String::new();

    section.push_str("## Overview\n\n");
    section.push_str(&format!("- **Form:** `{}`\n", report.form_id));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Total Responses:** {}\n",
        report.total_responses
    ));
    section.push_str(&format!("- **Fields:** {}\n\n", report.fields.len()));

    section
}

/// Generate one subsection per field, in schema order.
fn generate_fields_section(fields: &[FieldDistribution]) -> String {
    let mut section = String::new();

    section.push_str("## Fields\n\n");

    if fields.is_empty() {
        section.push_str("This form has no fields.\n\n");
        return section;
    }

    for field in fields {
        section.push_str(&generate_field_block(field));
    }

    section
}

/// Generate the block for a single field.
fn generate_field_block(field: &FieldDistribution) -> String {
    let mut block = String::new();

    let label = if field.label.is_empty() {
        &field.field_id
    } else {
        &field.label
    };
    block.push_str(&format!("### {}\n\n", label));
    block.push_str(&format!(
        "*{} | Answered: {}*\n\n",
        field.field_type, field.answered
    ));

    match &field.summary {
        FieldSummary::Choice { counts } => {
            block.push_str(&generate_choice_table(counts, field.answered));
        }
        FieldSummary::Rating { average } => match average {
            Some(avg) => block.push_str(&format!("**Average:** {:.2}\n\n", avg)),
            None => block.push_str("**Average:** n/a (no ratings yet)\n\n"),
        },
        FieldSummary::Text { recent_texts } => {
            if recent_texts.is_empty() {
                block.push_str("No answers yet.\n\n");
            } else {
                block.push_str("**Most recent answers:**\n\n");
                for text in recent_texts {
                    block.push_str(&format!("> {}\n\n", text.replace('\n', " ")));
                }
            }
        }
    }

    block
}

/// Render option counts with their share of answered responses.
fn generate_choice_table(counts: &[OptionCount], answered: usize) -> String {
    let mut table = String::new();

    table.push_str("| Option | Count | Share |\n");
    table.push_str("|:---|:---:|:---|\n");

    for option in counts {
        let share = if answered > 0 {
            option.count as f64 / answered as f64
        } else {
            0.0
        };
        // Multi-choice shares can exceed one answer per response.
        let filled = ((share.min(1.0) * BAR_WIDTH as f64).round()) as usize;
        table.push_str(&format!(
            "| {} | {} | {} {:.0}% |\n",
            option.label,
            option.count,
            "█".repeat(filled),
            share * 100.0
        ));
    }
    table.push('\n');

    table
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Generated by FormCast*\n");

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &AggregateReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// One-line summary of a serialized live update.
pub fn summarize_update(payload: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(update) => format!(
            "form {} now at {} responses",
            update["formId"].as_str().unwrap_or("?"),
            update["totalResponses"].as_u64().unwrap_or(0)
        ),
        Err(_) => format!("unreadable update ({} bytes)", payload.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis;
    use crate::models::{Answer, ChoiceOption, Field, FieldKind, Response, ResponseId};

    fn create_test_form() -> Form {
        Form::new(
            "feedback",
            "Customer Feedback",
            vec![
                Field::new(
                    "plan",
                    "Which plan?",
                    FieldKind::SingleChoice {
                        options: vec![
                            ChoiceOption::new("free", "Free"),
                            ChoiceOption::new("pro", "Pro"),
                        ],
                    },
                ),
                Field::new(
                    "stars",
                    "Rate us",
                    FieldKind::Rating {
                        min_rating: None,
                        max_rating: None,
                    },
                ),
                Field::new("notes", "Anything else?", FieldKind::Text),
            ],
        )
    }

    fn create_test_report(form: &Form) -> AggregateReport {
        let responses = vec![Response {
            id: ResponseId::Assigned(1),
            form_id: form.id.clone(),
            answers: [
                ("plan".to_string(), Answer::from("pro")),
                ("notes".to_string(), Answer::from("Great\nservice")),
            ]
            .into_iter()
            .collect(),
            created_at: Utc::now(),
        }];
        analysis::compute(form, &responses)
    }

    #[test]
    fn test_generate_markdown_report() {
        let form = create_test_form();
        let markdown = generate_markdown_report(&form, &create_test_report(&form));

        assert!(markdown.contains("# FormCast Analytics: Customer Feedback"));
        assert!(markdown.contains("## Overview"));
        assert!(markdown.contains("- **Total Responses:** 1"));
        assert!(markdown.contains("### Which plan?"));
        assert!(markdown.contains("| Pro | 1 |"));
        assert!(markdown.contains("| Free | 0 |"));
        assert!(markdown.contains("n/a (no ratings yet)"));
        assert!(markdown.contains("> Great service"));
    }

    #[test]
    fn test_generate_metadata_section() {
        let form = create_test_form();
        let generated_at = DateTime::from_timestamp(0, 0).unwrap();
        let section = generate_metadata_section(&create_test_report(&form), generated_at);

        assert!(section.contains("`feedback`"));
        assert!(section.contains("1970-01-01 00:00:00 UTC"));
        assert!(section.contains("- **Fields:** 3"));
    }

    #[test]
    fn test_choice_table_shares() {
        let counts = vec![
            OptionCount {
                label: "Yes".to_string(),
                count: 3,
            },
            OptionCount {
                label: "No".to_string(),
                count: 1,
            },
        ];
        let table = generate_choice_table(&counts, 4);

        assert!(table.contains("| Yes | 3 |"));
        assert!(table.contains("75%"));
        assert!(table.contains("25%"));
    }

    #[test]
    fn test_generate_json_report() {
        let form = create_test_form();
        let json = generate_json_report(&create_test_report(&form)).unwrap();

        assert!(json.contains("\"formId\""));
        assert!(json.contains("\"totalResponses\": 1"));
        assert!(json.contains("\"recentTexts\""));
    }

    #[test]
    fn test_summarize_update() {
        let line = summarize_update(r#"{"formId": "f", "totalResponses": 7, "fields": []}"#);
        assert_eq!(line, "form f now at 7 responses");
        assert!(summarize_update("not json").starts_with("unreadable update"));
    }
}
