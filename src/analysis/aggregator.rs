//! Per-field aggregation of form responses.
//!
//! Every report is recomputed from the full response set. Answers with an
//! unexpected shape or an unknown option id count as "not answered"; they
//! never make the computation fail.

use crate::models::{
    AggregateReport, ChoiceOption, Field, FieldDistribution, FieldKind, FieldSummary, FieldType,
    Form, OptionCount, Response,
};
use std::collections::HashMap;

/// Maximum number of answers in a text field preview.
pub const RECENT_TEXT_LIMIT: usize = 10;

/// Compute the aggregate report of `form` over `responses`.
///
/// `responses` must be in storage read order; it breaks timestamp ties in
/// the text previews. The result is deterministic for a given input.
pub fn compute(form: &Form, responses: &[Response]) -> AggregateReport {
    // Sorted once, shared by every text field.
    let by_recency = if form.fields.iter().any(|f| f.field_type() == FieldType::Text) {
        newest_first(responses)
    } else {
        Vec::new()
    };

    let fields = form
        .fields
        .iter()
        .map(|field| match &field.kind {
            FieldKind::SingleChoice { options } => single_choice(field, options, responses),
            FieldKind::MultiChoice { options } => multi_choice(field, options, responses),
            FieldKind::Rating { .. } => rating(field, responses),
            FieldKind::Text => text(field, &by_recency),
        })
        .collect();

    AggregateReport {
        form_id: form.id.clone(),
        fields,
        total_responses: responses.len(),
    }
}

/// Responses ordered by creation time, newest first.
///
/// The sort is stable: responses with equal timestamps keep their read order.
pub fn newest_first(responses: &[Response]) -> Vec<&Response> {
    let mut sorted: Vec<&Response> = responses.iter().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted
}

/// Zero-initialised counters keyed by option label, in declared order.
struct ChoiceTally<'a> {
    labels: Vec<&'a str>,
    counts: Vec<usize>,
    slot_by_id: HashMap<&'a str, usize>,
}

impl<'a> ChoiceTally<'a> {
    fn new(options: &'a [ChoiceOption]) -> Self {
        let mut labels: Vec<&str> = Vec::with_capacity(options.len());
        let mut slot_by_id = HashMap::with_capacity(options.len());

        for option in options {
            let slot = match labels.iter().position(|l| *l == option.label) {
                Some(slot) => slot,
                None => {
                    labels.push(&option.label);
                    labels.len() - 1
                }
            };
            slot_by_id.entry(option.id.as_str()).or_insert(slot);
        }

        Self {
            counts: vec![0; labels.len()],
            labels,
            slot_by_id,
        }
    }

    /// Count one option id. Returns false for unknown ids.
    fn record(&mut self, option_id: &str) -> bool {
        match self.slot_by_id.get(option_id) {
            Some(&slot) => {
                self.counts[slot] += 1;
                true
            }
            None => false,
        }
    }

    fn into_summary(self) -> FieldSummary {
        let counts = self
            .labels
            .into_iter()
            .zip(self.counts)
            .map(|(label, count)| OptionCount {
                label: label.to_string(),
                count,
            })
            .collect();
        FieldSummary::Choice { counts }
    }
}

fn distribution(field: &Field, answered: usize, summary: FieldSummary) -> FieldDistribution {
    FieldDistribution {
        field_id: field.id.clone(),
        field_type: field.field_type(),
        label: field.label.clone(),
        answered,
        summary,
    }
}

fn single_choice(field: &Field, options: &[ChoiceOption], responses: &[Response]) -> FieldDistribution {
    let mut tally = ChoiceTally::new(options);
    let answered = responses
        .iter()
        .filter_map(|r| r.answer(&field.id).and_then(|a| a.as_text()))
        .filter(|id| tally.record(id))
        .count();

    distribution(field, answered, tally.into_summary())
}

fn multi_choice(field: &Field, options: &[ChoiceOption], responses: &[Response]) -> FieldDistribution {
    let mut tally = ChoiceTally::new(options);
    let mut answered = 0;

    for ids in responses
        .iter()
        .filter_map(|r| r.answer(&field.id).and_then(|a| a.as_list()))
    {
        answered += 1;
        for id in ids {
            tally.record(id);
        }
    }

    distribution(field, answered, tally.into_summary())
}

fn rating(field: &Field, responses: &[Response]) -> FieldDistribution {
    let (sum, count) = responses
        .iter()
        .filter_map(|r| r.answer(&field.id).and_then(|a| a.as_number()))
        .fold((0.0_f64, 0_usize), |(sum, count), v| (sum + v, count + 1));

    let average = (count > 0).then(|| sum / count as f64);
    distribution(field, count, FieldSummary::Rating { average })
}

fn text(field: &Field, by_recency: &[&Response]) -> FieldDistribution {
    let mut answered = 0;
    let mut recent_texts = Vec::new();

    for s in by_recency
        .iter()
        .filter_map(|r| r.answer(&field.id).and_then(|a| a.as_text()))
        .filter(|s| !s.is_empty())
    {
        answered += 1;
        if recent_texts.len() < RECENT_TEXT_LIMIT {
            recent_texts.push(s.to_string());
        }
    }

    distribution(field, answered, FieldSummary::Text { recent_texts })
}
