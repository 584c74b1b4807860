//! Comparison of two or more stored summaries of the same owner.

use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{DatabaseError, SummaryStore};
use crate::models::{
    ComparisonResult, ComparisonVerdict, MetricChange, MetricHighlight, StoredSummary,
};
use crate::pipeline::narrative::{NarrativeClient, NarrativeError};

#[derive(Error, Debug)]
pub enum ComparisonError {
    #[error("At least two distinct reports are required, got {0}")]
    TooFewReports(usize),

    #[error("Report not found: {0}")]
    NotFound(Uuid),

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Narrative service error: {0}")]
    Narrative(#[from] NarrativeError),

    #[error("Unparseable comparison response: {0}")]
    Parse(String),
}

const COMPARISON_SYSTEM_PROMPT: &str = "\
You are an expert doctor comparing a patient's medical reports over time.
The reports are given oldest first.

Respond with ONLY a JSON object, no prose before or after, with exactly these keys:
{
  \"verdict\": \"improved\" | \"deteriorated\" | \"stable\",
  \"confidence\": integer 0-100,
  \"summary\": \"two or three plain sentences for the patient\",
  \"highlights\": [
    {\"metric\": \"name\", \"change\": \"improved\" | \"deteriorated\" | \"stable\",
     \"oldValue\": \"value in the earliest report\", \"newValue\": \"value in the latest report\",
     \"note\": \"one short sentence\"}
  ],
  \"recommendation\": \"one plain sentence on what to do next\"
}
";

/// Compare stored summaries, oldest first, through the narrative service.
pub fn compare_reports(
    store: &dyn SummaryStore,
    client: &dyn NarrativeClient,
    ids: &[Uuid],
    owner_id: &str,
) -> Result<ComparisonResult, ComparisonError> {
    let mut unique: Vec<Uuid> = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(id) {
            unique.push(*id);
        }
    }
    if unique.len() < 2 {
        return Err(ComparisonError::TooFewReports(unique.len()));
    }

    if let Some(missing) = first_missing(store, &unique, owner_id)? {
        return Err(ComparisonError::NotFound(missing));
    }

    let mut summaries = Vec::with_capacity(unique.len());
    for id in &unique {
        let summary = store
            .get(id, owner_id)?
            .ok_or(ComparisonError::NotFound(*id))?;
        summaries.push(summary);
    }
    summaries.sort_by_key(|s| s.created_at);

    tracing::info!(reports = summaries.len(), "Comparing stored summaries");
    let response = client.complete(COMPARISON_SYSTEM_PROMPT, &build_comparison_message(&summaries))?;

    let mut result = parse_comparison_response(&response)?;
    result.compared_ids = summaries.iter().map(|s| s.id).collect();
    Ok(result)
}

fn first_missing(
    store: &dyn SummaryStore,
    ids: &[Uuid],
    owner_id: &str,
) -> Result<Option<Uuid>, DatabaseError> {
    for id in ids {
        if !store.exists(id, owner_id)? {
            return Ok(Some(*id));
        }
    }
    Ok(None)
}

fn build_comparison_message(summaries: &[StoredSummary]) -> String {
    let mut message = String::from("Compare the following reports:\n");
    for (i, summary) in summaries.iter().enumerate() {
        message.push_str(&format!(
            "\n--- REPORT {} ({}, {}) ---\n{}\n",
            i + 1,
            summary.created_at.format("%Y-%m-%d"),
            summary.language,
            summary.summary_text.trim()
        ));
    }
    message
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawComparison {
    verdict: String,
    #[serde(default)]
    confidence: serde_json::Value,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    highlights: Vec<serde_json::Value>,
    #[serde(default)]
    recommendation: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHighlight {
    metric: String,
    change: String,
    #[serde(default)]
    old_value: serde_json::Value,
    #[serde(default)]
    new_value: serde_json::Value,
    #[serde(default)]
    note: String,
}

/// Parse the model's JSON verdict. Fenced or bare JSON is accepted;
/// malformed highlight entries are skipped.
pub fn parse_comparison_response(response: &str) -> Result<ComparisonResult, ComparisonError> {
    let json = extract_json_block(response)
        .ok_or_else(|| ComparisonError::Parse("no JSON object in response".into()))?;
    let raw: RawComparison =
        serde_json::from_str(json).map_err(|e| ComparisonError::Parse(e.to_string()))?;

    let verdict = parse_verdict(&raw.verdict)
        .ok_or_else(|| ComparisonError::Parse(format!("unknown verdict: {}", raw.verdict)))?;

    let highlights = raw
        .highlights
        .into_iter()
        .filter_map(|v| serde_json::from_value::<RawHighlight>(v).ok())
        .filter_map(|h| {
            Some(MetricHighlight {
                metric: h.metric,
                change: parse_change(&h.change)?,
                old_value: value_text(&h.old_value),
                new_value: value_text(&h.new_value),
                note: h.note,
            })
        })
        .collect();

    Ok(ComparisonResult {
        verdict,
        confidence: parse_confidence(&raw.confidence),
        summary: raw.summary,
        highlights,
        recommendation: raw.recommendation,
        compared_ids: Vec::new(),
    })
}

/// Extract a JSON object from LLM response text, with or without a
/// markdown fence.
fn extract_json_block(response: &str) -> Option<&str> {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.find("```") {
            return Some(after_fence[..end].trim());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            let block = after_fence[..end].trim();
            if block.starts_with('{') {
                return Some(block);
            }
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&trimmed[start..=end]),
        _ => None,
    }
}

fn parse_verdict(raw: &str) -> Option<ComparisonVerdict> {
    match raw.trim().to_lowercase().as_str() {
        "improved" | "improving" | "better" => Some(ComparisonVerdict::Improved),
        "deteriorated" | "deteriorating" | "worsened" | "worse" => {
            Some(ComparisonVerdict::Deteriorated)
        }
        "stable" | "unchanged" | "normal" | "normal/stable" => Some(ComparisonVerdict::Stable),
        _ => None,
    }
}

fn parse_change(raw: &str) -> Option<MetricChange> {
    parse_verdict(raw).map(|v| match v {
        ComparisonVerdict::Improved => MetricChange::Improved,
        ComparisonVerdict::Deteriorated => MetricChange::Deteriorated,
        ComparisonVerdict::Stable => MetricChange::Stable,
    })
}

/// Numbers or strings like `"85%"`, clamped to `0..=100`. Anything else is 0.
fn parse_confidence(value: &serde_json::Value) -> u8 {
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    };
    number
        .filter(|n| n.is_finite())
        .map(|n| n.round().clamp(0.0, 100.0) as u8)
        .unwrap_or(0)
}

fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
