use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ComparisonVerdict, MetricChange, TargetLanguage};

/// A generated narrative persisted for its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSummary {
    pub id: Uuid,
    pub owner_id: String,
    pub language: TargetLanguage,
    pub summary_text: String,
    pub source_filename: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One metric that moved between two reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricHighlight {
    pub metric: String,
    pub change: MetricChange,
    #[serde(default)]
    pub old_value: String,
    #[serde(default)]
    pub new_value: String,
    #[serde(default)]
    pub note: String,
}

/// Outcome of comparing two or more stored summaries, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub verdict: ComparisonVerdict,
    /// Model-reported confidence, clamped to [0, 100].
    pub confidence: u8,
    pub summary: String,
    pub highlights: Vec<MetricHighlight>,
    pub recommendation: String,
    pub compared_ids: Vec<Uuid>,
}
