//! Result envelopes for the tool/API surface.
//!
//! Every operation returns the same envelope shape:
//! `{success, summary, detail, metadata, flags}`, with a `snapshot`
//! projection added for `format = agent`.

use chrono::NaiveDate;
use palisade_risk::Flag;
use serde::{Deserialize, Serialize};

/// Requested response shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Full detail.
    #[default]
    Full,
    /// Summary only; detail elided.
    Summary,
    /// Summary plus a snapshot projection for LLM agents.
    Agent,
}

/// Envelope metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// As-of date of the analysis.
    pub analysis_date: NaiveDate,
    /// Portfolio display name (scope label).
    pub portfolio_name: String,
    /// Owning user.
    pub user_id: String,
    /// Operation that produced the result.
    pub operation: String,
    /// Whether the result came from cache.
    pub cached: bool,
}

/// Compact scalar projection for single-line agent summaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// One-word verdict (e.g., "pass", "violations", "minor_rebalance").
    pub verdict: String,
    /// Scalar metrics, short keys.
    pub metrics: serde_json::Map<String, serde_json::Value>,
    /// Flag messages, severity-ordered.
    pub flags: Vec<String>,
    /// Optional artifact path (exports).
    pub file_path: Option<String>,
}

/// The stable result envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Small summary object.
    pub summary: serde_json::Value,
    /// Full detail object (elided for summary/agent formats).
    pub detail: serde_json::Value,
    /// Envelope metadata.
    pub metadata: ResultMetadata,
    /// Evaluation flags.
    pub flags: Vec<Flag>,
    /// Agent snapshot (`format = agent` only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
}

impl AnalysisResult {
    /// Builds a successful envelope and applies the format projection.
    #[must_use]
    pub fn ok(
        metadata: ResultMetadata,
        summary: serde_json::Value,
        detail: serde_json::Value,
        flags: Vec<Flag>,
        snapshot: Snapshot,
        format: OutputFormat,
    ) -> Self {
        let (detail, snapshot) = match format {
            OutputFormat::Full => (detail, None),
            OutputFormat::Summary => (serde_json::Value::Null, None),
            OutputFormat::Agent => (serde_json::Value::Null, Some(snapshot)),
        };
        Self {
            success: true,
            summary,
            detail,
            metadata,
            flags,
            snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ResultMetadata {
        ResultMetadata {
            analysis_date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            portfolio_name: "all".to_string(),
            user_id: "u1".to_string(),
            operation: "risk_analysis".to_string(),
            cached: false,
        }
    }

    #[test]
    fn test_agent_format_includes_snapshot() {
        let result = AnalysisResult::ok(
            metadata(),
            serde_json::json!({"volatility": 0.12}),
            serde_json::json!({"big": true}),
            Vec::new(),
            Snapshot {
                verdict: "pass".to_string(),
                ..Snapshot::default()
            },
            OutputFormat::Agent,
        );
        assert!(result.snapshot.is_some());
        assert!(result.detail.is_null());
    }

    #[test]
    fn test_full_format_keeps_detail() {
        let result = AnalysisResult::ok(
            metadata(),
            serde_json::json!({}),
            serde_json::json!({"big": true}),
            Vec::new(),
            Snapshot::default(),
            OutputFormat::Full,
        );
        assert!(result.snapshot.is_none());
        assert_eq!(result.detail["big"], serde_json::json!(true));
    }
}
