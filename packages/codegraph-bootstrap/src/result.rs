use crate::error::{FailureKind, PhaseError};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output }
    }

    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input += rhs.input;
        self.output += rhs.output;
    }
}

/// Outcome of one dimension in one run. Built once, never mutated after it is returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionResult {
    pub candidate_count: usize,
    pub rejected_count: usize,
    pub analysis_chars: usize,
    pub referenced_files: usize,
    pub duration_ms: u64,
    pub tool_call_count: usize,
    pub token_usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub restored_from_checkpoint: bool,
}

impl DimensionResult {
    /// `{error, candidate_count: 0}`
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            failure_kind: Some(FailureKind::Failed),
            ..Default::default()
        }
    }

    /// Like [`DimensionResult::failed`], bucketed by the phase error's kind
    pub fn phase_failed(err: &PhaseError) -> Self {
        Self {
            error: Some(err.to_string()),
            failure_kind: Some(err.kind()),
            ..Default::default()
        }
    }

    /// Dimension never started because the run was aborted.
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Copy of a cached result flagged as restored
    pub fn restored(mut self) -> Self {
        self.restored_from_checkpoint = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_failed_result_has_zero_candidates() {
        let result = DimensionResult::failed("boom");
        assert_eq!(result.candidate_count, 0);
        assert!(result.is_error());
        assert!(!result.skipped);
        assert_eq!(result.failure_kind, Some(FailureKind::Failed));
    }

    #[test]
    fn test_phase_failure_keeps_kind() {
        let err = PhaseError::FormatterTimeout(Duration::from_secs(120));
        let result = DimensionResult::phase_failed(&err);
        assert_eq!(result.error.as_deref(), Some("formatter timed out after 120s"));
        assert_eq!(result.failure_kind, Some(FailureKind::Timeout));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["failure_kind"], "timeout");
    }

    #[test]
    fn test_token_usage_accumulates() {
        let mut total = TokenUsage::default();
        total += TokenUsage::new(100, 20);
        total += TokenUsage::new(5, 1);
        assert_eq!(total, TokenUsage::new(105, 21));
        assert_eq!(total.total(), 126);
    }

    #[test]
    fn test_flags_omitted_when_false() {
        let json = serde_json::to_value(DimensionResult::default()).unwrap();
        assert!(json.get("error").is_none());
        assert!(json.get("failure_kind").is_none());
        assert!(json.get("skipped").is_none());
        assert!(json.get("restored_from_checkpoint").is_none());

        let json = serde_json::to_value(DimensionResult::skipped()).unwrap();
        assert_eq!(json["skipped"], true);
    }
}
