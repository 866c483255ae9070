//! Run-level aggregation and the `bootstrap-report.json` summary.

use crate::config::{DimensionCatalog, ExecutionMode};
use crate::dimension::OutputType;
use crate::error::{FailureKind, Result};
use crate::result::{DimensionResult, TokenUsage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::info;

pub const REPORT_FILE: &str = "bootstrap-report.json";

/// Per-dimension line of the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionStats {
    pub label: String,
    pub output_type: OutputType,
    pub tier: Option<usize>,
    #[serde(flatten)]
    pub result: DimensionResult,
}

/// Sums over every result of the run, restored ones included
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub dimensions: usize,
    pub candidates: usize,
    pub rejected: usize,
    /// Skill/Dual dimensions that finished without error
    pub skills: usize,
    pub errors: usize,
    /// Subset of `errors` caused by an Explorer or Formatter deadline
    pub timeouts: usize,
    pub restored: usize,
    pub skipped: usize,
    pub tool_calls: usize,
    pub token_usage: TokenUsage,
}

impl RunTotals {
    pub fn aggregate(
        catalog: &DimensionCatalog,
        results: &HashMap<String, DimensionResult>,
    ) -> Self {
        let mut totals = RunTotals {
            dimensions: results.len(),
            ..Default::default()
        };

        for (dim_id, result) in results {
            totals.candidates += result.candidate_count;
            totals.rejected += result.rejected_count;
            totals.tool_calls += result.tool_call_count;
            totals.token_usage += result.token_usage;

            if result.is_error() {
                totals.errors += 1;
            }
            if result.failure_kind == Some(FailureKind::Timeout) {
                totals.timeouts += 1;
            }
            if result.restored_from_checkpoint {
                totals.restored += 1;
            }
            if result.skipped {
                totals.skipped += 1;
            }

            let skill_output = catalog
                .get(dim_id)
                .map_or(false, |d| d.output.skill_meta().is_some());
            if skill_output && !result.is_error() && !result.skipped {
                totals.skills += 1;
            }
        }

        totals
    }
}

/// Summary written once per run under the run root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub project: String,
    pub session_id: String,
    pub mode: ExecutionMode,
    pub tier_count: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub aborted: bool,
    pub totals: RunTotals,
    /// Dimensions served from a checkpoint instead of running, sorted
    pub restored: Vec<String>,
    pub dimensions: BTreeMap<String, DimensionStats>,
}

impl RunReport {
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        project: &str,
        session_id: &str,
        mode: ExecutionMode,
        catalog: &DimensionCatalog,
        results: &HashMap<String, DimensionResult>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        aborted: bool,
    ) -> Self {
        let dimensions = results
            .iter()
            .map(|(dim_id, result)| {
                let (label, output_type) = catalog
                    .get(dim_id)
                    .map(|d| (d.label.clone(), d.output_type()))
                    .unwrap_or_else(|| (dim_id.clone(), OutputType::Candidate));
                let stats = DimensionStats {
                    label,
                    output_type,
                    tier: catalog.plan().tier_index(dim_id),
                    result: result.clone(),
                };
                (dim_id.clone(), stats)
            })
            .collect();

        let mut restored: Vec<String> = results
            .iter()
            .filter(|(_, result)| result.restored_from_checkpoint)
            .map(|(dim_id, _)| dim_id.clone())
            .collect();
        restored.sort();

        Self {
            project: project.to_string(),
            session_id: session_id.to_string(),
            mode,
            tier_count: catalog.plan().len(),
            started_at,
            duration_ms,
            aborted,
            totals: RunTotals::aggregate(catalog, results),
            restored,
            dimensions,
        }
    }

    pub fn path(run_root: &Path) -> PathBuf {
        run_root.join(REPORT_FILE)
    }

    /// Write to `<run_root>/bootstrap-report.json`, replacing any previous report.
    pub async fn write(&self, run_root: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(run_root).await?;
        let path = Self::path(run_root);
        let bytes = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(&path, bytes).await?;

        info!(
            "Run report written to {} ({} candidates, {} errors)",
            path.display(),
            self.totals.candidates,
            self.totals.errors
        );
        Ok(path)
    }

    pub async fn read(run_root: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(Self::path(run_root)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
