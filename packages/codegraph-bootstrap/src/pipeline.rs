use crate::config::DimensionCatalog;
use crate::context::{DimensionContext, ProjectInfo, ProjectSnapshot, SubmittedItem};
use crate::dimension::Dimension;
use crate::result::TokenUsage;
use crate::session::RunSession;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything one `run_pipeline` call needs
#[derive(Clone)]
pub struct RunContext {
    pub catalog: DimensionCatalog,
    pub snapshot: ProjectSnapshot,
    pub session: RunSession,
    /// Directory holding checkpoints and the run report
    pub run_root: PathBuf,
    pub progress: Arc<dyn ProgressSink>,
}

impl RunContext {
    pub fn new(
        catalog: DimensionCatalog,
        snapshot: ProjectSnapshot,
        session: RunSession,
        run_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            snapshot,
            session,
            run_root: run_root.into(),
            progress: Arc::new(NoopProgressSink),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ExploreOptions {
    pub session_id: String,
    pub dimension_context: Arc<DimensionContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExploreMetadata {
    pub tool_call_count: usize,
    pub token_usage: TokenUsage,
}

/// Free-text analysis produced by the Explore phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExploreOutput {
    pub analysis_text: String,
    pub referenced_files: Vec<String>,
    pub metadata: ExploreMetadata,
}

#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub session_id: String,
}

/// One tool invocation made by the Formatter while submitting items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatterToolCall {
    pub name: String,
    pub accepted: bool,
    /// Summary of the submitted item, when the tool carried one
    pub item: Option<SubmittedItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatOutput {
    pub candidate_count: usize,
    pub rejected_count: usize,
    pub tool_calls: Vec<FormatterToolCall>,
    /// Final free-text reply; may embed a digest object
    pub reply: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRequest {
    pub name: String,
    pub description: String,
    pub content: String,
    pub overwrite: bool,
    pub created_by: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactOutcome {
    pub success: bool,
    pub message: Option<String>,
}

/// Explore phase agent
#[async_trait]
pub trait Explorer: Send + Sync {
    async fn analyze(
        &self,
        dimension: &Dimension,
        project: &ProjectInfo,
        options: ExploreOptions,
    ) -> anyhow::Result<ExploreOutput>;
}

/// Format phase agent: turns analysis text into submitted candidate items
#[async_trait]
pub trait Formatter: Send + Sync {
    async fn produce(
        &self,
        analysis_report: &str,
        dimension: &Dimension,
        project: &ProjectInfo,
        options: FormatOptions,
    ) -> anyhow::Result<FormatOutput>;
}

/// Sink for derived artifacts of skill-producing dimensions
#[async_trait]
pub trait ArtifactWriter: Send + Sync {
    async fn create(&self, request: ArtifactRequest) -> anyhow::Result<ArtifactOutcome>;
}

/// Progress notifications for a UI or task manager. All methods default to no-ops.
pub trait ProgressSink: Send + Sync {
    fn mark_filling(&self, _dim_id: &str) {}

    fn mark_completed(&self, _dim_id: &str, _payload: serde_json::Value) {}

    fn mark_failed(&self, _dim_id: &str, _error: &str) {}

    fn emit_progress(&self, _event: &str, _data: serde_json::Value) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {}

/// Artifact writer that accepts and discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopArtifactWriter;

#[async_trait]
impl ArtifactWriter for NoopArtifactWriter {
    async fn create(&self, _request: ArtifactRequest) -> anyhow::Result<ArtifactOutcome> {
        Ok(ArtifactOutcome {
            success: true,
            message: None,
        })
    }
}
