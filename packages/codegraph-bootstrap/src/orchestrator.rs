use crate::checkpoint::{Checkpoint, CheckpointStore, FsCheckpointStore};
use crate::config::{BootstrapConfig, DimensionCatalog, ExecutionMode};
use crate::context::{DimensionContext, ProjectInfo};
use crate::digest::{DigestParser, DimensionDigest, JsonDigestParser};
use crate::dimension::{Dimension, DimensionStateMachine};
use crate::error::{BootstrapError, PhaseError, Result};
use crate::pipeline::{
    ArtifactRequest, ArtifactWriter, ExploreOptions, ExploreOutput, Explorer, FormatOptions,
    Formatter, NoopArtifactWriter, ProgressSink, RunContext,
};
use crate::report::RunReport;
use crate::result::DimensionResult;
use crate::scheduler::{run_isolated, ExecuteOptions, TierCallback, TierScheduler};
use crate::session::RunSession;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// What a finished (or aborted) run hands back to the caller
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub results: HashMap<String, DimensionResult>,
    /// Artifact emission failures; they never affect `results`
    pub artifact_errors: Vec<PhaseError>,
    /// Knowledge accumulated during the run (digests, submitted items)
    pub context: Arc<DimensionContext>,
    /// `None` when the run was aborted or the report could not be written
    pub report_path: Option<PathBuf>,
}

impl RunOutcome {
    /// The session was no longer current once execution stopped. This is also true when
    /// the supersede landed after the last tier settled and every dimension finished; the
    /// report is still not written and checkpoints are left for the newer session.
    pub fn aborted(&self) -> bool {
        self.report.aborted
    }
}

/// Drives a full bootstrap run: checkpoint restore, tiered execution, aggregation,
/// artifact emission and checkpoint cleanup.
pub struct PipelineOrchestrator {
    explorer: Arc<dyn Explorer>,
    formatter: Arc<dyn Formatter>,
    artifacts: Arc<dyn ArtifactWriter>,
    digest_parser: Arc<dyn DigestParser>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: BootstrapConfig,
}

impl PipelineOrchestrator {
    /// Filesystem checkpoints with the configured TTL, JSON digest parsing, artifacts discarded.
    pub fn new(
        explorer: Arc<dyn Explorer>,
        formatter: Arc<dyn Formatter>,
        config: BootstrapConfig,
    ) -> Self {
        Self {
            explorer,
            formatter,
            artifacts: Arc::new(NoopArtifactWriter),
            digest_parser: Arc::new(JsonDigestParser),
            checkpoints: Arc::new(FsCheckpointStore::new(config.checkpoint_ttl())),
            config,
        }
    }

    pub fn with_artifact_writer(mut self, artifacts: Arc<dyn ArtifactWriter>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_digest_parser(mut self, parser: Arc<dyn DigestParser>) -> Self {
        self.digest_parser = parser;
        self
    }

    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = store;
        self
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Execute every configured dimension (main entry point).
    ///
    /// Per-dimension failures are isolated into the results. `Err` is only returned for
    /// infrastructural problems such as an invalid configuration.
    pub async fn run_pipeline(&self, ctx: RunContext) -> Result<RunOutcome> {
        self.config.validate()?;

        let started_at = Utc::now();
        let start_time = Instant::now();
        let session_id = ctx.session.id().to_string();
        let plan = ctx.catalog.plan().clone();

        info!(
            "Starting bootstrap session {} for {} - {} dimensions in {} tiers ({} mode)",
            session_id,
            ctx.snapshot.name,
            ctx.catalog.len(),
            plan.len(),
            self.config.mode
        );
        info!("Execution plan:\n{}", plan.execution_plan());

        let restored = self.checkpoints.load_all(&ctx.run_root).await;
        if !restored.is_empty() {
            info!(
                "Resuming from checkpoint - {} dimensions already completed",
                restored.len()
            );
        }

        let context = Arc::new(DimensionContext::new(&ctx.snapshot));
        let runner = Arc::new(DimensionRunner {
            catalog: ctx.catalog.clone(),
            project: ctx.snapshot.info(),
            session: ctx.session.clone(),
            run_root: ctx.run_root.clone(),
            progress: Arc::clone(&ctx.progress),
            context: Arc::clone(&context),
            restored,
            explore_outputs: DashMap::new(),
            explorer: Arc::clone(&self.explorer),
            formatter: Arc::clone(&self.formatter),
            digest_parser: Arc::clone(&self.digest_parser),
            checkpoints: Arc::clone(&self.checkpoints),
            config: self.config.clone(),
        });

        let scheduler = TierScheduler::new(plan);
        let on_tier_complete = Self::tier_progress(Arc::clone(&ctx.progress));

        let results = match self.config.mode {
            ExecutionMode::Tiered => {
                let session = ctx.session.clone();
                let options = ExecuteOptions {
                    concurrency: self.config.effective_concurrency(),
                    should_abort: Arc::new(move || !session.is_valid()),
                    on_tier_complete: Some(on_tier_complete),
                };
                let tier_runner = Arc::clone(&runner);
                scheduler
                    .execute(
                        move |dim_id| Arc::clone(&tier_runner).run(dim_id),
                        options,
                    )
                    .await
            }
            ExecutionMode::Sequential => {
                Self::run_sequential(&scheduler, &runner, &ctx.session, &on_tier_complete).await
            }
        };

        let duration_ms = start_time.elapsed().as_millis() as u64;
        let aborted = !ctx.session.is_valid();
        let report = RunReport::build(
            &ctx.snapshot.name,
            &session_id,
            self.config.mode,
            &ctx.catalog,
            &results,
            started_at,
            duration_ms,
            aborted,
        );

        if aborted {
            // A newer session owns the run root now; leave report and checkpoints to it.
            warn!(
                "Session {} superseded after {} dimensions, stopping early",
                session_id,
                results.len()
            );
            return Ok(RunOutcome {
                report,
                results,
                artifact_errors: Vec::new(),
                context,
                report_path: None,
            });
        }

        let report_path = match report.write(&ctx.run_root).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Failed to write run report: {}", e);
                None
            }
        };

        let artifact_errors = self.emit_artifacts(&runner, &session_id).await;

        if let Err(e) = self.checkpoints.clear_all(&ctx.run_root).await {
            warn!("Failed to clear checkpoints: {}", e);
        }

        info!(
            "Session {} completed - {} candidates, {} skills, {} errors, {} restored in {}ms",
            session_id,
            report.totals.candidates,
            report.totals.skills,
            report.totals.errors,
            report.totals.restored,
            duration_ms
        );
        ctx.progress.emit_progress(
            "bootstrap:complete",
            json!({
                "sessionId": session_id,
                "totals": report.totals,
                "artifactErrors": artifact_errors.len(),
            }),
        );

        Ok(RunOutcome {
            report,
            results,
            artifact_errors,
            context,
            report_path,
        })
    }

    fn tier_progress(progress: Arc<dyn ProgressSink>) -> TierCallback {
        Arc::new(move |tier_index: usize, tier_results: &HashMap<String, DimensionResult>| {
            let mut dimensions: Vec<&String> = tier_results.keys().collect();
            dimensions.sort();
            let errors = tier_results.values().filter(|r| r.is_error()).count();
            progress.emit_progress(
                "bootstrap:tier-complete",
                json!({
                    "tier": tier_index + 1,
                    "dimensions": dimensions,
                    "errors": errors,
                }),
            );
        })
    }

    /// One dimension at a time, tier by tier, with the same isolation and abort checks
    /// as the tiered scheduler.
    async fn run_sequential(
        scheduler: &TierScheduler,
        runner: &Arc<DimensionRunner>,
        session: &RunSession,
        on_tier_complete: &TierCallback,
    ) -> HashMap<String, DimensionResult> {
        let mut results = HashMap::new();

        for (tier_index, tier) in scheduler.tiers().iter().enumerate() {
            if !session.is_valid() {
                info!("Tier {}: abort requested, stopping", tier_index + 1);
                break;
            }

            let mut tier_results = HashMap::with_capacity(tier.len());
            for dim_id in tier {
                let result = if session.is_valid() {
                    run_isolated(dim_id, Arc::clone(runner).run(dim_id.clone())).await
                } else {
                    DimensionResult::skipped()
                };
                tier_results.insert(dim_id.clone(), result);
            }

            on_tier_complete(tier_index, &tier_results);
            results.extend(tier_results);
        }

        results
    }

    /// Hand every skill-producing dimension's analysis to the artifact writer.
    async fn emit_artifacts(&self, runner: &DimensionRunner, session_id: &str) -> Vec<PhaseError> {
        let mut failures = Vec::new();

        for dimension in runner.catalog.iter() {
            let Some(meta) = dimension.output.skill_meta() else {
                continue;
            };
            let Some(content) = runner
                .explore_outputs
                .get(&dimension.id)
                .map(|explore| artifact_document(dimension, explore.value(), session_id))
            else {
                continue;
            };

            let request = ArtifactRequest {
                name: meta.name.clone(),
                description: meta.description.clone(),
                content,
                overwrite: true,
                created_by: self.config.artifact_created_by.clone(),
            };

            let failure = match self.artifacts.create(request).await {
                Ok(outcome) if outcome.success => None,
                Ok(outcome) => Some(
                    outcome
                        .message
                        .unwrap_or_else(|| "writer reported failure".to_string()),
                ),
                Err(e) => Some(e.to_string()),
            };

            match failure {
                None => info!("Artifact {} emitted for {}", meta.name, dimension.id),
                Some(reason) => {
                    warn!("Artifact emission failed for {}: {}", dimension.id, reason);
                    failures.push(PhaseError::ArtifactEmission {
                        dim_id: dimension.id.clone(),
                        reason,
                    });
                }
            }
        }

        failures
    }
}

/// Markdown document built from a dimension's raw analysis
fn artifact_document(dimension: &Dimension, explore: &ExploreOutput, session_id: &str) -> String {
    let mut doc = format!("# {}\n\n", dimension.label);
    doc.push_str(&format!(
        "> Derived from analysis of {} referenced file(s) during bootstrap session {}.\n\n",
        explore.referenced_files.len(),
        session_id
    ));
    doc.push_str(explore.analysis_text.trim());
    doc.push('\n');

    if !explore.referenced_files.is_empty() {
        doc.push_str("\n## Referenced files\n\n");
        for file in &explore.referenced_files {
            doc.push_str(&format!("- `{}`\n", file));
        }
    }
    doc
}

/// Run-scoped state shared by every dimension task
struct DimensionRunner {
    catalog: DimensionCatalog,
    project: ProjectInfo,
    session: RunSession,
    run_root: PathBuf,
    progress: Arc<dyn ProgressSink>,
    context: Arc<DimensionContext>,
    restored: HashMap<String, Checkpoint>,
    /// Explore output of skill-producing dimensions, kept for artifact emission
    explore_outputs: DashMap<String, ExploreOutput>,
    explorer: Arc<dyn Explorer>,
    formatter: Arc<dyn Formatter>,
    digest_parser: Arc<dyn DigestParser>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: BootstrapConfig,
}

impl DimensionRunner {
    #[instrument(skip(self), fields(session = %self.session.id()))]
    async fn run(self: Arc<Self>, dim_id: String) -> Result<DimensionResult> {
        let dimension = self
            .catalog
            .get(&dim_id)
            .cloned()
            .ok_or_else(|| BootstrapError::DimensionNotFound(dim_id.clone()))?;
        let mut sm = DimensionStateMachine::new(&dim_id);

        if !self.session.is_valid() {
            let err = PhaseError::SessionSuperseded;
            sm.fail(err.to_string())?;
            info!("Dimension {}: {}", dim_id, err);
            return Ok(DimensionResult::phase_failed(&err));
        }

        if let Some(checkpoint) = self.restored.get(&dim_id) {
            sm.restore()?;
            return Ok(self.restore(&dim_id, checkpoint));
        }

        self.progress.mark_filling(&dim_id);
        let start_time = Instant::now();

        // Explore
        sm.start_explore()?;
        let explore = match self.explore(&dimension).await {
            Ok(explore) => explore,
            Err(err) => {
                sm.fail(err.to_string())?;
                warn!("Dimension {}: {}", dim_id, err);
                self.progress.mark_failed(&dim_id, &err.to_string());
                return Ok(DimensionResult {
                    duration_ms: start_time.elapsed().as_millis() as u64,
                    ..DimensionResult::phase_failed(&err)
                });
            }
        };

        let analysis_chars = explore.analysis_text.chars().count();
        let should_format = dimension.output.produces_candidates()
            && analysis_chars >= self.config.min_analysis_chars;
        sm.explored(should_format)?;

        // Format
        let mut candidate_count = 0;
        let mut rejected_count = 0;
        let mut formatter_calls = 0;
        let mut reply = None;
        if should_format {
            match self.format(&dimension, &explore.analysis_text).await {
                Ok(output) => {
                    candidate_count = output.candidate_count;
                    rejected_count = output.rejected_count;
                    formatter_calls = output.tool_calls.len();
                    for call in output.tool_calls.into_iter().filter(|c| c.accepted) {
                        if let Some(item) = call.item {
                            self.context.add_submitted_candidate(&dim_id, item);
                        }
                    }
                    reply = Some(output.reply);
                }
                Err(err) => {
                    // Analysis is kept; the dimension still digests and checkpoints.
                    warn!("Dimension {}: {}, continuing with 0 candidates", dim_id, err);
                }
            }
            sm.formatted()?;
        }

        // Digest
        let digest = reply
            .as_deref()
            .and_then(|reply| self.digest_parser.parse(reply))
            .map(|mut digest| {
                digest.candidate_count = candidate_count;
                digest
            })
            .unwrap_or_else(|| {
                DimensionDigest::fallback(
                    &explore.analysis_text,
                    candidate_count,
                    self.config.digest_summary_chars,
                )
            });
        self.context.add_dimension_digest(&dim_id, digest.clone());

        let result = DimensionResult {
            candidate_count,
            rejected_count,
            analysis_chars,
            referenced_files: explore.referenced_files.len(),
            duration_ms: start_time.elapsed().as_millis() as u64,
            tool_call_count: explore.metadata.tool_call_count + formatter_calls,
            token_usage: explore.metadata.token_usage,
            ..Default::default()
        };

        if dimension.output.skill_meta().is_some() {
            self.explore_outputs.insert(dim_id.clone(), explore);
        }

        // Checkpoint
        if let Err(e) = self
            .checkpoints
            .save(
                &self.run_root,
                self.session.id(),
                &dim_id,
                &result,
                Some(&digest),
            )
            .await
        {
            error!("Dimension {}: checkpoint write failed: {}", dim_id, e);
        }
        sm.checkpointed()?;
        sm.complete()?;

        info!(
            "Dimension {} completed - {} candidates, {} rejected, {} chars in {}ms",
            dim_id, result.candidate_count, result.rejected_count, analysis_chars, result.duration_ms
        );
        self.progress.mark_completed(
            &dim_id,
            json!({
                "candidateCount": result.candidate_count,
                "rejectedCount": result.rejected_count,
                "analysisChars": result.analysis_chars,
                "referencedFiles": result.referenced_files,
                "durationMs": result.duration_ms,
            }),
        );

        Ok(result)
    }

    fn restore(&self, dim_id: &str, checkpoint: &Checkpoint) -> DimensionResult {
        if let Some(digest) = &checkpoint.digest {
            self.context.add_dimension_digest(dim_id, digest.clone());
        }

        info!(
            "Dimension {}: restored from checkpoint ({} candidates, session {})",
            dim_id, checkpoint.result.candidate_count, checkpoint.session_id
        );
        self.progress.emit_progress(
            "bootstrap:dimension-restored",
            json!({
                "dimId": dim_id,
                "candidateCount": checkpoint.result.candidate_count,
                "completedAt": checkpoint.completed_at,
            }),
        );
        self.progress.mark_completed(
            dim_id,
            json!({
                "candidateCount": checkpoint.result.candidate_count,
                "restored": true,
            }),
        );

        checkpoint.result.clone().restored()
    }

    async fn explore(&self, dimension: &Dimension) -> std::result::Result<ExploreOutput, PhaseError> {
        let deadline = self.config.explore_timeout();
        let options = ExploreOptions {
            session_id: self.session.id().to_string(),
            dimension_context: Arc::clone(&self.context),
        };

        match tokio::time::timeout(
            deadline,
            self.explorer.analyze(dimension, &self.project, options),
        )
        .await
        {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(PhaseError::ExplorerFailed(e.to_string())),
            Err(_) => Err(PhaseError::ExplorerTimeout(deadline)),
        }
    }

    async fn format(
        &self,
        dimension: &Dimension,
        analysis: &str,
    ) -> std::result::Result<crate::pipeline::FormatOutput, PhaseError> {
        let deadline = self.config.format_timeout();
        let options = FormatOptions {
            session_id: self.session.id().to_string(),
        };

        match tokio::time::timeout(
            deadline,
            self.formatter
                .produce(analysis, dimension, &self.project, options),
        )
        .await
        {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(PhaseError::FormatterFailed(e.to_string())),
            Err(_) => Err(PhaseError::FormatterTimeout(deadline)),
        }
    }
}
