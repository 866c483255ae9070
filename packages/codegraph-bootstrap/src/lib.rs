/*
 * Codegraph Bootstrap - Tiered Knowledge Extraction Scheduler
 *
 * Runs a catalog of analysis dimensions through a two-phase agent pipeline
 * (Explore -> Format) and accumulates what they find for later tiers.
 *
 * Architecture:
 * - Tier Scheduler (ordered tiers, bounded parallelism inside a tier)
 * - Dimension State Machine (Explore -> Format -> Digest -> Checkpoint)
 * - Checkpoint/Resume System (per-dimension, 1h freshness window)
 * - Run Sessions (a newer run cooperatively cancels an older one)
 * - Run Report + Skill Artifact Emission
 *
 * Agents, persistence of submitted knowledge and artifact storage are
 * collaborators plugged in through the traits in `pipeline`.
 */

// Public modules
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod digest;
pub mod dimension;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod result;
pub mod scheduler;
pub mod semaphore;
pub mod session;
pub mod telemetry;
pub mod tiers;

// Re-exports
pub use checkpoint::{Checkpoint, CheckpointStore, FsCheckpointStore, InMemoryCheckpointStore};
pub use config::{BootstrapConfig, ConfigError, DimensionCatalog, ExecutionMode};
pub use context::{DimensionContext, ProjectInfo, ProjectSnapshot, SourceFile, SubmittedItem};
pub use digest::{DigestParser, DimensionDigest, JsonDigestParser};
pub use dimension::{
    Dimension, DimensionOutput, DimensionState, DimensionStateMachine, OutputType, SkillMeta,
};
pub use error::{BootstrapError, FailureKind, PhaseError, Result};
pub use orchestrator::{PipelineOrchestrator, RunOutcome};
pub use pipeline::{
    ArtifactOutcome, ArtifactRequest, ArtifactWriter, ExploreMetadata, ExploreOptions,
    ExploreOutput, Explorer, FormatOptions, FormatOutput, Formatter, FormatterToolCall,
    NoopArtifactWriter, NoopProgressSink, ProgressSink, RunContext,
};
pub use report::{DimensionStats, RunReport, RunTotals};
pub use result::{DimensionResult, TokenUsage};
pub use scheduler::{ExecuteOptions, TierScheduler};
pub use semaphore::{DimensionPermit, DimensionSemaphore};
pub use session::{RunSession, SessionRegistry};
pub use tiers::TierPlan;
