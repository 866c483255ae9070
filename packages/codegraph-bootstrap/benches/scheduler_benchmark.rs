//! Benchmark for tier scheduler overhead
//!
//! Measures:
//! - Scheduling cost of a wide single tier at different concurrency limits
//! - Full orchestrator run with instant in-memory agents

use async_trait::async_trait;
use codegraph_bootstrap::{
    Dimension, DimensionCatalog, DimensionResult, ExecuteOptions, ExploreOptions, ExploreOutput,
    Explorer, FormatOptions, FormatOutput, Formatter, InMemoryCheckpointStore,
    PipelineOrchestrator, ProjectInfo, ProjectSnapshot, RunContext, RunSession, TierPlan,
    TierScheduler,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

struct InstantExplorer;

#[async_trait]
impl Explorer for InstantExplorer {
    async fn analyze(
        &self,
        dimension: &Dimension,
        _project: &ProjectInfo,
        _options: ExploreOptions,
    ) -> anyhow::Result<ExploreOutput> {
        Ok(ExploreOutput {
            analysis_text: format!("{} findings. ", dimension.id).repeat(20),
            ..Default::default()
        })
    }
}

struct InstantFormatter;

#[async_trait]
impl Formatter for InstantFormatter {
    async fn produce(
        &self,
        _analysis_report: &str,
        _dimension: &Dimension,
        _project: &ProjectInfo,
        _options: FormatOptions,
    ) -> anyhow::Result<FormatOutput> {
        Ok(FormatOutput {
            candidate_count: 1,
            ..Default::default()
        })
    }
}

fn tiers(num_tiers: usize, width: usize) -> Vec<Vec<String>> {
    (0..num_tiers)
        .map(|t| (0..width).map(|d| format!("t{}-d{}", t, d)).collect())
        .collect()
}

/// Benchmark one wide tier under different concurrency limits
fn bench_wide_tier(c: &mut Criterion) {
    let mut group = c.benchmark_group("wide_tier_64");
    let rt = tokio::runtime::Runtime::new().unwrap();

    for concurrency in [1usize, 4, 16].iter() {
        let scheduler = TierScheduler::new(TierPlan::new(tiers(1, 64)).unwrap());
        group.bench_with_input(
            BenchmarkId::from_parameter(concurrency),
            concurrency,
            |b, &concurrency| {
                b.to_async(&rt).iter(|| async {
                    let results = scheduler
                        .execute(
                            |_id| async {
                                tokio::task::yield_now().await;
                                Ok(DimensionResult::default())
                            },
                            ExecuteOptions::new(concurrency),
                        )
                        .await;
                    black_box(results);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark a full run (4 tiers x 8 dimensions) with instant agents
fn bench_full_run(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let run_root = tempfile::tempdir().unwrap();

    let plan = TierPlan::new(tiers(4, 8)).unwrap();
    let dimensions = plan
        .dimension_ids()
        .map(|id| Dimension::candidate(id, id))
        .collect();
    let catalog = DimensionCatalog::new(dimensions, plan).unwrap();

    c.bench_function("full_run_4x8", |b| {
        b.to_async(&rt).iter(|| async {
            let orchestrator = PipelineOrchestrator::new(
                Arc::new(InstantExplorer),
                Arc::new(InstantFormatter),
                Default::default(),
            )
            .with_checkpoint_store(Arc::new(InMemoryCheckpointStore::default()));

            let ctx = RunContext::new(
                catalog.clone(),
                ProjectSnapshot::new("bench", run_root.path()),
                RunSession::detached("bench"),
                run_root.path(),
            );
            let outcome = orchestrator.run_pipeline(ctx).await.expect("run failed");
            black_box(outcome.report.totals);
        });
    });
}

criterion_group!(benches, bench_wide_tier, bench_full_run);
criterion_main!(benches);
