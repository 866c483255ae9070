//! Tiered execution with bounded in-tier parallelism.
//!
//! Tiers run strictly in order with a hard barrier between them. Inside a tier every
//! dimension is its own tokio task gated by a [`DimensionSemaphore`]. Whatever a task
//! does (error, panic) is turned into a [`DimensionResult`], so `execute` never fails.

use crate::error::{BootstrapError, PhaseError, Result};
use crate::result::DimensionResult;
use crate::semaphore::DimensionSemaphore;
use crate::tiers::TierPlan;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{error, info, warn};

/// Polled at tier boundaries and at task start
pub type AbortCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Invoked after each tier's barrier with the tier index and that tier's results
pub type TierCallback = Arc<dyn Fn(usize, &HashMap<String, DimensionResult>) + Send + Sync>;

#[derive(Clone)]
pub struct ExecuteOptions {
    pub concurrency: usize,
    pub should_abort: AbortCheck,
    pub on_tier_complete: Option<TierCallback>,
}

impl ExecuteOptions {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            should_abort: Arc::new(|| false),
            on_tier_complete: None,
        }
    }

    pub fn with_abort<F>(mut self, should_abort: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.should_abort = Arc::new(should_abort);
        self
    }

    pub fn with_tier_callback<F>(mut self, on_tier_complete: F) -> Self
    where
        F: Fn(usize, &HashMap<String, DimensionResult>) + Send + Sync + 'static,
    {
        self.on_tier_complete = Some(Arc::new(on_tier_complete));
        self
    }
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self::new(3)
    }
}

impl std::fmt::Debug for ExecuteOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("concurrency", &self.concurrency)
            .field("on_tier_complete", &self.on_tier_complete.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TierScheduler {
    plan: TierPlan,
}

impl TierScheduler {
    pub fn new(plan: TierPlan) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &TierPlan {
        &self.plan
    }

    /// Configured tiers, in execution order
    pub fn tiers(&self) -> &[Vec<String>] {
        self.plan.tiers()
    }

    pub fn tier_index(&self, dim_id: &str) -> Option<usize> {
        self.plan.tier_index(dim_id)
    }

    /// Run every tier in order and collect one result per attempted dimension.
    ///
    /// Tiers after an abort are absent from the map. Dimensions of the current tier that
    /// see the abort before starting are recorded as skipped.
    pub async fn execute<F, Fut>(
        &self,
        execute_dimension: F,
        options: ExecuteOptions,
    ) -> HashMap<String, DimensionResult>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<DimensionResult>> + Send + 'static,
    {
        let execute_dimension = Arc::new(execute_dimension);
        let semaphore = DimensionSemaphore::new(options.concurrency);
        let mut results = HashMap::with_capacity(self.plan.dimension_count());

        for (tier_index, tier) in self.plan.tiers().iter().enumerate() {
            if (options.should_abort)() {
                info!(
                    "Tier {}: abort requested, skipping {} remaining tier(s)",
                    tier_index + 1,
                    self.plan.len() - tier_index
                );
                break;
            }

            info!(
                "Tier {}: {} dimensions{}",
                tier_index + 1,
                tier.len(),
                if tier.len() > 1 { " (parallel)" } else { "" }
            );

            let tier_results =
                Self::execute_tier(tier, &execute_dimension, &semaphore, &options).await;

            let failed = tier_results.values().filter(|r| r.is_error()).count();
            info!(
                "Tier {} complete: {} ok, {} failed (peak {} concurrent)",
                tier_index + 1,
                tier_results.len() - failed,
                failed,
                semaphore.peak_holders()
            );

            results.extend(tier_results.iter().map(|(k, v)| (k.clone(), v.clone())));

            if let Some(callback) = &options.on_tier_complete {
                callback(tier_index, &tier_results);
            }
        }

        results
    }

    async fn execute_tier<F, Fut>(
        tier: &[String],
        execute_dimension: &Arc<F>,
        semaphore: &DimensionSemaphore,
        options: &ExecuteOptions,
    ) -> HashMap<String, DimensionResult>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<DimensionResult>> + Send + 'static,
    {
        let mut tasks = Vec::with_capacity(tier.len());
        for dim_id in tier {
            let dim_id = dim_id.clone();
            let execute_dimension = Arc::clone(execute_dimension);
            let semaphore = semaphore.clone();
            let should_abort = Arc::clone(&options.should_abort);

            tasks.push(tokio::spawn(async move {
                if should_abort() {
                    return DimensionResult::skipped();
                }

                let permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => return DimensionResult::failed(e.to_string()),
                };

                if should_abort() {
                    return DimensionResult::skipped();
                }

                let result = match execute_dimension(dim_id.clone()).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!("Dimension {} failed: {}", dim_id, e);
                        failure_result(e)
                    }
                };

                permit.release();
                result
            }));
        }

        // Barrier: every task of this tier settles before the next tier starts.
        let settled = futures::future::join_all(tasks).await;

        tier.iter()
            .cloned()
            .zip(settled)
            .map(|(dim_id, task_result)| {
                let result = task_result.unwrap_or_else(|join_err| {
                    let err = panic_to_phase_error(join_err);
                    error!("Dimension {} panicked: {}", dim_id, err);
                    DimensionResult::phase_failed(&err)
                });
                (dim_id, result)
            })
            .collect()
    }
}

/// Run one dimension on its own task so a panic is contained the same way as in a tier.
pub(crate) async fn run_isolated<Fut>(dim_id: &str, fut: Fut) -> DimensionResult
where
    Fut: Future<Output = Result<DimensionResult>> + Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            warn!("Dimension {} failed: {}", dim_id, e);
            failure_result(e)
        }
        Err(join_err) => {
            let err = panic_to_phase_error(join_err);
            error!("Dimension {} panicked: {}", dim_id, err);
            DimensionResult::phase_failed(&err)
        }
    }
}

fn failure_result(err: BootstrapError) -> DimensionResult {
    match err {
        BootstrapError::Phase(phase) => DimensionResult::phase_failed(&phase),
        other => DimensionResult::failed(other.to_string()),
    }
}

fn panic_to_phase_error(join_err: JoinError) -> PhaseError {
    if !join_err.is_panic() {
        return PhaseError::Panicked(join_err.to_string());
    }

    let payload = join_err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    PhaseError::Panicked(message)
}
