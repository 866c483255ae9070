use crate::error::{BootstrapError, Result};
use std::collections::{HashMap, HashSet};

/// Ordered tiers of dimension ids.
///
/// Tier N runs only after every dimension of tiers < N has been attempted. A failed
/// predecessor still unblocks its successors: tiers order information flow, they do not
/// gate on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPlan {
    tiers: Vec<Vec<String>>,
}

impl TierPlan {
    /// Create a plan from explicit tiers. Ids must be unique across all tiers.
    pub fn new(tiers: Vec<Vec<String>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for (idx, tier) in tiers.iter().enumerate() {
            if tier.is_empty() {
                return Err(BootstrapError::catalog(format!("tier {} is empty", idx + 1)));
            }
            for id in tier {
                if id.trim().is_empty() {
                    return Err(BootstrapError::catalog(format!(
                        "tier {} contains an empty dimension id",
                        idx + 1
                    )));
                }
                if !seen.insert(id.as_str()) {
                    return Err(BootstrapError::DuplicateDimension(id.clone()));
                }
            }
        }

        Ok(Self { tiers })
    }

    /// Derive tiers from per-dimension dependencies (layered topological sort).
    ///
    /// Every dimension lands in the first tier after all of its dependencies. Within a
    /// tier, ids keep their declaration order so plans are stable across runs.
    pub fn from_dependencies(declared: &[(String, Vec<String>)]) -> Result<Self> {
        let mut order: HashMap<&str, usize> = HashMap::new();
        for (pos, (id, _)) in declared.iter().enumerate() {
            if order.insert(id.as_str(), pos).is_some() {
                return Err(BootstrapError::DuplicateDimension(id.clone()));
            }
        }

        for (id, deps) in declared {
            for dep in deps {
                if !order.contains_key(dep.as_str()) {
                    return Err(BootstrapError::MissingDependency(format!(
                        "Dimension {} depends on non-existent dimension {}",
                        id, dep
                    )));
                }
            }
        }

        let mut in_degree: HashMap<&str, usize> = declared
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();

        let mut tiers = Vec::new();
        let mut processed: HashSet<&str> = HashSet::new();

        while processed.len() < declared.len() {
            let mut ready: Vec<&str> = in_degree
                .iter()
                .filter(|(id, &degree)| degree == 0 && !processed.contains(*id))
                .map(|(&id, _)| id)
                .collect();

            if ready.is_empty() {
                let mut stuck: Vec<&str> = in_degree.keys().copied().collect();
                stuck.sort_by_key(|id| order[id]);
                return Err(BootstrapError::TierCycleDetected(stuck.join(", ")));
            }

            ready.sort_by_key(|id| order[id]);

            for &id in &ready {
                processed.insert(id);
                in_degree.remove(id);
            }

            for (id, deps) in declared {
                if let Some(degree) = in_degree.get_mut(id.as_str()) {
                    *degree -= deps.iter().filter(|d| ready.contains(&d.as_str())).count();
                }
            }

            tiers.push(ready.into_iter().map(str::to_string).collect());
        }

        Self::new(tiers)
    }

    pub fn tiers(&self) -> &[Vec<String>] {
        &self.tiers
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Index of the tier containing `dim_id` (linear search)
    pub fn tier_index(&self, dim_id: &str) -> Option<usize> {
        self.tiers
            .iter()
            .position(|tier| tier.iter().any(|id| id == dim_id))
    }

    pub fn dimension_ids(&self) -> impl Iterator<Item = &str> {
        self.tiers.iter().flatten().map(String::as_str)
    }

    pub fn dimension_count(&self) -> usize {
        self.tiers.iter().map(Vec::len).sum()
    }

    /// Human-readable plan (for logging)
    pub fn execution_plan(&self) -> String {
        self.tiers
            .iter()
            .enumerate()
            .map(|(i, tier)| {
                if tier.len() > 1 {
                    format!("Tier {}: {} (parallel)", i + 1, tier.join(" ∥ "))
                } else {
                    format!("Tier {}: {}", i + 1, tier[0])
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
