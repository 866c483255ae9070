//! Configuration I/O (YAML schema types)
//!
//! `ConfigFileV1` wraps [`BootstrapConfig`]; `CatalogFileV1` is the on-disk dimension
//! catalog, validated into a [`DimensionCatalog`].

use super::{check_version, BootstrapConfig};
use crate::dimension::{Dimension, DimensionOutput, OutputType, SkillMeta};
use crate::error::{BootstrapError, Result};
use crate::tiers::TierPlan;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Config YAML schema v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileV1 {
    /// Schema version (always 1 for v1)
    pub version: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<BootstrapConfig>,
}

/// Catalog YAML schema v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogFileV1 {
    pub version: Option<u32>,

    pub dimensions: Vec<DimensionEntry>,

    /// Explicit tiers. When absent, tiers are derived from `depends_on`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiers: Option<Vec<Vec<String>>>,
}

/// One dimension as written in the catalog file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DimensionEntry {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub guide: String,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    pub output_type: OutputType,
    #[serde(default)]
    pub allowed_knowledge_types: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_meta: Option<SkillMeta>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl DimensionEntry {
    fn into_dimension(self) -> Result<Dimension> {
        let output = match (self.output_type, self.skill_meta) {
            (OutputType::Candidate, _) => DimensionOutput::Candidate,
            (OutputType::Skill, Some(meta)) => DimensionOutput::Skill(meta),
            (OutputType::Dual, Some(meta)) => DimensionOutput::Dual(meta),
            (kind, None) => {
                return Err(BootstrapError::catalog(format!(
                    "dimension {} has output_type {} but no skill_meta",
                    self.id, kind
                )))
            }
        };

        Ok(Dimension {
            id: self.id,
            label: self.label,
            guide: self.guide,
            focus_areas: self.focus_areas,
            allowed_knowledge_types: self.allowed_knowledge_types,
            output,
        })
    }
}

/// Validated dimension configuration plus its tier plan
#[derive(Debug, Clone)]
pub struct DimensionCatalog {
    dimensions: HashMap<String, Dimension>,
    plan: TierPlan,
}

impl DimensionCatalog {
    /// Every tiered id must have a config and every config must be tiered.
    pub fn new(dimensions: Vec<Dimension>, plan: TierPlan) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(dimensions.len());
        for dim in dimensions {
            if by_id.contains_key(&dim.id) {
                return Err(BootstrapError::DuplicateDimension(dim.id));
            }
            by_id.insert(dim.id.clone(), dim);
        }

        for id in plan.dimension_ids() {
            if !by_id.contains_key(id) {
                return Err(BootstrapError::DimensionNotFound(id.to_string()));
            }
        }

        if plan.dimension_count() != by_id.len() {
            let mut untiered: Vec<&str> = by_id
                .keys()
                .filter(|id| plan.tier_index(id).is_none())
                .map(String::as_str)
                .collect();
            untiered.sort_unstable();
            return Err(BootstrapError::catalog(format!(
                "dimensions not assigned to any tier: {}",
                untiered.join(", ")
            )));
        }

        Ok(Self {
            dimensions: by_id,
            plan,
        })
    }

    pub fn from_yaml(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: CatalogFileV1 =
            serde_yaml::from_str(content).map_err(super::ConfigError::Yaml)?;
        check_version(file.version)?;

        let plan = match file.tiers {
            Some(tiers) => TierPlan::new(tiers)?,
            None => {
                let declared: Vec<(String, Vec<String>)> = file
                    .dimensions
                    .iter()
                    .map(|d| (d.id.clone(), d.depends_on.clone()))
                    .collect();
                TierPlan::from_dependencies(&declared)?
            }
        };

        let dimensions = file
            .dimensions
            .into_iter()
            .map(DimensionEntry::into_dimension)
            .collect::<Result<Vec<_>>>()?;

        Self::new(dimensions, plan)
    }

    pub fn get(&self, dim_id: &str) -> Option<&Dimension> {
        self.dimensions.get(dim_id)
    }

    pub fn plan(&self) -> &TierPlan {
        &self.plan
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Dimensions in tier order
    pub fn iter(&self) -> impl Iterator<Item = &Dimension> {
        self.plan
            .dimension_ids()
            .filter_map(move |id| self.dimensions.get(id))
    }
}
