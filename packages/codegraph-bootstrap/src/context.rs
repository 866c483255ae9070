//! Run-scoped knowledge accumulator.
//!
//! Later tiers read what earlier tiers found instead of re-deriving it. Writes are keyed
//! by `dim_id`, and each dimension writes its own key only, so concurrent siblings never
//! contend on the same entry. There is no removal API; the context is dropped with the run.

use crate::digest::DimensionDigest;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

/// Module-level import graph as produced by the dependency analyzer
pub type DependencyGraph = HashMap<String, Vec<String>>;

/// One collected source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub content: String,
}

/// Read-only facts about the project, collected before the run starts
#[derive(Debug, Clone, Default)]
pub struct ProjectSnapshot {
    pub name: String,
    pub root: PathBuf,
    pub primary_language: String,
    pub files: Vec<SourceFile>,
    pub module_names: Vec<String>,
    pub dependency_graph: Option<Arc<DependencyGraph>>,
    pub code_metrics: Option<serde_json::Value>,
    pub audit_summary: Option<serde_json::Value>,
}

impl ProjectSnapshot {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            ..Default::default()
        }
    }

    /// Lightweight view handed to the Explorer/Formatter
    pub fn info(&self) -> ProjectInfo {
        ProjectInfo {
            name: self.name.clone(),
            root: self.root.clone(),
            primary_language: self.primary_language.clone(),
            file_count: self.files.len(),
            module_count: self.module_names.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    pub root: PathBuf,
    pub primary_language: String,
    pub file_count: usize,
    pub module_count: usize,
}

/// Summary of an item the Formatter accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedItem {
    pub title: String,
    pub sub_topic: String,
    pub summary: String,
}

pub struct DimensionContext {
    project_name: String,
    primary_language: String,
    file_count: usize,
    module_names: Vec<String>,
    dependency_graph: Option<Arc<DependencyGraph>>,
    code_metrics: Option<serde_json::Value>,
    audit_summary: Option<serde_json::Value>,
    digests: DashMap<String, DimensionDigest>,
    submitted: DashMap<String, Vec<SubmittedItem>>,
}

impl DimensionContext {
    pub fn new(snapshot: &ProjectSnapshot) -> Self {
        Self {
            project_name: snapshot.name.clone(),
            primary_language: snapshot.primary_language.clone(),
            file_count: snapshot.files.len(),
            module_names: snapshot.module_names.clone(),
            dependency_graph: snapshot.dependency_graph.clone(),
            code_metrics: snapshot.code_metrics.clone(),
            audit_summary: snapshot.audit_summary.clone(),
            digests: DashMap::new(),
            submitted: DashMap::new(),
        }
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn primary_language(&self) -> &str {
        &self.primary_language
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }

    pub fn module_count(&self) -> usize {
        self.module_names.len()
    }

    pub fn module_names(&self) -> &[String] {
        &self.module_names
    }

    pub fn dependency_graph(&self) -> Option<&DependencyGraph> {
        self.dependency_graph.as_deref()
    }

    pub fn code_metrics(&self) -> Option<&serde_json::Value> {
        self.code_metrics.as_ref()
    }

    pub fn audit_summary(&self) -> Option<&serde_json::Value> {
        self.audit_summary.as_ref()
    }

    pub fn add_dimension_digest(&self, dim_id: &str, digest: DimensionDigest) {
        self.digests.insert(dim_id.to_string(), digest);
    }

    pub fn add_submitted_candidate(&self, dim_id: &str, item: SubmittedItem) {
        self.submitted
            .entry(dim_id.to_string())
            .or_default()
            .push(item);
    }

    pub fn digest(&self, dim_id: &str) -> Option<DimensionDigest> {
        self.digests.get(dim_id).map(|d| d.value().clone())
    }

    /// Snapshot of all digests recorded so far, ordered by dimension id
    pub fn digests(&self) -> BTreeMap<String, DimensionDigest> {
        self.digests
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn submitted_for(&self, dim_id: &str) -> Vec<SubmittedItem> {
        self.submitted
            .get(dim_id)
            .map(|items| items.value().clone())
            .unwrap_or_default()
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.iter().map(|entry| entry.value().len()).sum()
    }
}

impl std::fmt::Debug for DimensionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DimensionContext")
            .field("project_name", &self.project_name)
            .field("digests", &self.digests.len())
            .field("submitted", &self.submitted_count())
            .finish()
    }
}
