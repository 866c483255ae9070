use crate::error::{BootstrapError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Name/description of the derived artifact a skill-producing dimension emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillMeta {
    pub name: String,
    pub description: String,
}

/// What a dimension produces. `Skill` output never reaches the Formatter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "output_type", content = "skill_meta", rename_all = "snake_case")]
pub enum DimensionOutput {
    Candidate,
    Skill(SkillMeta),
    Dual(SkillMeta),
}

impl DimensionOutput {
    pub fn kind(&self) -> OutputType {
        match self {
            DimensionOutput::Candidate => OutputType::Candidate,
            DimensionOutput::Skill(_) => OutputType::Skill,
            DimensionOutput::Dual(_) => OutputType::Dual,
        }
    }

    /// Candidate items come out of the Format phase.
    pub fn produces_candidates(&self) -> bool {
        match self {
            DimensionOutput::Candidate | DimensionOutput::Dual(_) => true,
            DimensionOutput::Skill(_) => false,
        }
    }

    pub fn skill_meta(&self) -> Option<&SkillMeta> {
        match self {
            DimensionOutput::Candidate => None,
            DimensionOutput::Skill(meta) | DimensionOutput::Dual(meta) => Some(meta),
        }
    }
}

/// Flat output type as written in catalog files and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    Candidate,
    Skill,
    Dual,
}

impl OutputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputType::Candidate => "candidate",
            OutputType::Skill => "skill",
            OutputType::Dual => "dual",
        }
    }
}

impl std::fmt::Display for OutputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One independent unit of analysis work. Static for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub id: String,
    pub label: String,
    pub guide: String,
    pub focus_areas: Vec<String>,
    pub allowed_knowledge_types: BTreeSet<String>,
    pub output: DimensionOutput,
}

impl Dimension {
    pub fn candidate(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            guide: String::new(),
            focus_areas: Vec::new(),
            allowed_knowledge_types: BTreeSet::new(),
            output: DimensionOutput::Candidate,
        }
    }

    pub fn with_output(mut self, output: DimensionOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_guide(mut self, guide: impl Into<String>) -> Self {
        self.guide = guide.into();
        self
    }

    pub fn output_type(&self) -> OutputType {
        self.output.kind()
    }
}

/// Per-dimension lifecycle inside one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DimensionState {
    Pending,
    /// Served from a fresh checkpoint; no phase ran.
    Restored,
    Exploring,
    Formatting,
    Digesting,
    Checkpointed,
    Complete,
    Error { reason: String },
}

impl DimensionState {
    pub fn state_name(&self) -> &'static str {
        match self {
            DimensionState::Pending => "pending",
            DimensionState::Restored => "restored",
            DimensionState::Exploring => "exploring",
            DimensionState::Formatting => "formatting",
            DimensionState::Digesting => "digesting",
            DimensionState::Checkpointed => "checkpointed",
            DimensionState::Complete => "complete",
            DimensionState::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DimensionState::Restored | DimensionState::Complete | DimensionState::Error { .. }
        )
    }
}

/// Guards the transitions of [`DimensionState`]
#[derive(Debug)]
pub struct DimensionStateMachine {
    dim_id: String,
    state: DimensionState,
}

impl DimensionStateMachine {
    pub fn new(dim_id: impl Into<String>) -> Self {
        Self {
            dim_id: dim_id.into(),
            state: DimensionState::Pending,
        }
    }

    pub fn state(&self) -> &DimensionState {
        &self.state
    }

    /// Transition: PENDING → RESTORED
    pub fn restore(&mut self) -> Result<()> {
        match self.state {
            DimensionState::Pending => self.set(DimensionState::Restored),
            _ => Err(self.invalid("restored")),
        }
    }

    /// Transition: PENDING → EXPLORING
    pub fn start_explore(&mut self) -> Result<()> {
        match self.state {
            DimensionState::Pending => self.set(DimensionState::Exploring),
            _ => Err(self.invalid("exploring")),
        }
    }

    /// Transition: EXPLORING → FORMATTING | DIGESTING
    pub fn explored(&mut self, format: bool) -> Result<()> {
        match self.state {
            DimensionState::Exploring if format => self.set(DimensionState::Formatting),
            DimensionState::Exploring => self.set(DimensionState::Digesting),
            _ => Err(self.invalid(if format { "formatting" } else { "digesting" })),
        }
    }

    /// Transition: FORMATTING → DIGESTING (taken on formatter failure too)
    pub fn formatted(&mut self) -> Result<()> {
        match self.state {
            DimensionState::Formatting => self.set(DimensionState::Digesting),
            _ => Err(self.invalid("digesting")),
        }
    }

    /// Transition: DIGESTING → CHECKPOINTED
    pub fn checkpointed(&mut self) -> Result<()> {
        match self.state {
            DimensionState::Digesting => self.set(DimensionState::Checkpointed),
            _ => Err(self.invalid("checkpointed")),
        }
    }

    /// Transition: CHECKPOINTED → COMPLETE
    pub fn complete(&mut self) -> Result<()> {
        match self.state {
            DimensionState::Checkpointed => self.set(DimensionState::Complete),
            _ => Err(self.invalid("complete")),
        }
    }

    /// Transition: PENDING | EXPLORING → ERROR
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        match self.state {
            DimensionState::Pending | DimensionState::Exploring => self.set(DimensionState::Error {
                reason: reason.into(),
            }),
            _ => Err(self.invalid("error")),
        }
    }

    fn set(&mut self, next: DimensionState) -> Result<()> {
        tracing::trace!(
            "Dimension {}: {} -> {}",
            self.dim_id,
            self.state.state_name(),
            next.state_name()
        );
        self.state = next;
        Ok(())
    }

    fn invalid(&self, to: &str) -> BootstrapError {
        BootstrapError::InvalidStateTransition {
            dim_id: self.dim_id.clone(),
            from: self.state.state_name().to_string(),
            to: to.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill_meta() -> SkillMeta {
        SkillMeta {
            name: "project-architecture".to_string(),
            description: "How the project is laid out".to_string(),
        }
    }

    #[test]
    fn test_output_routing() {
        assert!(DimensionOutput::Candidate.produces_candidates());
        assert!(DimensionOutput::Dual(skill_meta()).produces_candidates());
        assert!(!DimensionOutput::Skill(skill_meta()).produces_candidates());

        assert!(DimensionOutput::Candidate.skill_meta().is_none());
        assert_eq!(
            DimensionOutput::Skill(skill_meta()).skill_meta().unwrap().name,
            "project-architecture"
        );
    }

    #[test]
    fn test_dimension_serializes_tagged_output() {
        let dim = Dimension::candidate("arch", "Architecture")
            .with_output(DimensionOutput::Dual(skill_meta()));
        let json = serde_json::to_value(&dim).unwrap();

        assert_eq!(json["output"]["output_type"], "dual");
        assert_eq!(json["output"]["skill_meta"]["name"], "project-architecture");

        let back: Dimension = serde_json::from_value(json).unwrap();
        assert_eq!(back, dim);
    }

    #[test]
    fn test_full_happy_path_with_format() {
        let mut sm = DimensionStateMachine::new("arch");
        sm.start_explore().unwrap();
        sm.explored(true).unwrap();
        assert_eq!(sm.state(), &DimensionState::Formatting);
        sm.formatted().unwrap();
        sm.checkpointed().unwrap();
        sm.complete().unwrap();
        assert!(sm.state().is_terminal());
    }

    #[test]
    fn test_skip_format_goes_straight_to_digest() {
        let mut sm = DimensionStateMachine::new("skill-only");
        sm.start_explore().unwrap();
        sm.explored(false).unwrap();
        assert_eq!(sm.state(), &DimensionState::Digesting);
    }

    #[test]
    fn test_restore_is_terminal() {
        let mut sm = DimensionStateMachine::new("arch");
        sm.restore().unwrap();
        assert!(sm.state().is_terminal());
        assert!(sm.start_explore().is_err());
    }

    #[test]
    fn test_cannot_fail_after_formatting() {
        let mut sm = DimensionStateMachine::new("arch");
        sm.start_explore().unwrap();
        sm.explored(true).unwrap();

        let err = sm.fail("late").unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::InvalidStateTransition { ref from, .. } if from == "formatting"
        ));
    }

    #[test]
    fn test_explore_failure() {
        let mut sm = DimensionStateMachine::new("arch");
        sm.start_explore().unwrap();
        sm.fail("explorer timed out after 180s").unwrap();
        match sm.state() {
            DimensionState::Error { reason } => assert!(reason.contains("timed out")),
            other => panic!("Expected Error state, got {:?}", other),
        }
    }
}
