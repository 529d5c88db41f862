use crate::errors::{AutomationError, WorkflowError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Stages of the program/workout builder. Each forward move is only taken
/// after the previous stage's verification marker has been seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowState {
    Listing,
    Selected,
    TypeChosen,
    Naming,
    Building,
    Saving,
    Done,
    /// The stage that was being entered when a gate failed.
    Failed(Stage),
}

/// Non-terminal stages, used to label a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Listing,
    Selected,
    TypeChosen,
    Naming,
    Building,
    Saving,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Failed(stage) => write!(f, "Failed({stage})"),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

impl WorkflowState {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            WorkflowState::Listing => Some(Stage::Listing),
            WorkflowState::Selected => Some(Stage::Selected),
            WorkflowState::TypeChosen => Some(Stage::TypeChosen),
            WorkflowState::Naming => Some(Stage::Naming),
            WorkflowState::Building => Some(Stage::Building),
            WorkflowState::Saving => Some(Stage::Saving),
            WorkflowState::Done => Some(Stage::Done),
            WorkflowState::Failed(_) => None,
        }
    }

    /// The only state this one may advance to.
    pub fn next(&self) -> Option<WorkflowState> {
        match self {
            WorkflowState::Listing => Some(WorkflowState::Selected),
            WorkflowState::Selected => Some(WorkflowState::TypeChosen),
            WorkflowState::TypeChosen => Some(WorkflowState::Naming),
            WorkflowState::Naming => Some(WorkflowState::Building),
            WorkflowState::Building => Some(WorkflowState::Saving),
            WorkflowState::Saving => Some(WorkflowState::Done),
            WorkflowState::Done | WorkflowState::Failed(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Done | WorkflowState::Failed(_))
    }
}

impl From<Stage> for WorkflowState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Listing => WorkflowState::Listing,
            Stage::Selected => WorkflowState::Selected,
            Stage::TypeChosen => WorkflowState::TypeChosen,
            Stage::Naming => WorkflowState::Naming,
            Stage::Building => WorkflowState::Building,
            Stage::Saving => WorkflowState::Saving,
            Stage::Done => WorkflowState::Done,
        }
    }
}

/// Tracks one run through the builder stages and refuses to skip or
/// revisit any of them.
#[derive(Debug, Clone)]
pub struct WorkflowMachine {
    name: String,
    state: WorkflowState,
    trail: Vec<WorkflowState>,
}

impl WorkflowMachine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: WorkflowState::Listing,
            trail: vec![WorkflowState::Listing],
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn trail(&self) -> &[WorkflowState] {
        &self.trail
    }

    /// The stage currently being worked towards: the state after this one.
    pub fn pending_stage(&self) -> Option<Stage> {
        self.state.next().and_then(|s| s.stage())
    }

    /// Move to `to` once its gate has passed.
    pub fn advance(&mut self, to: Stage) -> Result<(), WorkflowError> {
        let target = WorkflowState::from(to);
        if self.state.next() != Some(target) {
            return Err(WorkflowError::automation(
                to.to_string(),
                AutomationError::Internal(format!(
                    "workflow '{}' cannot move from {} to {}",
                    self.name, self.state, target
                )),
            ));
        }
        info!(workflow = %self.name, from = %self.state, to = %target, "Stage passed");
        self.state = target;
        self.trail.push(target);
        Ok(())
    }

    /// Abandon the run during the work of the stage it is currently in.
    pub fn fail_in_progress(&mut self) {
        if let Some(stage) = self.state.stage() {
            self.fail(stage);
        }
    }

    /// Abandon the run while trying to enter `stage`.
    pub fn fail(&mut self, stage: Stage) {
        if self.state.is_terminal() {
            return;
        }
        warn!(workflow = %self.name, at = %self.state, stage = %stage, "Workflow abandoned");
        self.state = WorkflowState::Failed(stage);
        self.trail.push(self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_happy_path() {
        let mut machine = WorkflowMachine::new("Push A");
        for stage in [
            Stage::Selected,
            Stage::TypeChosen,
            Stage::Naming,
            Stage::Building,
            Stage::Saving,
            Stage::Done,
        ] {
            assert_eq!(machine.pending_stage(), Some(stage));
            machine.advance(stage).unwrap();
        }
        assert_eq!(machine.state(), WorkflowState::Done);
        assert_eq!(machine.trail().len(), 7);
        assert!(machine.pending_stage().is_none());
    }

    #[test]
    fn test_cannot_skip_a_stage() {
        let mut machine = WorkflowMachine::new("Push A");
        let err = machine.advance(Stage::Naming).unwrap_err();
        assert_eq!(err.stage(), Some("Naming"));
        assert_eq!(machine.state(), WorkflowState::Listing);
    }

    #[test]
    fn test_failure_is_terminal() {
        let mut machine = WorkflowMachine::new("Push A");
        machine.advance(Stage::Selected).unwrap();
        machine.fail(Stage::TypeChosen);
        assert_eq!(machine.state(), WorkflowState::Failed(Stage::TypeChosen));
        assert!(machine.advance(Stage::TypeChosen).is_err());
        machine.fail(Stage::Naming);
        assert_eq!(machine.state(), WorkflowState::Failed(Stage::TypeChosen));
        assert_eq!(machine.state().to_string(), "Failed(TypeChosen)");
    }

    #[test]
    fn test_failure_during_stage_work_keeps_that_stage() {
        let mut machine = WorkflowMachine::new("Push A");
        for stage in [Stage::Selected, Stage::TypeChosen, Stage::Naming, Stage::Building] {
            machine.advance(stage).unwrap();
        }
        machine.fail_in_progress();
        assert_eq!(machine.state(), WorkflowState::Failed(Stage::Building));
        assert_eq!(machine.trail().last(), Some(&WorkflowState::Failed(Stage::Building)));

        machine.fail_in_progress();
        assert_eq!(machine.trail().len(), 6);
    }
}
