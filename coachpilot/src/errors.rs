use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of an [`AutomationError`], used for reporting and
/// for deciding what the executor may retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Stale,
    Obstructed,
    Timeout,
    InvalidData,
    LoginFailed,
    NavigationFailed,
    InvalidSelector,
    InvalidArgument,
    Platform,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Stale => "stale",
            ErrorKind::Obstructed => "obstructed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidData => "invalid_data",
            ErrorKind::LoginFailed => "login_failed",
            ErrorKind::NavigationFailed => "navigation_failed",
            ErrorKind::InvalidSelector => "invalid_selector",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Platform => "platform",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Element went stale before the action completed: {0}")]
    ElementStale(String),

    #[error("Element is obscured by another element: {0}")]
    ElementObscured(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Scraped data did not match the expected pattern: {0}")]
    InvalidData(String),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AutomationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AutomationError::ElementNotFound(_) => ErrorKind::NotFound,
            AutomationError::ElementStale(_) => ErrorKind::Stale,
            AutomationError::ElementObscured(_) => ErrorKind::Obstructed,
            AutomationError::Timeout(_) => ErrorKind::Timeout,
            AutomationError::InvalidData(_) => ErrorKind::InvalidData,
            AutomationError::LoginFailed(_) => ErrorKind::LoginFailed,
            AutomationError::NavigationFailed(_) => ErrorKind::NavigationFailed,
            AutomationError::InvalidSelector(_) => ErrorKind::InvalidSelector,
            AutomationError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            AutomationError::PlatformError(_) => ErrorKind::Platform,
            AutomationError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether another executor attempt can reasonably succeed.
    ///
    /// Session-level failures (login, navigation) and caller mistakes are
    /// never retried; everything the page can recover from on its own is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AutomationError::ElementNotFound(_)
                | AutomationError::ElementStale(_)
                | AutomationError::ElementObscured(_)
                | AutomationError::Timeout(_)
                | AutomationError::PlatformError(_)
                | AutomationError::InvalidSelector(_)
        )
    }

    /// Session-level failures that make every downstream step pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AutomationError::LoginFailed(_) | AutomationError::NavigationFailed(_)
        )
    }
}

/// Returned by the executor once every attempt of a plan has been used up.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("'{plan}' failed after {attempts} attempt(s): {reason}")]
pub struct ExecutionFailure {
    pub plan: String,
    pub reason: String,
    /// Every distinct strategy that was tried, in first-tried order.
    pub strategies_tried: Vec<String>,
    pub last_error: Option<AutomationError>,
    pub attempts: u32,
}

impl ExecutionFailure {
    pub fn kind(&self) -> Option<ErrorKind> {
        self.last_error.as_ref().map(AutomationError::kind)
    }

    pub fn is_fatal(&self) -> bool {
        self.last_error
            .as_ref()
            .is_some_and(AutomationError::is_fatal)
    }
}

/// A workflow step that could not be completed, labeled with the stage it
/// failed in.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("{stage}: {failure}")]
    Action {
        stage: String,
        failure: ExecutionFailure,
    },

    #[error("{stage}: verification marker '{marker}' did not appear")]
    Gate { stage: String, marker: String },

    #[error("{stage}: nothing on screen matched '{target}'")]
    Unresolved { stage: String, target: String },

    #[error("{stage}: {source}")]
    Automation {
        stage: String,
        #[source]
        source: AutomationError,
    },

    #[error("persistence: {0}")]
    Persistence(String),
}

impl WorkflowError {
    pub fn automation(stage: impl Into<String>, source: AutomationError) -> Self {
        WorkflowError::Automation {
            stage: stage.into(),
            source,
        }
    }

    pub fn stage(&self) -> Option<&str> {
        match self {
            WorkflowError::Action { stage, .. }
            | WorkflowError::Gate { stage, .. }
            | WorkflowError::Unresolved { stage, .. }
            | WorkflowError::Automation { stage, .. } => Some(stage),
            WorkflowError::Persistence(_) => None,
        }
    }

    /// Fatal errors abort the whole batch; everything else is reported per
    /// item and the run continues.
    pub fn is_fatal(&self) -> bool {
        match self {
            WorkflowError::Action { failure, .. } => failure.is_fatal(),
            WorkflowError::Automation { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProgressionError {
    #[error("equipment catalog is empty")]
    EmptyCatalog,

    #[error("invalid weight in equipment profile: {0}")]
    InvalidWeight(f64),

    #[error("increment must be positive, got {0}")]
    InvalidIncrement(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(AutomationError::ElementStale("row".into()).is_retryable());
        assert!(AutomationError::ElementObscured("modal".into()).is_retryable());
        assert!(!AutomationError::LoginFailed("bad password".into()).is_retryable());
        assert!(AutomationError::NavigationFailed("dns".into()).is_fatal());
        assert!(!AutomationError::InvalidData("cell".into()).is_fatal());
    }

    #[test]
    fn test_workflow_error_fatality_follows_cause() {
        let failure = ExecutionFailure {
            plan: "submit login".into(),
            reason: "gave up".into(),
            strategies_tried: vec![],
            last_error: Some(AutomationError::LoginFailed("rejected".into())),
            attempts: 1,
        };
        let err = WorkflowError::Action {
            stage: "login".into(),
            failure,
        };
        assert!(err.is_fatal());
        assert_eq!(err.stage(), Some("login"));

        let gate = WorkflowError::Gate {
            stage: "Saving".into(),
            marker: "Saved".into(),
        };
        assert!(!gate.is_fatal());
    }
}
