//! Error handling module for setupflow
//!
//! Provides the error taxonomy of the installation engine using thiserror.
//! Each layer has its own typed error; `SetupError` is the umbrella type that
//! crosses layer boundaries and reaches front-ends.
//!
//! | Type | Meaning | Recovery |
//! |------|---------|----------|
//! | `BuildError` | Malformed workflow graph | Fatal, before any session starts |
//! | `ValidationError` | A state's input is invalid | Recoverable, re-prompt |
//! | `TransitionError` | Action not available from the current state | Programming/UI error |
//! | `InstallError` | A component failed to install | Retry, else rollback |
//! | `ElevationError` | Privileges denied or unavailable | Fatal |
//! | `RollbackError` | Compensating actions failed | Logged, never replaces the original error |
//! | `RegistrationWarning` | Post-install step failed | Logged, non-fatal |

use crate::dfa::{Action, StateId};
use crate::stage::StageTransitionError;
use std::fmt;
use thiserror::Error;

/// Main error type for setupflow
#[derive(Error, Debug)]
pub enum SetupError {
    /// Workflow graph could not be built
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// User input rejected by a validation gate
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Requested action is not available
    #[error("Transition error: {0}")]
    Transition(#[from] TransitionError),

    /// A component failed to install
    #[error("Install error: {0}")]
    Install(#[from] InstallError),

    /// Privilege elevation failed or was refused
    #[error("Elevation error: {0}")]
    Elevation(#[from] ElevationError),

    /// Rollback could not undo everything
    #[error("Rollback error: {0}")]
    Rollback(#[from] RollbackError),

    /// Platform layer failure
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Orchestration stage sequence violated
    #[error("Stage error: {0}")]
    Stage(#[from] StageTransitionError),

    /// Pre-install checks failed (nothing was started)
    #[error("Pre-install check failed: {0}")]
    PreCheck(String),

    /// OS registration failed after a successful install
    #[error("OS registration failed: {0}")]
    Registration(String),

    /// The front-end reported a failure
    #[error("View error: {0}")]
    View(String),

    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session cancelled by the user
    #[error("Installation cancelled")]
    Cancelled,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for setupflow operations
pub type Result<T> = std::result::Result<T, SetupError>;

impl SetupError {
    /// Create a pre-check error
    pub fn precheck(msg: impl Into<String>) -> Self {
        Self::PreCheck(msg.into())
    }

    /// Create a registration error
    pub fn registration(msg: impl Into<String>) -> Self {
        Self::Registration(msg.into())
    }

    /// Create a view error
    pub fn view(msg: impl Into<String>) -> Self {
        Self::View(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns true if the session can continue after this error by re-prompting.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Malformed workflow graph, detected before a session starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("state '{0}' is declared twice")]
    DuplicateState(StateId),

    #[error("state '{0}' is not declared")]
    UnknownState(StateId),

    #[error("transition {from} --{action}--> {to} targets an undeclared state")]
    DanglingTarget {
        from: StateId,
        action: Action,
        to: StateId,
    },

    #[error("no initial state declared")]
    NoInitialState,

    #[error("more than one initial state declared: {}", join_states(.0))]
    MultipleInitialStates(Vec<StateId>),

    #[error("no final state declared")]
    NoFinalState,

    #[error("final state '{0}' is unreachable from the initial state")]
    UnreachableFinal(StateId),

    #[error("non-final state '{0}' has no outgoing transition")]
    DeadEnd(StateId),

    #[error("state '{state}' has both a static and a dynamic transition for {action}")]
    ConflictingTransition { state: StateId, action: Action },

    #[error("cannot splice between '{after}' and '{before}': no static edge connects them")]
    SpliceEdgeMissing { after: StateId, before: StateId },

    #[error("no wizard provider registered as '{0}'")]
    UnknownProvider(String),
}

fn join_states(states: &[StateId]) -> String {
    states
        .iter()
        .map(StateId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// State-local input error. Blocks a transition; the user may retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Requested action is not available from the current state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("no transition for {action} from state '{state}'")]
    NoSuchTransition { state: StateId, action: Action },

    #[error("{action} is not permitted in state '{state}'")]
    NotPermitted { state: StateId, action: Action },

    #[error("cannot go back: history is empty")]
    EmptyHistory,

    #[error("state '{from}' resolved to undeclared state '{to}'")]
    UnknownTarget { from: StateId, to: StateId },

    #[error("the workflow has not been started")]
    NotStarted,

    #[error("the session has already ended")]
    SessionEnded,
}

/// A component failed to install.
///
/// Rollback failures that happened while compensating are carried along as
/// warnings so they reach the final failure report without masking the cause.
#[derive(Error, Debug)]
#[error("component '{component}' failed: {message}")]
pub struct InstallError {
    pub component: String,
    pub message: String,
    pub rollback_failures: Vec<String>,
}

impl InstallError {
    pub fn new(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            message: message.into(),
            rollback_failures: Vec::new(),
        }
    }

    /// Returns true if compensation left something behind.
    pub fn rollback_incomplete(&self) -> bool {
        !self.rollback_failures.is_empty()
    }
}

/// Privilege elevation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ElevationError {
    #[error("elevation was refused by the user")]
    Denied,

    #[error("no elevation mechanism available on this system")]
    Unavailable,

    #[error("elevation failed: {0}")]
    Failed(String),
}

/// One or more compensating actions failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} checkpoint(s) failed to roll back: {}", .failures.len(), summarize(.failures))]
pub struct RollbackError {
    /// (checkpoint id, failure message), in execution order
    pub failures: Vec<(String, String)>,
}

fn summarize(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(id, msg)| format!("{id} ({msg})"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl RollbackError {
    /// Failure lines suitable for appending to a report.
    pub fn lines(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|(id, msg)| format!("rollback of '{id}' failed: {msg}"))
            .collect()
    }
}

/// Platform integration failure.
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("requirement not met: {0}")]
    Requirement(String),

    #[error("`{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("unsupported on {platform}: {operation}")]
    Unsupported {
        platform: &'static str,
        operation: &'static str,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A post-install step failed. Recorded in the report, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationWarning {
    pub step: &'static str,
    pub message: String,
}

impl RegistrationWarning {
    pub fn new(step: &'static str, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
        }
    }
}

impl fmt::Display for RegistrationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.message)
    }
}
