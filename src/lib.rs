//! setupflow
//!
//! An embeddable installation-workflow engine: a deterministic wizard state
//! machine, an orchestrator that installs components with pre-checks,
//! privilege elevation and rollback, and a platform layer for the operations
//! that touch the OS (PATH, shortcuts, registration).
//!
//! Front-ends implement [`view::View`]; the engine never renders anything.

pub mod cli;
pub mod config;
pub mod context;
pub mod controller;
pub mod data;
pub mod dfa;
pub mod disk;
pub mod error;
pub mod orchestrator;
pub mod payload;
pub mod platform;
pub mod rollback;
pub mod session;
pub mod stage;
pub mod types;
pub mod view;
pub mod wizard;

// Re-export main types for convenience
pub use config::{Component, Config};
pub use context::{Context, SessionLog};
pub use controller::{InstallRunner, InstallerController};
pub use data::{Value, WorkflowData};
pub use dfa::{Action, Dfa, StateConfig, StateId};
pub use error::{
    BuildError, ElevationError, InstallError, PlatformError, Result, RollbackError, SetupError,
    TransitionError, ValidationError,
};
pub use orchestrator::{InstallReport, Orchestrator};
pub use platform::{InstallReceipt, Platform};
pub use rollback::{Checkpoint, RollbackManager};
pub use session::{CancelToken, CompletionSignal, SessionOutcome};
pub use stage::{OrchestrationStage, StageTracker};
pub use types::{ElevationStrategy, RollbackPolicy, WizardMode};
pub use view::{Answers, ErrorReport, InstallSummary, Progress, UnattendedView, View};
pub use wizard::{BuiltinProvider, ProviderRegistry, Wizard, WizardProvider};
