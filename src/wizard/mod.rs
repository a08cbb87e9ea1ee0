//! Installation wizards built on the workflow state machine.

pub mod handlers;
pub mod provider;
pub mod validate;

pub use handlers::{ActionLabel, HandlerContext, StateHandler};
pub use provider::{BuiltinProvider, Extension, ProviderRegistry, StateUi, Wizard, WizardProvider};

/// Ids of the built-in states.
pub mod states {
    pub const WELCOME: &str = "welcome";
    pub const LICENSE: &str = "license";
    pub const MODE_SELECT: &str = "mode_select";
    pub const COMPONENTS: &str = "components";
    pub const LOCATION: &str = "location";
    pub const READY: &str = "ready";
    pub const THEME: &str = "theme";
    pub const INSTALLING: &str = "installing";
    pub const COMPLETE: &str = "complete";
}
