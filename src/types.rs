//! Type-safe configuration enums
//!
//! String-valued settings in the config file map onto these enums so that
//! typos fail at load time and handlers can match exhaustively.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Which built-in workflow graph to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum WizardMode {
    /// welcome → license → installing → complete
    Express,
    /// Adds component and location choice plus a summary step
    #[default]
    Custom,
    /// Asks up front whether to run the express or the custom path
    Advanced,
}

impl WizardMode {
    pub const fn description(self) -> &'static str {
        match self {
            Self::Express => "Install with recommended settings",
            Self::Custom => "Choose components and install location",
            Self::Advanced => "Pick express or custom at the start",
        }
    }
}

/// When to acquire elevated privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ElevationStrategy {
    Always,
    /// Let the platform layer decide from the install location
    #[default]
    Auto,
    Never,
}

/// What happens to already-installed components when one fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum RollbackPolicy {
    /// Run every checkpoint in reverse order
    #[default]
    Auto,
    /// Leave partial installs in place
    None,
}

impl RollbackPolicy {
    #[inline]
    pub const fn enabled(self) -> bool {
        matches!(self, Self::Auto)
    }
}
