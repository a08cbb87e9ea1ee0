//! Orchestration stage machine
//!
//! The orchestrator's own progress, independent of the wizard graph. The
//! sequence is fixed and forward-only:
//!
//! ```text
//! Init
//!     ↓
//! PreCheck
//!     ↓
//! ElevationCheck
//!     ↓
//! Install ──→ RolledBack
//!     ↓
//! PostInstall
//!     ↓
//! Verify
//!     ↓
//! Done
//!
//! (Any non-terminal stage can transition to Failed)
//! ```

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OrchestrationStage {
    /// Session created, nothing checked yet
    Init = 0,

    /// Pre-install hook, platform requirements, disk space
    PreCheck = 1,

    /// Decide whether privileges must be raised
    ElevationCheck = 2,

    /// Component loop; the only stage with compensating actions
    Install = 3,

    /// OS registration, PATH, shortcuts, uninstaller, post-install hook
    PostInstall = 4,

    /// Best-effort checks of the result
    Verify = 5,

    /// Finished successfully (terminal state)
    Done = 6,

    /// Install failed and the checkpoints were run (terminal state)
    RolledBack = 7,

    /// Failed without rollback (terminal state)
    Failed = 255,
}

impl OrchestrationStage {
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    /// Returns true if this is a terminal state
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::RolledBack | Self::Failed)
    }

    /// Returns true once side effects may exist on the system
    #[inline]
    pub const fn has_side_effects(self) -> bool {
        matches!(self, Self::Install | Self::PostInstall | Self::Verify | Self::Done)
    }

    /// Returns the next stage in the sequence, or None if at a terminal state
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::PreCheck),
            Self::PreCheck => Some(Self::ElevationCheck),
            Self::ElevationCheck => Some(Self::Install),
            Self::Install => Some(Self::PostInstall),
            Self::PostInstall => Some(Self::Verify),
            Self::Verify => Some(Self::Done),
            Self::Done | Self::RolledBack | Self::Failed => None,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Init => "Initializing",
            Self::PreCheck => "Checking requirements",
            Self::ElevationCheck => "Checking privileges",
            Self::Install => "Installing components",
            Self::PostInstall => "Registering installation",
            Self::Verify => "Verifying installation",
            Self::Done => "Installation complete",
            Self::RolledBack => "Installation rolled back",
            Self::Failed => "Installation failed",
        }
    }

    /// Stages of a successful run, in order
    pub const fn all_stages() -> &'static [Self] {
        &[
            Self::Init,
            Self::PreCheck,
            Self::ElevationCheck,
            Self::Install,
            Self::PostInstall,
            Self::Verify,
            Self::Done,
        ]
    }
}

impl fmt::Display for OrchestrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageTransitionError {
    #[error("Cannot skip from {from} to {to}")]
    SkippedStage {
        from: OrchestrationStage,
        to: OrchestrationStage,
    },

    #[error("Cannot go backwards from {from} to {to}")]
    BackwardTransition {
        from: OrchestrationStage,
        to: OrchestrationStage,
    },

    #[error("Cannot transition from terminal state {from}")]
    FromTerminalState { from: OrchestrationStage },

    #[error("Rollback is only possible while installing (current: {from})")]
    RollbackOutsideInstall { from: OrchestrationStage },
}

/// Owns the current stage and its timestamped history.
///
/// ```
/// use setupflow::stage::{OrchestrationStage, StageTracker};
///
/// let mut tracker = StageTracker::new();
/// tracker.advance().unwrap();
/// assert_eq!(tracker.current(), OrchestrationStage::PreCheck);
/// assert!(tracker.transition_to(OrchestrationStage::Install).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct StageTracker {
    current: OrchestrationStage,
    failed_at: Option<OrchestrationStage>,
    /// (stage, seconds since UNIX epoch)
    history: Vec<(OrchestrationStage, u64)>,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    pub fn new() -> Self {
        let mut tracker = Self {
            current: OrchestrationStage::Init,
            failed_at: None,
            history: Vec::with_capacity(OrchestrationStage::all_stages().len()),
        };
        tracker.record(OrchestrationStage::Init);
        tracker
    }

    #[inline]
    pub fn current(&self) -> OrchestrationStage {
        self.current
    }

    /// Stage that was active when the session failed or rolled back
    #[inline]
    pub fn failed_at(&self) -> Option<OrchestrationStage> {
        self.failed_at
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.current == OrchestrationStage::Done
    }

    pub fn history(&self) -> &[(OrchestrationStage, u64)] {
        &self.history
    }

    /// Stages visited, without timestamps
    pub fn stages(&self) -> Vec<OrchestrationStage> {
        self.history.iter().map(|(s, _)| *s).collect()
    }

    pub fn advance(&mut self) -> Result<OrchestrationStage, StageTransitionError> {
        let next = self
            .current
            .next()
            .ok_or(StageTransitionError::FromTerminalState { from: self.current })?;
        self.enter(next);
        Ok(next)
    }

    /// Move to `target`, which must be the immediate successor.
    pub fn transition_to(
        &mut self,
        target: OrchestrationStage,
    ) -> Result<OrchestrationStage, StageTransitionError> {
        if self.current.is_terminal() {
            return Err(StageTransitionError::FromTerminalState { from: self.current });
        }
        if target.order() < self.current.order() {
            return Err(StageTransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }
        if self.current.next() != Some(target) {
            return Err(StageTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }
        self.enter(target);
        Ok(target)
    }

    /// Install → RolledBack.
    pub fn roll_back(&mut self) -> Result<(), StageTransitionError> {
        if self.current != OrchestrationStage::Install {
            return Err(StageTransitionError::RollbackOutsideInstall { from: self.current });
        }
        self.failed_at = Some(self.current);
        self.enter(OrchestrationStage::RolledBack);
        Ok(())
    }

    /// Any non-terminal stage → Failed.
    pub fn fail(&mut self) -> Result<(), StageTransitionError> {
        if self.current.is_terminal() {
            return Err(StageTransitionError::FromTerminalState { from: self.current });
        }
        self.failed_at = Some(self.current);
        self.enter(OrchestrationStage::Failed);
        Ok(())
    }

    fn enter(&mut self, stage: OrchestrationStage) {
        log::debug!("Orchestration stage: {} -> {}", self.current, stage);
        self.record(stage);
        self.current = stage;
    }

    fn record(&mut self, stage: OrchestrationStage) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.history.push((stage, timestamp));
    }
}
