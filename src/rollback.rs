//! Rollback manager
//!
//! An ordered log of compensating actions. A checkpoint is recorded right
//! before each component starts installing; if the install loop gives up, the
//! checkpoints run newest first so the last component installed is the first
//! one removed.
//!
//! # Failure Policy
//!
//! Execution is best-effort: every checkpoint runs even if an earlier one
//! failed, and all failures are returned together. Checkpoints survive
//! execution; only [`RollbackManager::clear`] discards them.

use crate::context::Context;
use crate::error::RollbackError;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// A compensating action.
pub type RollbackFn = Arc<dyn Fn(&Context) -> anyhow::Result<()> + Send + Sync>;

/// One recorded compensating action.
#[derive(Clone)]
pub struct Checkpoint {
    pub id: String,
    pub created_at: SystemTime,
    rollback: RollbackFn,
}

impl Checkpoint {
    pub fn new(id: impl Into<String>, rollback: RollbackFn) -> Self {
        Self {
            id: id.into(),
            created_at: SystemTime::now(),
            rollback,
        }
    }

    fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        (self.rollback)(ctx)
    }
}

impl fmt::Debug for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checkpoint")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default, Clone)]
pub struct RollbackManager {
    checkpoints: Vec<Checkpoint>,
}

impl RollbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_checkpoint<F>(&mut self, id: impl Into<String>, rollback: F)
    where
        F: Fn(&Context) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.push(Checkpoint::new(id, Arc::new(rollback)));
    }

    /// Record an already shared rollback function.
    pub fn push(&mut self, checkpoint: Checkpoint) {
        log::debug!("Checkpoint '{}' recorded", checkpoint.id);
        self.checkpoints.push(checkpoint);
    }

    /// Run every checkpoint, newest first.
    pub fn execute(&self, ctx: &Context) -> Result<(), RollbackError> {
        let mut failures = Vec::new();

        for checkpoint in self.checkpoints.iter().rev() {
            ctx.log().info(format!("Rolling back '{}'", checkpoint.id));
            if let Err(e) = checkpoint.run(ctx) {
                ctx.log()
                    .warn(format!("Rollback of '{}' failed: {:#}", checkpoint.id, e));
                failures.push((checkpoint.id.clone(), format!("{e:#}")));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RollbackError { failures })
        }
    }

    pub fn count(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    /// Checkpoint ids in the order they were added.
    pub fn ids(&self) -> Vec<&str> {
        self.checkpoints.iter().map(|c| c.id.as_str()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.checkpoints.iter().any(|c| c.id == id)
    }

    /// Discard all checkpoints without running them.
    pub fn clear(&mut self) {
        self.checkpoints.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Mutex;

    fn ctx() -> Context {
        Context::new(&Config::new("Acme", "1.0", "/opt/acme"))
    }

    fn recording(order: &Arc<Mutex<Vec<String>>>, id: &str) -> impl Fn(&Context) -> anyhow::Result<()> + Send + Sync + 'static {
        let order = Arc::clone(order);
        let id = id.to_string();
        move |_ctx| {
            order.lock().unwrap().push(id.clone());
            Ok(())
        }
    }

    #[test]
    fn test_execute_runs_newest_first() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut manager = RollbackManager::new();
        for id in ["A", "B", "C"] {
            manager.add_checkpoint(id, recording(&order, id));
        }

        manager.execute(&ctx()).expect("all succeed");
        assert_eq!(*order.lock().unwrap(), vec!["C", "B", "A"]);
    }

    #[test]
    fn test_execute_keeps_checkpoints_until_clear() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut manager = RollbackManager::new();
        manager.add_checkpoint("A", recording(&order, "A"));
        manager.add_checkpoint("B", recording(&order, "B"));

        manager.execute(&ctx()).unwrap();
        assert_eq!(manager.count(), 2);

        manager.clear();
        assert_eq!(manager.count(), 0);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_execute_drains_past_failures() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut manager = RollbackManager::new();
        manager.add_checkpoint("A", recording(&order, "A"));
        manager.add_checkpoint("B", |_ctx: &Context| anyhow::bail!("file locked"));
        manager.add_checkpoint("C", recording(&order, "C"));

        let ctx = ctx();
        let err = manager.execute(&ctx).unwrap_err();

        assert_eq!(*order.lock().unwrap(), vec!["C", "A"]);
        assert_eq!(err.failures, vec![("B".to_string(), "file locked".to_string())]);
        assert!(ctx.log().warnings().iter().any(|w| w.contains("'B'")));
    }

    #[test]
    fn test_ids_in_insertion_order() {
        let mut manager = RollbackManager::new();
        manager.add_checkpoint("core", |_ctx: &Context| Ok(()));
        manager.add_checkpoint("docs", |_ctx: &Context| Ok(()));
        assert_eq!(manager.ids(), vec!["core", "docs"]);
        assert!(manager.contains("docs"));
        assert!(!manager.contains("plugins"));
    }
}
