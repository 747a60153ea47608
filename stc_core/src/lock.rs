//! Advisory per-(machine, position) run locks.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::error::{Result, StcError};
use crate::types::Position;

/// Shared set of machine/position pairs with a run in progress.
/// Clones refer to the same set.
#[derive(Debug, Clone, Default)]
pub struct RunLocks {
    held: Arc<Mutex<HashSet<(u32, Position)>>>,
}

/// Releases its pair on drop.
#[derive(Debug)]
pub struct RunGuard {
    locks: RunLocks,
    key: (u32, Position),
}

impl RunLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the pair, or fail fast with `Busy` when another run holds it.
    pub fn try_acquire(&self, machine_id: u32, position: Position) -> Result<RunGuard> {
        let key = (machine_id, position);
        let mut held = self.held.lock().unwrap_or_else(|p| p.into_inner());
        if !held.insert(key) {
            tracing::warn!(machine_id, %position, "run rejected: pair busy");
            return Err(StcError::Busy {
                machine_id,
                position,
            });
        }
        Ok(RunGuard {
            locks: self.clone(),
            key,
        })
    }

    pub fn is_held(&self, machine_id: u32, position: Position) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&(machine_id, position))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.locks
            .held
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.key);
    }
}
