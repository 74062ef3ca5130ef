//! Per-stack mutation locks and the `Updating` marker
//!
//! Mutations take the stack's mutex and then check the marker; an update
//! holds the marker for its whole run. A mutation that finds the marker set
//! fails with `Conflict` instead of waiting. Reads take neither.

use crate::error::{Result, StrataError};
use parking_lot::{lock_api::ArcMutexGuard, Mutex, RawMutex};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Held for the duration of one config/tag mutation or import/export
pub type MutationGuard = ArcMutexGuard<RawMutex, ()>;

#[derive(Default)]
pub struct StackLocks {
    mutexes: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    updating: Arc<Mutex<HashSet<String>>>,
}

impl StackLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex(&self, stack: &str) -> Arc<Mutex<()>> {
        self.mutexes
            .lock()
            .entry(stack.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Serialize a mutation on `stack`; `Conflict` while it is updating
    pub fn mutation(&self, stack: &str) -> Result<MutationGuard> {
        let guard = self.mutex(stack).lock_arc();
        if self.is_updating(stack) {
            tracing::warn!(stack, "mutation rejected: update in progress");
            return Err(StrataError::conflict(format!(
                "stack '{}' has an update in progress",
                stack
            )));
        }
        Ok(guard)
    }

    /// Enter `Updating`; `Conflict` if another update holds it
    pub fn begin_update(&self, stack: &str) -> Result<UpdateGuard> {
        let _mutation = self.mutex(stack).lock_arc();
        if !self.updating.lock().insert(stack.to_string()) {
            tracing::warn!(stack, "update rejected: another update in progress");
            return Err(StrataError::conflict(format!(
                "stack '{}' has an update in progress",
                stack
            )));
        }
        Ok(UpdateGuard {
            stack: stack.to_string(),
            updating: self.updating.clone(),
        })
    }

    pub fn is_updating(&self, stack: &str) -> bool {
        self.updating.lock().contains(stack)
    }
}

/// Leaves `Updating` when dropped
pub struct UpdateGuard {
    stack: String,
    updating: Arc<Mutex<HashSet<String>>>,
}

impl Drop for UpdateGuard {
    fn drop(&mut self) {
        self.updating.lock().remove(&self.stack);
    }
}

/// Cooperative cancellation, checked before and after the external call
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self, stage: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(StrataError::Cancelled(format!("cancelled {}", stage)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_conflicts_while_updating() {
        let locks = StackLocks::new();
        let update = locks.begin_update("dev").unwrap();

        assert!(locks.is_updating("dev"));
        assert!(matches!(locks.mutation("dev"), Err(StrataError::Conflict(_))));
        assert!(locks.begin_update("dev").is_err());
        assert!(locks.mutation("prod").is_ok());

        drop(update);
        assert!(!locks.is_updating("dev"));
        assert!(locks.mutation("dev").is_ok());
    }

    #[test]
    fn test_mutations_serialize() {
        let locks = Arc::new(StackLocks::new());
        let counter = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let locks = locks.clone();
                let counter = counter.clone();
                std::thread::spawn(move || {
                    let _guard = locks.mutation("dev").unwrap();
                    counter.lock().push(i);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.lock().len(), 4);
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(token.check("before update").is_ok());
        token.clone().cancel();
        assert!(matches!(
            token.check("before update"),
            Err(StrataError::Cancelled(_))
        ));
    }
}
