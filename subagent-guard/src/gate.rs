//! Admission control for concurrently running sub-agent tasks
//!
//! The gate owns the active-task table. Admission checks the count against
//! the capacity, resolves the requested kind and inserts the new task inside
//! one critical section, so concurrent callers can never push the table past
//! its capacity. The returned [`AdmissionPermit`] removes the task again when
//! dropped, which makes release happen exactly once on every exit path,
//! including panics and cancelled futures.
//!
//! The lock is a `std::sync::Mutex` because release runs in `Drop` and the
//! critical sections never await.

use crate::types::{DispatchError, SubagentKind, TaskId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A sub-agent job occupying a slot. Lives only while it runs.
#[derive(Debug, Clone)]
pub struct SubagentTask {
    pub id: TaskId,
    pub kind: SubagentKind,
    pub description: String,
    pub started_at: Instant,
    pub timeout: Duration,
    cancellation_token: CancellationToken,
}

impl SubagentTask {
    pub fn new(id: TaskId, kind: SubagentKind, description: String, timeout: Duration) -> Self {
        Self {
            id,
            kind,
            description,
            started_at: Instant::now(),
            timeout,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }
}

#[derive(Debug)]
pub struct ConcurrencyGate {
    capacity: usize,
    active: Mutex<HashMap<TaskId, SubagentTask>>,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Snapshot of the running tasks
    pub fn active_tasks(&self) -> Vec<SubagentTask> {
        self.lock().values().cloned().collect()
    }

    /// Atomically admit a task of the requested kind.
    ///
    /// Capacity is checked first; an unknown kind is rejected afterwards but
    /// before any slot is taken. `new_task` only runs once both checks pass.
    pub fn try_admit<F>(
        &self,
        requested_kind: &str,
        new_task: F,
    ) -> Result<AdmissionPermit<'_>, DispatchError>
    where
        F: FnOnce(SubagentKind) -> SubagentTask,
    {
        let mut active = self.lock();

        if active.len() >= self.capacity {
            return Err(DispatchError::CapacityReached {
                capacity: self.capacity,
            });
        }

        let kind: SubagentKind = requested_kind.parse()?;
        let task = new_task(kind);
        active.insert(task.id.clone(), task.clone());
        debug!(
            "Admitted task {} ({}/{} slots in use)",
            task.id,
            active.len(),
            self.capacity
        );

        Ok(AdmissionPermit { gate: self, task })
    }

    /// Signal every running task to stop. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let active = self.lock();
        for task in active.values() {
            task.cancellation_token.cancel();
        }
        active.len()
    }

    fn release(&self, id: &TaskId) {
        let mut active = self.lock();
        if active.remove(id).is_some() {
            debug!(
                "Released task {} ({}/{} slots in use)",
                id,
                active.len(),
                self.capacity
            );
        }
    }

    // Every critical section leaves the table consistent, so a poisoned lock is still usable
    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, SubagentTask>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof of an occupied slot; dropping it frees the slot
#[derive(Debug)]
pub struct AdmissionPermit<'a> {
    gate: &'a ConcurrencyGate,
    task: SubagentTask,
}

impl AdmissionPermit<'_> {
    pub fn task(&self) -> &SubagentTask {
        &self.task
    }
}

impl Drop for AdmissionPermit<'_> {
    fn drop(&mut self) {
        self.gate.release(&self.task.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    fn task(kind: SubagentKind) -> SubagentTask {
        SubagentTask::new(
            TaskId::generate(0),
            kind,
            "Test task".to_string(),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn test_admit_and_release() {
        let gate = ConcurrencyGate::new(2);
        let permit = gate.try_admit("general-purpose", task).unwrap();
        assert_eq!(gate.active_count(), 1);
        assert_eq!(permit.task().kind, SubagentKind::GeneralPurpose);

        drop(permit);
        assert_eq!(gate.active_count(), 0);
    }

    #[test]
    fn test_capacity_reached() {
        let gate = ConcurrencyGate::new(3);
        let _permits: Vec<_> = (0..3)
            .map(|_| gate.try_admit("statusline-setup", task).unwrap())
            .collect();

        let mut created = false;
        let result = gate.try_admit("statusline-setup", |kind| {
            created = true;
            task(kind)
        });

        assert_eq!(
            result.unwrap_err(),
            DispatchError::CapacityReached { capacity: 3 }
        );
        assert!(!created);
        assert_eq!(gate.active_count(), 3);
    }

    #[test]
    fn test_unknown_kind_never_takes_a_slot() {
        let gate = ConcurrencyGate::new(1);
        let result = gate.try_admit("invalid-type", task);
        assert!(matches!(result, Err(DispatchError::UnknownKind { .. })));
        assert_eq!(gate.active_count(), 0);
    }

    #[test]
    fn test_capacity_checked_before_kind() {
        let gate = ConcurrencyGate::new(1);
        let _permit = gate.try_admit("general-purpose", task).unwrap();
        let result = gate.try_admit("invalid-type", task);
        assert!(matches!(result, Err(DispatchError::CapacityReached { .. })));
    }

    #[test]
    fn test_concurrent_admission_respects_capacity() {
        const CAPACITY: usize = 3;
        const CONTENDERS: usize = 16;

        let gate = ConcurrencyGate::new(CAPACITY);
        let admitted = AtomicUsize::new(0);
        let start = Barrier::new(CONTENDERS);
        let hold = Barrier::new(CONTENDERS);

        std::thread::scope(|scope| {
            for _ in 0..CONTENDERS {
                scope.spawn(|| {
                    start.wait();
                    let permit = gate.try_admit("general-purpose", task);
                    if permit.is_ok() {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                    assert!(gate.active_count() <= CAPACITY);
                    // Keep permits alive until every contender has tried
                    hold.wait();
                    drop(permit);
                });
            }
        });

        assert_eq!(admitted.load(Ordering::SeqCst), CAPACITY);
        assert_eq!(gate.active_count(), 0);
    }

    #[test]
    fn test_cancel_all_signals_tokens() {
        let gate = ConcurrencyGate::new(2);
        let first = gate.try_admit("general-purpose", task).unwrap();
        let second = gate.try_admit("output-style-setup", task).unwrap();

        assert_eq!(gate.cancel_all(), 2);
        assert!(first.task().cancellation_token().is_cancelled());
        assert!(second.task().cancellation_token().is_cancelled());
        // Cancellation does not free slots; dropping the permit does
        assert_eq!(gate.active_count(), 2);
    }

    #[test]
    fn test_active_tasks_snapshot() {
        let gate = ConcurrencyGate::new(2);
        let permit = gate.try_admit("output-style-setup", task).unwrap();
        let snapshot = gate.active_tasks();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, permit.task().id);
        assert_eq!(snapshot[0].description, "Test task");
    }
}
