//! Per-thread transaction registry.
//!
//! Maps a thread to the start time of the transaction it currently owns. A
//! second transaction from the same thread is rejected; other threads are
//! never affected.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};
use std::time::SystemTime;

use gridsql_core::Result;
use gridsql_core::error::ConcurrentTransactionError;

#[derive(Debug, Clone)]
struct ActiveTransaction {
    started_at: SystemTime,
    thread_name: Option<String>,
}

/// Registry of threads that own an active transaction.
#[derive(Debug, Default)]
pub struct ThreadRegistry {
    active: Mutex<HashMap<ThreadId, ActiveTransaction>>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<ThreadRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ThreadRegistry::new())))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ThreadId, ActiveTransaction>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail if the calling thread already owns a transaction.
    pub fn check(&self) -> Result<()> {
        let id = thread::current().id();
        match self.lock().get(&id) {
            Some(active) => Err(concurrent(id, active).into()),
            None => Ok(()),
        }
    }

    /// Record that the calling thread starts a transaction now.
    pub fn register(&self) -> Result<SystemTime> {
        let current = thread::current();
        match self.lock().entry(current.id()) {
            Entry::Occupied(entry) => Err(concurrent(current.id(), entry.get()).into()),
            Entry::Vacant(entry) => {
                let started_at = SystemTime::now();
                entry.insert(ActiveTransaction {
                    started_at,
                    thread_name: current.name().map(str::to_string),
                });
                Ok(started_at)
            }
        }
    }

    /// Register the calling thread and remove it again when the returned
    /// guard is released or dropped.
    pub fn enter(&self) -> Result<Registration<'_>> {
        let started_at = self.register()?;
        Ok(Registration {
            registry: self,
            started_at,
            active: true,
        })
    }

    /// Forget the calling thread's transaction, returning its start time.
    pub fn remove(&self) -> Option<SystemTime> {
        self.lock()
            .remove(&thread::current().id())
            .map(|active| active.started_at)
    }

    /// Start time of the calling thread's transaction, if any.
    pub fn active(&self) -> Option<SystemTime> {
        self.active_for(thread::current().id())
    }

    pub fn active_for(&self, id: ThreadId) -> Option<SystemTime> {
        self.lock().get(&id).map(|active| active.started_at)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn concurrent(id: ThreadId, active: &ActiveTransaction) -> ConcurrentTransactionError {
    ConcurrentTransactionError {
        thread_id: format!("{id:?}"),
        thread_name: active.thread_name.clone(),
        started_at: active.started_at,
    }
}

/// A thread's entry in a [`ThreadRegistry`].
#[derive(Debug)]
pub struct Registration<'r> {
    registry: &'r ThreadRegistry,
    started_at: SystemTime,
    active: bool,
}

impl Registration<'_> {
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Remove the entry now. Idempotent.
    pub fn release(&mut self) {
        if std::mem::take(&mut self.active) {
            self.registry.remove();
        }
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsql_core::Error;

    #[test]
    fn test_second_registration_is_rejected() {
        let registry = ThreadRegistry::new();
        let started = registry.register().unwrap();
        assert_eq!(registry.active(), Some(started));

        match registry.check() {
            Err(Error::ConcurrentTransaction(e)) => assert_eq!(e.started_at, started),
            other => panic!("unexpected: {other:?}"),
        }
        match registry.register() {
            Err(Error::ConcurrentTransaction(e)) => assert_eq!(e.started_at, started),
            other => panic!("unexpected: {other:?}"),
        }

        assert_eq!(registry.remove(), Some(started));
        assert!(registry.check().is_ok());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_threads_are_independent() {
        let registry = ThreadRegistry::new();
        let _mine = registry.enter().unwrap();
        thread::scope(|s| {
            s.spawn(|| {
                let theirs = registry.enter().unwrap();
                assert_eq!(registry.len(), 2);
                drop(theirs);
            });
        });
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registration_guard_removes_entry() {
        let registry = ThreadRegistry::new();
        {
            let mut reg = registry.enter().unwrap();
            assert_eq!(registry.active(), Some(reg.started_at()));
            reg.release();
            assert!(registry.active().is_none());
            reg.release();
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_error_names_the_thread() {
        let registry = ThreadRegistry::new();
        thread::Builder::new()
            .name("worker-7".into())
            .spawn(move || {
                registry.register().unwrap();
                let err = registry.check().unwrap_err();
                let text = err.to_string();
                assert!(text.contains("worker-7"), "{text}");
                assert!(err.is_concurrent_transaction());
            })
            .unwrap()
            .join()
            .unwrap();
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&ThreadRegistry::global(), &ThreadRegistry::global()));
    }
}
