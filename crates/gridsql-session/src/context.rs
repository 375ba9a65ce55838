//! State handed to a unit of work.

use std::collections::HashMap;
use std::thread::{self, ThreadId};
use std::time::SystemTime;

use gridsql_core::Value;

/// One run of a unit of work.
///
/// Besides the flags describing how the work runs, the context carries a
/// string-keyed bag of values and positional parameters the caller can use
/// to pass data in and out of the unit of work.
#[derive(Debug, Clone)]
pub struct TransactionContext {
    thread_id: ThreadId,
    pub(crate) started_at: SystemTime,
    pub(crate) transactions_supported: bool,
    pub(crate) readonly: bool,
    pub(crate) executed: bool,
    values: HashMap<String, Value>,
    params: Vec<Value>,
}

impl Default for TransactionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionContext {
    pub fn new() -> Self {
        Self {
            thread_id: thread::current().id(),
            started_at: SystemTime::now(),
            transactions_supported: false,
            readonly: false,
            executed: false,
            values: HashMap::new(),
            params: Vec::new(),
        }
    }

    /// Seed the value bag.
    pub fn with_values(mut self, values: HashMap<String, Value>) -> Self {
        self.values.extend(values);
        self
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// When the unit of work started; for guarded transactions this is the
    /// time recorded in the thread registry.
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Whether the work runs inside an explicit transaction.
    pub fn transactions_supported(&self) -> bool {
        self.transactions_supported
    }

    pub fn readonly(&self) -> bool {
        self.readonly
    }

    /// Whether the last run asked to commit and completed.
    pub fn executed(&self) -> bool {
        self.executed
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> HashMap<String, Value> {
        self.values
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub(crate) fn begin(&mut self, transactions_supported: bool, readonly: bool) {
        self.thread_id = thread::current().id();
        self.transactions_supported = transactions_supported;
        self.readonly = readonly;
        self.executed = false;
    }
}
