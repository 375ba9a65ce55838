//! Transactional execution for gridsql.
//!
//! - [`TransactionAgent`] runs a unit of work on a connection from a
//!   [`ConnectionProducer`](gridsql_pool::ConnectionProducer), committing or
//!   rolling back on its answer.
//! - [`ThreadRegistry`] keeps one thread from opening a second transaction
//!   before its first one has finished.
//! - [`ChunkedFetcher`] streams large results page by page.
//!
//! # Example
//!
//! ```ignore
//! let agent = TransactionAgent::new(Arc::new(producer));
//! agent.run_now(|conn, _ctx| {
//!     conn.execute("UPDATE stock SET qty = qty - 1 WHERE id = ?", &[id.into()])?;
//!     Ok(true) // commit
//! })?;
//! ```

pub mod agent;
pub mod context;
pub mod fetch;
pub mod registry;

pub use agent::{AgentConfig, TransactionAgent};
pub use context::TransactionContext;
pub use fetch::{ChunkedFetcher, FetchConfig, FetchStats};
pub use registry::{Registration, ThreadRegistry};
