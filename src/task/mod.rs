//! Task lifecycle and status transitions (spec §4.2). The service owns
//! validation and persistence; the DAG engine is notified of every
//! mutation but never mutated directly by callers.

mod service;

pub use service::TaskService;
