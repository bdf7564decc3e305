// Execution engine: turns a stored revision plus validated inputs into a
// durable execution trace, one checkpoint per started step.

pub mod engine;
pub mod executor;
pub mod journal;

pub use engine::ExecutionEngine;
pub use executor::PersistingExecutor;
pub use journal::{ExecutionJournal, RevisionReader};
