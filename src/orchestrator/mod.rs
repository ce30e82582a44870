//! Session orchestration: claims, worker slots, and stop control.

mod core;
mod pool;
mod session;

pub use self::core::{Orchestrator, SessionOutcome, SessionStatus};
pub use pool::WorkerPool;
pub use session::{BisectionSession, SessionError, SessionSpec};
