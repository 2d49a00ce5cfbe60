//! Queue-backed task dispatcher with an elastic worker pool.
//!
//! Producers (frame arrival, operator commands) call [`Dispatcher::submit`];
//! a draining thread pulls tasks in submission order and hands each one to a
//! worker, so one slow sink never blocks unrelated work. Load counters are
//! readable at any time through [`Dispatcher::snapshot`] or a cloneable
//! [`LoadGauge`].

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod monitor;
mod pool;
pub mod stats;
pub mod task;

pub use config::{AdmissionPolicy, DispatcherConfig};
pub use dispatcher::{Dispatcher, ShutdownReport};
pub use error::{DispatchError, Result};
pub use monitor::LoadMonitor;
pub use stats::{LoadGauge, LoadSnapshot};
pub use task::{CancelToken, Task, TaskError, TaskId, TaskResult};
