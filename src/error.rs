//! Error types for piko
//!
//! The kernel does not propagate errors through its hot paths (context
//! switch, tick, select) — those are either infallible or panic on
//! misuse. `OsError` covers the handful of operations that can fail for
//! reasons a caller is expected to handle: registering too many tasks,
//! or a start-up resource conflict.

/// Kernel error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsError {
    /// `add_task` was called with the task table already full.
    TaskCapacityExceeded,
    /// `start` found the chosen hardware alarm already claimed.
    AlarmClaimed(u32),
    /// `start` found PendSV already owned by another handler.
    PendSvOwned,
}

/// Result type alias for kernel operations.
pub type OsResult<T> = Result<T, OsError>;
