//! Compile-time configuration for piko
//!
//! These constants control the resource limits and timing of the kernel.

/// Maximum number of tasks per core, idle task included.
pub const TASK_CAPACITY: usize = 4;

/// Tick period, in microseconds.
pub const TICK_INTERVAL_US: u32 = 1000;

/// Per-task stack size, in bytes.
pub const STACK_SIZE: usize = 1024;

/// Number of physical cores, each with its own scheduler.
pub const CORE_COUNT: usize = 2;

/// Which hardware alarm the tick source claims.
pub const ALARM_INDEX: u32 = 0;

/// Slot reserved for the idle task in every scheduler.
pub const IDLE_TASK_INDEX: usize = 0;
