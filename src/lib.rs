//! piko — a minimal preemptive round-robin kernel for dual-core
//! Cortex-M0+ targets
//!
//! Provides:
//! - Fixed-capacity, per-core task tables with round-robin scheduling
//! - A tick-driven alarm and a PendSV-based context switch
//! - Cooperative `sleep`/`yield_now` on top of the same switch path

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod config;
pub mod critical;
pub mod cs_cell;
pub mod error;
pub mod port;
pub mod sched;
pub mod task;

// ============ Re-exports ============

pub use config::*;
pub use critical::CriticalSection;
pub use error::{OsError, OsResult};
pub use sched::{current_scheduler, sleep, yield_now, Scheduler, TaskFn};
pub use task::Task;
