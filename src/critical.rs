//! Critical section handling for piko
//!
//! Protects per-core scheduler state shared with that core's own ISRs.
//! Masking this core's interrupts is sufficient: the other core's ISRs
//! never touch this core's scheduler (see DESIGN.md).

use core::sync::atomic::{AtomicBool, Ordering};

/// Tracks whether the calling core is currently inside a critical section.
static IN_CRITICAL: AtomicBool = AtomicBool::new(false);

/// RAII guard for a critical section.
///
/// Disables interrupts on construction, restores them on drop.
pub struct CriticalSection {
    _private: (),
}

impl CriticalSection {
    /// Enter a critical section by disabling interrupts on this core.
    #[inline(always)]
    pub fn enter() -> Self {
        #[cfg(target_arch = "arm")]
        cortex_m::interrupt::disable();

        IN_CRITICAL.store(true, Ordering::Release);
        CriticalSection { _private: () }
    }

    /// Check whether this core is currently inside a critical section.
    #[inline(always)]
    pub fn is_active() -> bool {
        IN_CRITICAL.load(Ordering::Acquire)
    }
}

impl Drop for CriticalSection {
    #[inline(always)]
    fn drop(&mut self) {
        IN_CRITICAL.store(false, Ordering::Release);

        #[cfg(target_arch = "arm")]
        unsafe {
            cortex_m::interrupt::enable()
        };
    }
}

/// Execute a closure with this core's interrupts disabled.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    let cs = CriticalSection::enter();
    f(&cs)
}

/// Whether the calling code is currently executing in an ISR.
#[inline]
pub fn is_isr_context() -> bool {
    #[cfg(target_arch = "arm")]
    {
        let ipsr: u32;
        unsafe {
            core::arch::asm!(
                "mrs {}, IPSR",
                out(reg) ipsr,
                options(nomem, nostack, preserves_flags)
            );
        }
        ipsr != 0
    }

    #[cfg(not(target_arch = "arm"))]
    {
        false
    }
}
