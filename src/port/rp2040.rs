//! RP2040 (Cortex-M0+, ARMv6-M) port
//!
//! Provides the tick alarm ISR, the core-identity read, and the naked
//! PendSV context-switch handler. ARMv6-M cannot `push`/`pop` registers
//! r8-r11 directly, so they are moved through r0-r3 first — see
//! `PendSV` below.

use core::arch::naked_asm;

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::NVIC;
use rp2040_pac::{Interrupt, Peripherals};

use crate::config::TICK_INTERVAL_US;
use crate::sched::{Scheduler, SCHEDULERS};

/// SIO peripheral base address; `CPUID` is its first register.
/// Matches `examples/original_source`'s `REG_CPUID: .word 0xd0000000`.
const SIO_BASE: u32 = 0xd000_0000;

/// Offset, in bytes, of the stacked PC slot within a task's 16-word
/// initial frame (word index 14).
const OFFSET_PC_BYTES: u32 = 14 * 4;

/// Lowest priority on Cortex-M0+'s 2-bit priority field.
const LOWEST_PRIORITY: u8 = 0xC0;

/// Read which physical core is executing.
#[inline(always)]
pub fn core_id() -> u32 {
    unsafe { core::ptr::read_volatile(SIO_BASE as *const u32) }
}

/// Busy-wait for the next interrupt, used by the idle task.
#[inline(always)]
pub fn wait_for_interrupt() {
    cortex_m::asm::wfi();
}

/// Pend a PendSV context switch.
#[inline(always)]
pub fn request_switch() {
    cortex_m::peripheral::SCB::set_pendsv();
}

/// Whether PendSV is still at `cortex-m-rt`'s compile-time default.
///
/// `cortex-m-rt` fills unhandled vectors with `DefaultHandler`; comparing
/// the installed vector against that address tells us whether some other
/// subsystem has already claimed PendSV, mirroring
/// `examples/original_source`'s `exception_is_compile_time_default`
/// check.
pub fn pendsv_is_default() -> bool {
    extern "C" {
        fn DefaultHandler();
    }

    // The vector table's PendSV entry lives at a fixed offset from its base,
    // which `SCB.vtor` records (0 on this target, since the table isn't
    // relocated).
    let vtor = unsafe { (*cortex_m::peripheral::SCB::PTR).vtor.read() };
    let pendsv_slot = (vtor + 4 * 14) as *const u32;

    unsafe { core::ptr::read_volatile(pendsv_slot) == DefaultHandler as usize as u32 }
}

/// Arm the tick alarm and install its handler.
pub fn install_tick_source() {
    unsafe {
        let dp = Peripherals::steal();

        dp.TIMER.inte().modify(|_, w| w.alarm_0().set_bit());
        let now = dp.TIMER.timerawl().read().bits();
        dp.TIMER
            .alarm0()
            .write(|w| w.bits(now.wrapping_add(TICK_INTERVAL_US)));

        NVIC::unmask(Interrupt::TIMER_IRQ_0);
    }
}

/// Install the switch handler's priority (the handler itself is linked
/// in statically as `PendSV` below; this only sets it to the lowest
/// priority so a switch can never preempt another exception).
pub fn install_switch_handler() {
    unsafe {
        let mut peripherals = cortex_m::Peripherals::steal();
        peripherals
            .SCB
            .set_priority(SystemHandler::PendSV, LOWEST_PRIORITY);
    }
}

/// Enable interrupts and branch directly into the first task.
///
/// # Safety
/// `sp` must point at a valid 16-word initial frame built by
/// `sched::init_stack`. Never returns.
pub unsafe fn start_first_task(sp: *mut u32) -> ! {
    unsafe {
        cortex_m::interrupt::enable();
        branch_into_task(sp)
    }
}

#[unsafe(naked)]
unsafe extern "C" fn branch_into_task(sp: *mut u32) -> ! {
    naked_asm!(
        "mov sp, r0",
        "ldr r0, [sp, {offset_pc}]",
        "bx r0",
        offset_pc = const OFFSET_PC_BYTES,
    )
}

/// Tick alarm ISR. Acknowledges and rearms the alarm, decrements every
/// task's sleep counter, then pends a switch. Never performs the switch
/// itself — it runs at a higher priority than PendSV and must not
/// preempt it.
#[no_mangle]
pub extern "C" fn TIMER_IRQ_0() {
    unsafe {
        let dp = Peripherals::steal();
        dp.TIMER.intr().write(|w| w.alarm_0().clear_bit_by_one());
        let now = dp.TIMER.timerawl().read().bits();
        dp.TIMER
            .alarm0()
            .write(|w| w.bits(now.wrapping_add(TICK_INTERVAL_US)));
    }

    Scheduler::current().tick();
    request_switch();
}

/// Helper invoked from `PendSV`: saves the outgoing task's stack pointer,
/// asks the scheduler to select the next task, and returns its stack
/// pointer.
///
/// Confined here, with a narrow prose contract, per the port layer's
/// "one clearly-marked unsafe routine" design: on entry `cur_sp` points
/// at the low end of the 16-word image just pushed by `PendSV`; on exit
/// the returned pointer is the new task's equivalent image, ready to be
/// popped by `PendSV`'s second half.
#[no_mangle]
unsafe extern "C" fn pendsv_switch_context(cur_sp: *mut u32) -> *mut u32 {
    let core = core_id() as usize;
    let sched = &SCHEDULERS[core];

    let outgoing = sched.current_index();
    unsafe {
        *sched.stack_slot(outgoing) = cur_sp;
    }

    let incoming = sched.select_next();
    unsafe { *sched.stack_slot(incoming) }
}

/// Context-switch handler: saves callee-preserved state of the outgoing
/// task, swaps in the incoming task's stack pointer, restores its
/// callee-preserved state, and returns via the reserved exception-return
/// encoding (thread mode, main stack).
///
/// Interrupts are masked for the duration: the tick alarm ISR runs at a
/// higher priority than PendSV and must not observe a half-saved task.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",
        "push {{r4-r7}}",
        "mov r0, r8",
        "mov r1, r9",
        "mov r2, r10",
        "mov r3, r11",
        "push {{r0-r3}}",
        "mov r0, sp",
        "bl {switch}",
        "mov sp, r0",
        "pop {{r0-r3}}",
        "mov r8, r0",
        "mov r9, r1",
        "mov r10, r2",
        "mov r11, r3",
        "pop {{r4-r7}}",
        "cpsie i",
        "ldr r0, =0xFFFFFFF9",
        "bx r0",
        switch = sym pendsv_switch_context,
    );
}
