//! Per-core scheduler
//!
//! Owns a fixed-capacity task table, selects the next runnable task in
//! round-robin order, and is the thing the port layer's PendSV handler
//! and tick ISR both reach into. One instance per physical core, stored
//! in the `SCHEDULERS` array the port layer's naked assembly addresses
//! directly.

extern crate alloc;

use alloc::alloc::{alloc_zeroed, Layout};

use crate::config::{CORE_COUNT, IDLE_TASK_INDEX, STACK_SIZE, TASK_CAPACITY};
use crate::critical::critical_section;
use crate::cs_cell::CsCell;
use crate::error::{OsError, OsResult};
use crate::port;
use crate::task::Task;

/// A task entry point. Tasks never return; if one does, it lands in a
/// halting trampoline rather than branching to garbage (see `init_stack`).
pub type TaskFn = fn() -> !;

/// 16-word initial stack frame: 8 manually-saved registers (r4-r11) below
/// 8 hardware-stacked exception registers (r0-r3, r12, lr, pc, xpsr).
const INITIAL_FRAME_WORDS: usize = 16;
const OFFSET_LR: usize = 13;
const OFFSET_PC: usize = 14;
const OFFSET_XPSR: usize = 15;
const THUMB_BIT: u32 = 1 << 24;

/// Halting trampoline a task's initial frame returns into if its entry
/// function ever returns. Tasks are documented to never return; this
/// exists so that doing so anyway halts instead of branching to a
/// zeroed LR.
extern "C" fn task_return_trap() -> ! {
    loop {
        port::wait_for_interrupt();
    }
}

fn idle_task() -> ! {
    loop {
        port::wait_for_interrupt();
    }
}

/// Install the idle task at slot 0, if it hasn't been already.
///
/// Lazy rather than done in `State::new()`: the idle task needs a
/// heap-allocated stack, and `State::new()` must stay a `const fn` so
/// the per-core `Scheduler`s can live in a `static`.
fn ensure_idle(state: &mut State) {
    if state.task_count == 0 {
        let sp = unsafe { init_stack(idle_task) };
        state.tasks[IDLE_TASK_INDEX] = Task {
            sp,
            name: "idle",
            sleep_ticks: 0,
        };
        state.task_count = 1;
    }
}

/// The mutable part of a scheduler. Kept separate from `Scheduler` only
/// so it can sit behind a `CsCell`; layout still starts with `tasks` at
/// offset 0 (`CsCell`/`UnsafeCell` are transparent wrappers), which is
/// what the port layer's offset arithmetic assumes.
#[repr(C)]
struct State {
    tasks: [Task; TASK_CAPACITY],
    task_count: u32,
    current_task: u32,
    ticks: u32,
}

impl State {
    const fn new() -> Self {
        const EMPTY: Task = Task::empty();
        State {
            tasks: [EMPTY; TASK_CAPACITY],
            task_count: 0,
            current_task: IDLE_TASK_INDEX as u32,
            ticks: 0,
        }
    }
}

const _: () = assert!(core::mem::size_of::<State>() <= 255);
const _: () = assert!(core::mem::offset_of!(State, tasks) == 0);
const _: () = assert!(core::mem::offset_of!(Task, sp) == 0);

/// One physical core's scheduler.
#[repr(C)]
pub struct Scheduler {
    state: CsCell<State>,
    alarm_claimed: core::sync::atomic::AtomicBool,
}

impl Scheduler {
    const fn new() -> Self {
        Scheduler {
            state: CsCell::new(State::new()),
            alarm_claimed: core::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Get the scheduler for the calling core. There is one per core.
    pub fn current() -> &'static Scheduler {
        &SCHEDULERS[port::core_id() as usize]
    }

    /// Append a task to this core's table and arm its initial stack
    /// frame so that, once scheduled, it starts executing at `entry`.
    ///
    /// Must be called only before `start()`; calling after is undefined,
    /// per the kernel's single-task-set-per-core design.
    pub fn add_task(&self, entry: TaskFn, name: &'static str) -> OsResult<()> {
        critical_section(|cs| {
            let state = self.state.get(cs);
            ensure_idle(state);

            if state.task_count as usize >= TASK_CAPACITY {
                return Err(OsError::TaskCapacityExceeded);
            }

            let sp = unsafe { init_stack(entry) };
            let slot = state.task_count as usize;
            state.tasks[slot] = Task {
                sp,
                name,
                sleep_ticks: 0,
            };
            state.task_count += 1;

            Ok(())
        })
    }

    /// Start this core's scheduler. Does not return.
    pub fn start(&'static self) -> ! {
        if self
            .alarm_claimed
            .compare_exchange(
                false,
                true,
                core::sync::atomic::Ordering::AcqRel,
                core::sync::atomic::Ordering::Acquire,
            )
            .is_err()
        {
            panic!("piko: alarm {} is already claimed", crate::config::ALARM_INDEX);
        }

        if !port::pendsv_is_default() {
            panic!("piko: PendSV handler already owned");
        }

        port::install_tick_source();
        port::install_switch_handler();

        let state = unsafe { self.state.get_unchecked() };
        ensure_idle(state);
        let first = if state.task_count > 1 { 1 } else { IDLE_TASK_INDEX };
        state.current_task = first as u32;
        let first_sp = state.tasks[first].sp;

        unsafe { port::start_first_task(first_sp) }
    }

    /// Select the next task to run: round-robin among runnable non-idle
    /// tasks, falling back to the idle task if none are runnable.
    ///
    /// Called only from the switch handler, with interrupts disabled by
    /// exception entry.
    #[cfg_attr(not(any(test, target_arch = "arm")), allow(dead_code))]
    pub(crate) fn select_next(&self) -> usize {
        let state = unsafe { self.state.get_unchecked() };
        let count = state.task_count as usize;

        for step in 1..=count {
            let candidate = (state.current_task as usize + step) % count;
            if candidate != IDLE_TASK_INDEX && state.tasks[candidate].is_runnable() {
                state.current_task = candidate as u32;
                return candidate;
            }
        }

        state.current_task = IDLE_TASK_INDEX as u32;
        IDLE_TASK_INDEX
    }

    /// Decrement every task's sleep counter by one tick, saturating at
    /// zero. Called from the tick ISR.
    #[cfg_attr(not(any(test, target_arch = "arm")), allow(dead_code))]
    pub(crate) fn tick(&self) {
        let state = unsafe { self.state.get_unchecked() };
        state.ticks = state.ticks.wrapping_add(1);
        for task in state.tasks[..state.task_count as usize].iter_mut() {
            if task.sleep_ticks > 0 {
                task.sleep_ticks -= 1;
            }
        }
    }

    /// Ticks elapsed on this core since boot. Used for log timestamps.
    pub fn ticks(&self) -> u32 {
        let state = unsafe { self.state.get_unchecked() };
        state.ticks
    }

    /// Mark the calling task as sleeping for `ticks` scheduler ticks and
    /// pend a context switch. Returns when re-selected on a later switch.
    ///
    /// Debug-asserts that the calling task's counter is currently zero —
    /// sleeps do not nest.
    pub fn sleep(&self, ticks: u32) {
        critical_section(|cs| {
            let state = self.state.get(cs);
            let cur = state.current_task as usize;
            debug_assert_eq!(
                state.tasks[cur].sleep_ticks, 0,
                "piko: sleep called while a sleep is already pending"
            );
            state.tasks[cur].sleep_ticks = ticks;
        });
        self.yield_now();
    }

    /// Pend a context switch without sleeping.
    pub fn yield_now(&self) {
        port::request_switch();
    }

    /// Borrow the task table for introspection (debugging / tracing).
    pub fn tasks(&self) -> &[Task] {
        let state = unsafe { self.state.get_unchecked() };
        &state.tasks[..state.task_count as usize]
    }

    /// Address of this core's live stack-pointer slot for the task at
    /// `index`. Used by the port layer's switch handler.
    #[cfg_attr(not(target_arch = "arm"), allow(dead_code))]
    pub(crate) fn stack_slot(&self, index: usize) -> *mut *mut u32 {
        let state = unsafe { self.state.get_unchecked() };
        &mut state.tasks[index].sp as *mut *mut u32
    }

    /// Index of the task currently running on this core.
    #[cfg_attr(not(target_arch = "arm"), allow(dead_code))]
    pub(crate) fn current_index(&self) -> usize {
        let state = unsafe { self.state.get_unchecked() };
        state.current_task as usize
    }
}

/// Build the 16-word initial frame for a new task and return the
/// resulting stack pointer.
///
/// # Safety
/// Allocates `STACK_SIZE` bytes from the global allocator; the caller
/// must only do this before `start()`, per the kernel's no-teardown,
/// fixed-task-set design.
unsafe fn init_stack(entry: TaskFn) -> *mut u32 {
    let layout = Layout::from_size_align(STACK_SIZE, 8).expect("piko: bad stack layout");
    let base = unsafe { alloc_zeroed(layout) };
    assert!(!base.is_null(), "piko: task stack allocation failed");

    // Full-descending stack: the logical top is one past the end.
    let top = unsafe { base.add(STACK_SIZE) } as *mut u32;
    let aligned = ((top as usize) & !7) as *mut u32;
    let frame = unsafe { aligned.sub(INITIAL_FRAME_WORDS) };

    unsafe {
        *frame.add(OFFSET_PC) = entry as *const () as u32;
        *frame.add(OFFSET_XPSR) = THUMB_BIT;
        *frame.add(OFFSET_LR) = task_return_trap as *const () as u32;
    }

    frame
}

/// One scheduler per physical core. The port layer's naked PendSV
/// handler addresses this array by `core_id * size_of::<Scheduler>()`.
#[no_mangle]
pub(crate) static SCHEDULERS: [Scheduler; CORE_COUNT] = [Scheduler::new(), Scheduler::new()];

/// Get the scheduler for the calling core.
pub fn current_scheduler() -> &'static Scheduler {
    Scheduler::current()
}

/// Sleep the calling task for `ticks` scheduler ticks.
///
/// The `- 1` compensates for the tick that elapses while the yield path
/// itself runs — a deliberate bias toward sleeping slightly less rather
/// than slightly more. `sleep(0)` and `sleep(1)` both never actually
/// block; this quirk is preserved rather than corrected (DESIGN.md).
pub fn sleep(ticks: u32) {
    current_scheduler().sleep(ticks.saturating_sub(1));
}

/// Pend a context switch for the calling core without sleeping.
pub fn yield_now() {
    current_scheduler().yield_now();
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::boxed::Box;
    use std::string::String;

    fn dummy() -> ! {
        loop {
            port::wait_for_interrupt();
        }
    }

    #[test]
    fn add_task_installs_idle_at_slot_zero() {
        let sched = Scheduler::new();
        sched.add_task(dummy, "one").unwrap();
        let tasks = sched.tasks();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[IDLE_TASK_INDEX].name, "idle");
        assert_eq!(tasks[1].name, "one");
    }

    #[test]
    fn add_task_rejects_past_capacity() {
        let sched = Scheduler::new();
        for i in 0..TASK_CAPACITY - 1 {
            sched.add_task(dummy, "t").expect("room for this task");
            let _ = i;
        }
        assert_eq!(
            sched.add_task(dummy, "overflow"),
            Err(OsError::TaskCapacityExceeded)
        );
    }

    #[test]
    fn select_next_round_robins_and_skips_idle() {
        let sched = Scheduler::new();
        sched.add_task(dummy, "a").unwrap();
        sched.add_task(dummy, "b").unwrap();

        assert_eq!(sched.select_next(), 1);
        assert_eq!(sched.select_next(), 2);
        assert_eq!(sched.select_next(), 1);
    }

    #[test]
    fn select_next_falls_back_to_idle_when_all_sleeping() {
        let sched = Scheduler::new();
        sched.add_task(dummy, "a").unwrap();

        sched.select_next(); // hands control to task "a", as a real switch would
        sched.sleep(5);
        assert_eq!(sched.select_next(), IDLE_TASK_INDEX);
    }

    #[test]
    fn tick_wakes_a_sleeping_task() {
        let sched = Scheduler::new();
        sched.add_task(dummy, "a").unwrap();

        sched.select_next();
        sched.sleep(2);
        let state = unsafe { sched.state.get_unchecked() };
        assert_eq!(state.tasks[1].sleep_ticks(), 2);

        sched.tick();
        sched.tick();
        assert!(state.tasks[1].is_runnable());
    }

    #[test]
    fn start_twice_trips_the_alarm_claim_guard() {
        let sched: &'static Scheduler = Box::leak(Box::new(Scheduler::new()));
        sched.add_task(dummy, "a").unwrap();

        // First call claims the alarm, then panics deeper in (the host
        // stub can't actually branch into a task).
        let first = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sched.start()));
        assert!(first.is_err());

        // Second call should fail fast on the already-claimed alarm,
        // before ever reaching the stub.
        let second = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sched.start()));
        let msg = second
            .unwrap_err()
            .downcast_ref::<String>()
            .cloned()
            .unwrap_or_default();
        assert!(msg.contains("already claimed"), "unexpected panic: {msg}");
    }

    #[test]
    fn init_stack_lays_out_entry_point_and_thumb_bit() {
        let sp = unsafe { init_stack(dummy) };
        unsafe {
            assert_eq!(*sp.add(OFFSET_PC), dummy as *const () as u32);
            assert_eq!(*sp.add(OFFSET_XPSR), THUMB_BIT);
            assert_eq!(sp as usize % 8, 0);
        }
    }
}
