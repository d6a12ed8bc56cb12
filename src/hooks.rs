//! Scheduler integration points.
//!
//! The scheduler calls into [`TraceHooks`] at the same places it would
//! otherwise invoke tracing hook macros: task switch in/out, ready-list
//! insert/remove, task creation, delay-until and ISR entry/exit.
//!
//! # Feature Gates
//!
//! - `idle-trace`: switching in the idle task records an idle event instead
//!   of nothing.
//! - `irq-trace`: ISR hooks record events; without it they are no-ops.

use crate::platform::Platform;
use crate::recorder::Tracer;

/// Name prefix identifying the idle task.
pub const IDLE_PREFIX: &[u8] = b"IDLE";

/// Task metadata the hooks read from the scheduler's task control block.
pub trait TaskControl {
    /// Identifier recorded as the task id (typically the TCB address).
    fn trace_id(&self) -> u32;

    /// Scheduler priority.
    fn priority(&self) -> u32;

    /// Task name bytes, optionally NUL terminated.
    fn name(&self) -> &[u8];

    /// Whether this is an idle task.
    fn is_idle(&self) -> bool {
        self.name().starts_with(IDLE_PREFIX)
    }
}

/// Hook surface driven by the scheduler.
pub trait TraceHooks<T: TaskControl + ?Sized> {
    /// The scheduler started tracing.
    fn trace_started(&self);

    /// The scheduler ended tracing.
    fn trace_ended(&self);

    /// `task` was selected to run.
    fn task_switched_in(&self, task: &T);

    /// `task` is about to be switched out.
    fn task_switched_out(&self, task: &T);

    /// A task was created; `None` if creation failed.
    fn task_created(&self, task: Option<&T>);

    /// `task` moved to the ready list.
    fn task_ready(&self, task: &T);

    /// `task` moved to the suspended list.
    fn task_suspended(&self, task: &T);

    /// The current task delays until `*previous_wake + increment`.
    fn delay_until(&self, previous_wake: &u32, increment: u32);

    /// An interrupt handler was entered.
    fn isr_entered(&self);

    /// An interrupt handler returned to the interrupted task.
    fn isr_exited(&self);

    /// An interrupt handler returned into the scheduler.
    fn isr_exited_to_scheduler(&self);
}

impl<T, P, const CORES: usize, const C: usize> TraceHooks<T> for Tracer<'_, P, CORES, C>
where
    T: TaskControl + ?Sized,
    P: Platform,
{
    fn trace_started(&self) {
        self.start();
    }

    fn trace_ended(&self) {
        self.stop();
    }

    fn task_switched_in(&self, task: &T) {
        if task.is_idle() {
            #[cfg(feature = "idle-trace")]
            self.idle();
        } else {
            self.exec_start(task.trace_id());
        }
    }

    fn task_switched_out(&self, task: &T) {
        if !task.is_idle() {
            self.exec_stop(task.trace_id());
        }
    }

    fn task_created(&self, task: Option<&T>) {
        if let Some(task) = task {
            self.task_create(task.trace_id(), task.priority(), task.name());
        }
    }

    fn task_ready(&self, task: &T) {
        self.ready_start(task.trace_id());
    }

    fn task_suspended(&self, task: &T) {
        self.ready_stop(task.trace_id());
    }

    fn delay_until(&self, previous_wake: &u32, increment: u32) {
        Tracer::delay_until(self, previous_wake, increment);
    }

    fn isr_entered(&self) {
        #[cfg(feature = "irq-trace")]
        self.isr_enter();
    }

    fn isr_exited(&self) {
        #[cfg(feature = "irq-trace")]
        self.isr_exit();
    }

    fn isr_exited_to_scheduler(&self) {
        #[cfg(feature = "irq-trace")]
        self.isr_exit_to_scheduler();
    }
}
