//! Event writers.
//!
//! [`Tracer`] bundles a platform with one [`CoreContext`] per core and exposes
//! one call per event kind. Every call picks the calling core's context,
//! records under that core's critical section, and silently drops the event
//! if the core is disabled or full.

use crate::context::{CoreContext, RecordOutcome};
use crate::event::{name_len, name_words, task_create_words, EventId};
use crate::platform::Platform;
use crate::record::RecordSlot;
use crate::{DEFAULT_BUFFER_WORDS, DEFAULT_CORES};

/// Per-core scheduler event recorder.
///
/// `CORES` contexts of `C` words each. Contexts are borrowed so they can be
/// placed individually (e.g. one per core-local RAM bank).
pub struct Tracer<'a, P, const CORES: usize = DEFAULT_CORES, const C: usize = DEFAULT_BUFFER_WORDS>
{
    platform: P,
    cores: [&'a CoreContext<C>; CORES],
}

impl<'a, P: Platform, const CORES: usize, const C: usize> Tracer<'a, P, CORES, C> {
    /// Bind a platform to its per-core contexts; index `n` serves core `n`.
    pub const fn new(platform: P, cores: [&'a CoreContext<C>; CORES]) -> Self {
        Self { platform, cores }
    }

    /// Reset and enable every core's context.
    ///
    /// Call once at startup before the scheduler runs, and again to start a
    /// fresh capture after the buffers have been read out.
    pub fn init(&self) {
        for ctx in self.cores.iter() {
            ctx.init();
        }
        log::info!(
            "coretrace: {} core(s), {} words ({} bytes) per core",
            CORES,
            C,
            C * 4
        );
    }

    /// Context of core `core`, if it exists.
    #[inline]
    pub fn context(&self, core: usize) -> Option<&'a CoreContext<C>> {
        self.cores.get(core).copied()
    }

    /// Context of the calling core.
    #[inline]
    pub fn current(&self) -> Option<&'a CoreContext<C>> {
        self.context(self.platform.current_core())
    }

    /// The platform capabilities in use.
    #[inline]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// All contexts, by core index.
    #[inline]
    pub fn contexts(&self) -> &[&'a CoreContext<C>; CORES] {
        &self.cores
    }

    #[inline(always)]
    fn emit<F>(&self, event: EventId, length: usize, fill: F)
    where
        F: FnOnce(&mut RecordSlot<'_>),
    {
        let core = self.platform.current_core();
        let Some(ctx) = self.cores.get(core) else {
            return;
        };

        if ctx.record(&self.platform, event, length, fill) == RecordOutcome::Overflowed {
            log::warn!(
                "coretrace: CPU{} buffer full at {} words, tracing disabled",
                core,
                ctx.write_index()
            );
        }
    }

    #[inline(always)]
    fn emit_task(&self, event: EventId, task_id: u32) {
        self.emit(event, event.fixed_words(), |slot| slot.push(task_id));
    }

    /// The idle task was switched in.
    pub fn idle(&self) {
        self.emit(EventId::Idle, 1, |_| {});
    }

    /// `task_id` starts executing.
    pub fn exec_start(&self, task_id: u32) {
        self.emit_task(EventId::ExecStart, task_id);
    }

    /// `task_id` stops executing.
    pub fn exec_stop(&self, task_id: u32) {
        self.emit_task(EventId::ExecStop, task_id);
    }

    /// `task_id` became ready.
    pub fn ready_start(&self, task_id: u32) {
        self.emit_task(EventId::ReadyStart, task_id);
    }

    /// `task_id` left the ready list.
    pub fn ready_stop(&self, task_id: u32) {
        self.emit_task(EventId::ReadyStop, task_id);
    }

    /// A task was created.
    ///
    /// The name ends at its first NUL byte or at the end of the slice; the
    /// same length sizes the reservation and the copy.
    pub fn task_create(&self, task_id: u32, priority: u32, name: &[u8]) {
        let len = name_len(name);
        let name = &name[..len];
        let words = name_words(len);

        self.emit(EventId::TaskCreate, task_create_words(len), |slot| {
            slot.push(task_id);
            slot.push(words as u32);
            slot.push(priority);
            slot.push_bytes(name);
        });
    }

    /// Tracing started.
    pub fn start(&self) {
        self.emit(EventId::TraceStart, 1, |_| {});
    }

    /// Tracing stopped.
    pub fn stop(&self) {
        self.emit(EventId::TraceStop, 1, |_| {});
    }

    /// A task delays until `*previous_wake + increment` (wrapping tick math).
    pub fn delay_until(&self, previous_wake: &u32, increment: u32) {
        let wake = previous_wake.wrapping_add(increment);
        self.emit(EventId::DelayUntil, 2, |slot| slot.push(wake));
    }

    /// An interrupt handler was entered; records the active exception number.
    pub fn isr_enter(&self) {
        let irq = self.platform.active_interrupt();
        self.emit(EventId::IsrEnter, 2, |slot| slot.push(irq));
    }

    /// An interrupt handler returned.
    pub fn isr_exit(&self) {
        self.emit(EventId::IsrExit, 1, |_| {});
    }

    /// An interrupt handler returned into the scheduler.
    pub fn isr_exit_to_scheduler(&self) {
        self.emit(EventId::IsrExitToScheduler, 1, |_| {});
    }
}
