//! Platform capabilities consumed by the recorder.
//!
//! These traits define the interface between target-specific code and the
//! recording logic. Each supported target implements all of them (see
//! [`crate::arch`]); the recorder is written once against [`Platform`].

/// Monotonic microsecond clock.
pub trait ClockSource {
    /// Current time in microseconds.
    ///
    /// Must never go backwards and must be callable from any core and from
    /// interrupt context.
    fn now_us(&self) -> u64;
}

/// Core-local interrupt masking.
///
/// `enter` saves the current interrupt state and disables interrupts on the
/// calling core only; `exit` restores exactly the saved state. Nested use
/// must therefore leave interrupts disabled until the outermost `exit`.
pub trait CriticalSection {
    /// Saved interrupt state (e.g. PRIMASK on Cortex-M).
    type State: Copy;

    /// Save the interrupt state and disable interrupts.
    fn enter(&self) -> Self::State;

    /// Restore a state previously returned by [`CriticalSection::enter`].
    fn exit(&self, state: Self::State);
}

/// Identifies the calling core.
pub trait CoreIdentifier {
    /// Index of the calling core, starting at 0.
    fn current_core(&self) -> usize;
}

/// Source of the currently active exception number.
pub trait ActiveInterrupt {
    /// Active exception/interrupt number, masked to its valid width.
    fn active_interrupt(&self) -> u32;
}

/// Everything the recorder needs from a target.
pub trait Platform: ClockSource + CriticalSection + CoreIdentifier + ActiveInterrupt {}

impl<T> Platform for T where T: ClockSource + CriticalSection + CoreIdentifier + ActiveInterrupt {}

/// Scoped critical section; interrupts are restored on drop.
pub struct CriticalGuard<'a, S: CriticalSection + ?Sized> {
    section: &'a S,
    state: S::State,
}

impl<'a, S: CriticalSection + ?Sized> CriticalGuard<'a, S> {
    /// Disable interrupts until the guard is dropped.
    #[inline(always)]
    pub fn new(section: &'a S) -> Self {
        let state = section.enter();
        Self { section, state }
    }
}

impl<S: CriticalSection + ?Sized> Drop for CriticalGuard<'_, S> {
    #[inline(always)]
    fn drop(&mut self) {
        self.section.exit(self.state);
    }
}
