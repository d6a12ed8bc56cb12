//! Per-core trace context: record buffer, write cursor and overflow latch.
//!
//! # Memory Layout
//!
//! ```text
//! +---------------------------+
//! | words[0..C]   (AtomicU32) |  record stream, written once per slot
//! +---------------------------+
//! | state (spin::Mutex)       |  write_index, last_timestamp, enabled
//! +---------------------------+
//! ```
//!
//! The cursor state is only touched with the owning core's interrupts
//! disabled. The mutex is taken with `try_lock` inside that window and never
//! contended in a correct integration: if it is held anyway (a context shared
//! by mistake, or a readout racing a writer) the event is dropped instead of
//! spinning with interrupts off.

use core::sync::atomic::{AtomicU32, Ordering};

use spin::Mutex;

use crate::event::EventId;
use crate::platform::{ClockSource, CriticalGuard, CriticalSection};
use crate::record::RecordSlot;
use crate::timestamp::encode;

/// Allocation cursor and overflow latch of one core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreState {
    pub(crate) write_index: usize,
    pub(crate) last_timestamp: u64,
    pub(crate) enabled: bool,
}

/// Result of [`CoreState::reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The range `[offset, offset + length)` now belongs to the caller.
    Granted(usize),
    /// Not enough room left; the core has just been disabled.
    Overflow,
    /// The core was already disabled.
    Disabled,
}

impl Reservation {
    /// Start offset of a granted reservation.
    #[inline]
    pub fn offset(self) -> Option<usize> {
        match self {
            Reservation::Granted(offset) => Some(offset),
            Reservation::Overflow | Reservation::Disabled => None,
        }
    }
}

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The record was written.
    Written,
    /// Tracing is disabled on this core (or the context was busy).
    Dropped,
    /// This event did not fit and latched the core off.
    Overflowed,
}

impl CoreState {
    /// Disabled state, as before the first `init`.
    pub const fn new() -> Self {
        Self {
            write_index: 0,
            last_timestamp: 0,
            enabled: false,
        }
    }

    /// Enabled state with an empty buffer.
    pub const fn started() -> Self {
        Self {
            write_index: 0,
            last_timestamp: 0,
            enabled: true,
        }
    }

    /// Reserve `length` words out of `capacity`.
    ///
    /// O(1). The first request that does not fit disables the core
    /// permanently and leaves the write index where it was.
    #[inline]
    pub fn reserve(&mut self, length: usize, capacity: usize) -> Reservation {
        debug_assert!(length >= 1, "records hold at least a header word");

        if !self.enabled {
            return Reservation::Disabled;
        }

        match self.write_index.checked_add(length) {
            Some(end) if end <= capacity => {
                let offset = self.write_index;
                self.write_index = end;
                Reservation::Granted(offset)
            }
            _ => {
                self.enabled = false;
                Reservation::Overflow
            }
        }
    }

    /// Next free word.
    #[inline]
    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// Timestamp of the last encoded event, in microseconds.
    #[inline]
    pub fn last_timestamp(&self) -> u64 {
        self.last_timestamp
    }

    /// Whether events are still accepted.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for CoreState {
    fn default() -> Self {
        Self::new()
    }
}

/// Trace buffer and cursor for a single core.
///
/// `const`-constructible so it can live in a `static`, optionally placed in
/// core-local RAM with `#[link_section]`. Starts disabled until
/// [`CoreContext::init`].
pub struct CoreContext<const C: usize> {
    words: [AtomicU32; C],
    state: Mutex<CoreState>,
}

impl<const C: usize> CoreContext<C> {
    /// Create a disabled, zeroed context.
    pub const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const ZERO: AtomicU32 = AtomicU32::new(0);
        Self {
            words: [ZERO; C],
            state: Mutex::new(CoreState::new()),
        }
    }

    /// Reset for a new capture: empty buffer, cursor at 0, tracing enabled.
    ///
    /// `last_timestamp` is left alone, so the first delta after init is
    /// relative to whatever was there before.
    pub fn init(&self) {
        let mut state = self.state.lock();
        for word in self.words.iter() {
            word.store(0, Ordering::Relaxed);
        }
        state.write_index = 0;
        state.enabled = true;
    }

    /// Record one event of `length` words.
    ///
    /// Reservation and header encoding run under the platform's critical
    /// section; the header and `fill`'s payload are written after it is
    /// released. `fill` receives a slot positioned after the header and must
    /// push exactly `length - 1` words.
    #[inline]
    pub fn record<P, F>(
        &self,
        platform: &P,
        event: EventId,
        length: usize,
        fill: F,
    ) -> RecordOutcome
    where
        P: ClockSource + CriticalSection + ?Sized,
        F: FnOnce(&mut RecordSlot<'_>),
    {
        let (offset, header) = {
            let _irq = CriticalGuard::new(platform);
            let Some(mut state) = self.state.try_lock() else {
                return RecordOutcome::Dropped;
            };

            let offset = match state.reserve(length, C) {
                Reservation::Granted(offset) => offset,
                Reservation::Overflow => return RecordOutcome::Overflowed,
                Reservation::Disabled => return RecordOutcome::Dropped,
            };
            match encode(&mut state, event, platform) {
                Some(header) => (offset, header),
                None => return RecordOutcome::Dropped,
            }
        };

        let mut slot = RecordSlot::new(&self.words[offset..offset + length]);
        slot.push(header.raw());
        fill(&mut slot);
        debug_assert_eq!(slot.written(), length, "{} record size mismatch", event.name());

        RecordOutcome::Written
    }

    /// Snapshot of the cursor state.
    ///
    /// The cursor readouts (`state`, `write_index`, `is_enabled`,
    /// `last_timestamp`) briefly take the cursor lock. An event recorded on
    /// this core while a readout holds it is dropped, so read them from
    /// another core, after this core stopped tracing, or with its interrupts
    /// disabled.
    pub fn state(&self) -> CoreState {
        *self.state.lock()
    }

    /// Next free word; equals the number of words recorded.
    ///
    /// Takes the cursor lock; see [`CoreContext::state`].
    #[inline]
    pub fn write_index(&self) -> usize {
        self.state.lock().write_index
    }

    /// Whether this core still accepts events.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    /// Timestamp of the last recorded event, in microseconds.
    #[inline]
    pub fn last_timestamp(&self) -> u64 {
        self.state.lock().last_timestamp
    }

    /// Buffer capacity in words.
    #[inline]
    pub const fn capacity(&self) -> usize {
        C
    }

    /// Read one buffer word.
    #[inline]
    pub fn word(&self, index: usize) -> Option<u32> {
        self.words.get(index).map(|w| w.load(Ordering::Relaxed))
    }

    /// Iterate over the recorded words.
    ///
    /// Only meaningful once capture has stopped on this core.
    pub fn recorded(&self) -> impl Iterator<Item = u32> + '_ {
        let end = self.write_index();
        self.words[..end].iter().map(|w| w.load(Ordering::Relaxed))
    }

    /// Copy recorded words into `out`; returns how many were copied.
    pub fn copy_words(&self, out: &mut [u32]) -> usize {
        let mut copied = 0;
        for (dst, word) in out.iter_mut().zip(self.recorded()) {
            *dst = word;
            copied += 1;
        }
        copied
    }

    /// Copy recorded words into `out` as little-endian bytes.
    ///
    /// Only whole words are copied; returns the number of bytes written.
    pub fn copy_le_bytes(&self, out: &mut [u8]) -> usize {
        let mut copied = 0;
        for (dst, word) in out.chunks_exact_mut(4).zip(self.recorded()) {
            dst.copy_from_slice(&word.to_le_bytes());
            copied += 4;
        }
        copied
    }
}

impl<const C: usize> Default for CoreContext<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use std::vec::Vec;

    /// Single-threaded platform: settable clock, counted critical sections.
    struct Bench {
        now: Cell<u64>,
        clock_reads: Cell<usize>,
        depth: Cell<usize>,
        payload_depth: Cell<Option<usize>>,
    }

    impl Bench {
        fn new() -> Self {
            Self {
                now: Cell::new(0),
                clock_reads: Cell::new(0),
                depth: Cell::new(0),
                payload_depth: Cell::new(None),
            }
        }
    }

    impl ClockSource for Bench {
        fn now_us(&self) -> u64 {
            self.clock_reads.set(self.clock_reads.get() + 1);
            self.now.get()
        }
    }

    impl CriticalSection for Bench {
        type State = ();

        fn enter(&self) {
            self.depth.set(self.depth.get() + 1);
        }

        fn exit(&self, _: ()) {
            self.depth.set(self.depth.get() - 1);
        }
    }

    fn one_word(ctx: &CoreContext<8>, bench: &Bench) -> RecordOutcome {
        ctx.record(bench, EventId::Idle, 1, |_| {})
    }

    #[test]
    fn test_new_context_is_disabled() {
        let ctx = CoreContext::<8>::new();
        assert!(!ctx.is_enabled());
        assert_eq!(ctx.write_index(), 0);
        assert_eq!(one_word(&ctx, &Bench::new()), RecordOutcome::Dropped);
    }

    #[test]
    fn test_init_resets_everything() {
        let ctx = CoreContext::<8>::new();
        let bench = Bench::new();
        ctx.init();
        ctx.record(&bench, EventId::ExecStart, 2, |slot| slot.push(9));
        assert_eq!(ctx.write_index(), 2);

        ctx.init();
        assert!(ctx.is_enabled());
        assert_eq!(ctx.write_index(), 0);
        assert!((0..8).all(|i| ctx.word(i) == Some(0)));
    }

    #[test]
    fn test_reservations_are_contiguous() {
        let mut state = CoreState::started();
        let lengths = [1, 2, 6, 1, 2];
        let mut expected = 0;
        for len in lengths {
            assert_eq!(state.reserve(len, 12), Reservation::Granted(expected));
            expected += len;
        }
        assert_eq!(state.write_index(), 12);
        assert!(state.is_enabled());
    }

    #[test]
    fn test_overflow_latches_and_keeps_index() {
        let mut state = CoreState::started();
        assert_eq!(state.reserve(3, 4), Reservation::Granted(0));
        assert_eq!(state.reserve(2, 4), Reservation::Overflow);
        assert_eq!(state.write_index(), 3);
        assert!(!state.is_enabled());

        // A request that would have fit is refused too
        assert_eq!(state.reserve(1, 4), Reservation::Disabled);
        assert_eq!(state.write_index(), 3);
    }

    #[test]
    fn test_reserve_huge_length_does_not_wrap() {
        let mut state = CoreState::started();
        state.reserve(1, 4);
        assert_eq!(state.reserve(usize::MAX, 4), Reservation::Overflow);
        assert_eq!(state.write_index(), 1);
    }

    #[test]
    fn test_exact_fill_then_overflow() {
        let ctx = CoreContext::<8>::new();
        let bench = Bench::new();
        ctx.init();
        for _ in 0..8 {
            assert_eq!(one_word(&ctx, &bench), RecordOutcome::Written);
        }
        assert!(ctx.is_enabled());
        assert_eq!(ctx.write_index(), 8);

        assert_eq!(one_word(&ctx, &bench), RecordOutcome::Overflowed);
        assert!(!ctx.is_enabled());
        assert_eq!(ctx.write_index(), 8);
    }

    #[test]
    fn test_disabled_core_reads_no_clock() {
        let ctx = CoreContext::<4>::new();
        let bench = Bench::new();
        ctx.init();
        ctx.record(&bench, EventId::TaskCreate, 5, |slot| {
            slot.push(0);
            slot.push(0);
            slot.push(0);
            slot.push(0);
        });
        assert!(!ctx.is_enabled());
        assert_eq!(bench.clock_reads.get(), 0);

        ctx.record(&bench, EventId::Idle, 1, |_| {});
        assert_eq!(bench.clock_reads.get(), 0);
    }

    #[test]
    fn test_payload_written_outside_critical_section() {
        let ctx = CoreContext::<8>::new();
        let bench = Bench::new();
        ctx.init();
        bench.now.set(40);

        let outcome = ctx.record(&bench, EventId::ReadyStart, 2, |slot| {
            bench.payload_depth.set(Some(bench.depth.get()));
            slot.push(77);
        });

        assert_eq!(outcome, RecordOutcome::Written);
        assert_eq!(bench.payload_depth.get(), Some(0));
        assert_eq!(bench.depth.get(), 0);
        assert_eq!(ctx.word(0), Some((4 << 16) | 40));
        assert_eq!(ctx.word(1), Some(77));
    }

    #[test]
    fn test_critical_section_released_on_drop_paths() {
        let ctx = CoreContext::<1>::new();
        let bench = Bench::new();
        one_word_any(&ctx, &bench);
        assert_eq!(bench.depth.get(), 0);

        ctx.init();
        one_word_any(&ctx, &bench);
        one_word_any(&ctx, &bench);
        assert_eq!(bench.depth.get(), 0);
    }

    fn one_word_any(ctx: &CoreContext<1>, bench: &Bench) {
        ctx.record(bench, EventId::Idle, 1, |_| {});
    }

    #[test]
    fn test_busy_context_drops_event() {
        let ctx = CoreContext::<8>::new();
        let bench = Bench::new();
        ctx.init();

        let held = ctx.state.lock();
        assert_eq!(one_word(&ctx, &bench), RecordOutcome::Dropped);
        drop(held);

        assert_eq!(ctx.write_index(), 0);
        assert_eq!(bench.depth.get(), 0);
    }

    #[test]
    fn test_readouts_between_records_drop_nothing() {
        let ctx = CoreContext::<8>::new();
        let bench = Bench::new();
        ctx.init();

        for expected in 1..=4 {
            assert_eq!(one_word(&ctx, &bench), RecordOutcome::Written);
            assert_eq!(ctx.write_index(), expected);
            assert!(ctx.is_enabled());
            assert_eq!(ctx.state().write_index, expected);
        }
        assert_eq!(ctx.recorded().count(), 4);
    }

    #[test]
    fn test_contexts_are_independent() {
        let a = CoreContext::<8>::new();
        let b = CoreContext::<8>::new();
        let bench = Bench::new();
        a.init();
        b.init();

        for _ in 0..3 {
            one_word(&a, &bench);
        }
        let before: Vec<u32> = (0..8).filter_map(|i| b.word(i)).collect();
        for _ in 0..9 {
            one_word(&a, &bench);
        }

        assert!(!a.is_enabled());
        assert!(b.is_enabled());
        assert_eq!(b.write_index(), 0);
        let after: Vec<u32> = (0..8).filter_map(|i| b.word(i)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_double_init_after_overflow() {
        let once = CoreContext::<2>::new();
        let twice = CoreContext::<2>::new();
        let bench = Bench::new();
        for ctx in [&once, &twice] {
            ctx.init();
            ctx.record(&bench, EventId::ExecStart, 2, |slot| slot.push(1));
            ctx.record(&bench, EventId::Idle, 1, |_| {});
            assert!(!ctx.is_enabled());
        }

        once.init();
        twice.init();
        twice.init();

        assert_eq!(once.state(), twice.state());
        assert_eq!(once.recorded().count(), 0);
        assert_eq!(twice.word(0), Some(0));
        assert_eq!(twice.word(1), Some(0));
    }

    #[test]
    fn test_copy_readouts() {
        let ctx = CoreContext::<8>::new();
        let bench = Bench::new();
        ctx.init();
        bench.now.set(3);
        ctx.record(&bench, EventId::ExecStart, 2, |slot| slot.push(0x0102_0304));

        let mut words = [0u32; 4];
        assert_eq!(ctx.copy_words(&mut words), 2);
        assert_eq!(words[..2], [(2 << 16) | 3, 0x0102_0304]);

        let mut bytes = [0u8; 7];
        assert_eq!(ctx.copy_le_bytes(&mut bytes), 4);
        assert_eq!(bytes[..4], [3, 0, 2, 0]);
    }
}
