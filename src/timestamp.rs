//! Delta-timestamp header encoding.
//!
//! Each record starts with one header word: the event id in the upper 16 bits
//! and the microseconds elapsed since the previous event on the same core in
//! the lower 16 bits. Deltas are truncated, so two consecutive events on a
//! core must be less than 65.536 ms apart or the decoded delta aliases. With a
//! 1 ms scheduler tick this always holds while the scheduler runs.

use crate::context::CoreState;
use crate::event::EventId;
use crate::platform::ClockSource;

/// Mask for the delta field of a header word.
pub const DELTA_MASK: u32 = 0xFFFF;

/// A packed `(event id, delta)` header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Header(u32);

impl Header {
    /// Pack an event id and a 16-bit delta.
    #[inline(always)]
    pub const fn new(event: EventId, delta: u16) -> Self {
        Self(((event.id() as u32) << 16) | delta as u32)
    }

    /// Reinterpret a raw buffer word.
    #[inline(always)]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw id field (may not name a known event).
    #[inline(always)]
    pub const fn event_id(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Decoded event kind, if the id is known.
    #[inline]
    pub const fn event(self) -> Option<EventId> {
        EventId::from_id(self.event_id())
    }

    /// Delta to the previous event, in microseconds (mod 65536).
    #[inline(always)]
    pub const fn delta(self) -> u16 {
        (self.0 & DELTA_MASK) as u16
    }

    /// The raw header word.
    #[inline(always)]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Truncated delta between two microsecond timestamps.
#[inline(always)]
pub const fn delta16(now_us: u64, last_us: u64) -> u16 {
    (now_us.wrapping_sub(last_us) & DELTA_MASK as u64) as u16
}

/// Encode the header for `event` and advance the core's last timestamp.
///
/// Returns `None` without reading the clock if tracing is disabled on this
/// core. Must be called with the core's critical section held.
#[inline]
pub fn encode<K: ClockSource + ?Sized>(
    state: &mut CoreState,
    event: EventId,
    clock: &K,
) -> Option<Header> {
    if !state.enabled {
        return None;
    }

    let now = clock.now_us();
    let delta = delta16(now, state.last_timestamp);
    state.last_timestamp = now;

    Some(Header::new(event, delta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct StepClock {
        now: Cell<u64>,
        reads: Cell<usize>,
    }

    impl StepClock {
        fn at(now: u64) -> Self {
            Self {
                now: Cell::new(now),
                reads: Cell::new(0),
            }
        }
    }

    impl ClockSource for StepClock {
        fn now_us(&self) -> u64 {
            self.reads.set(self.reads.get() + 1);
            self.now.get()
        }
    }

    fn state_at(last: u64) -> CoreState {
        let mut state = CoreState::new();
        state.enabled = true;
        state.last_timestamp = last;
        state
    }

    #[test]
    fn test_header_packing() {
        let header = Header::new(EventId::TraceStart, 5);
        assert_eq!(header.raw(), (7 << 16) | 5);
        assert_eq!(header.event_id(), 7);
        assert_eq!(header.event(), Some(EventId::TraceStart));
        assert_eq!(header.delta(), 5);
    }

    #[test]
    fn test_encode_small_delta() {
        let mut state = state_at(1_000);
        let clock = StepClock::at(1_005);

        let header = encode(&mut state, EventId::TraceStart, &clock).unwrap();
        assert_eq!(header.raw(), (7 << 16) | 5);
        assert_eq!(state.last_timestamp, 1_005);
    }

    #[test]
    fn test_encode_delta_wraps_at_16_bits() {
        let mut state = state_at(10);
        let clock = StepClock::at(10 + 70_000);

        let header = encode(&mut state, EventId::Idle, &clock).unwrap();
        assert_eq!(header.delta(), 4464);
        assert_eq!(header.raw() & 0xFFFF, 70_000 & 0xFFFF);
    }

    #[test]
    fn test_encode_disabled_skips_clock() {
        let mut state = CoreState::new();
        state.last_timestamp = 42;
        let clock = StepClock::at(100);

        assert_eq!(encode(&mut state, EventId::Idle, &clock), None);
        assert_eq!(clock.reads.get(), 0);
        assert_eq!(state.last_timestamp, 42);
    }

    #[test]
    fn test_consecutive_deltas() {
        let mut state = state_at(0);
        let clock = StepClock::at(100);

        encode(&mut state, EventId::ExecStart, &clock).unwrap();
        clock.now.set(250);
        let header = encode(&mut state, EventId::ExecStop, &clock).unwrap();
        assert_eq!(header.delta(), 150);
        assert_eq!(header.event(), Some(EventId::ExecStop));
    }

    #[test]
    fn test_delta16_handles_clock_below_last() {
        // Garbage last timestamp after init: wrapping subtraction, no panic
        assert_eq!(delta16(5, 10), 0xFFFB);
    }
}
