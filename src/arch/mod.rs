//! Target capability implementations.
//!
//! Each supported target provides one type implementing every trait in
//! [`crate::platform`]. Targets are selected by cargo feature and only built
//! for 32-bit Arm:
//!
//! - `stm32l476`: [`stm32l476::Stm32l476`], single core
//! - `rp2350`: [`rp2350::Rp2350`], dual core
//!
//! The counter-sampling loops are target independent and live here so they
//! can be tested on the host.

#[cfg(target_arch = "arm")]
pub mod cortex_m;

#[cfg(all(target_arch = "arm", feature = "stm32l476"))]
pub mod stm32l476;

#[cfg(all(target_arch = "arm", feature = "rp2350"))]
pub mod rp2350;

/// Read a 64-bit counter exposed as two 32-bit halves.
///
/// Reads high, low, high and retries until both high reads agree, so a carry
/// from low into high between the two reads cannot tear the value.
#[inline]
pub fn read_split_counter(
    mut read_hi: impl FnMut() -> u32,
    mut read_lo: impl FnMut() -> u32,
) -> u64 {
    let mut hi = read_hi();
    loop {
        let lo = read_lo();
        let next_hi = read_hi();
        if next_hi == hi {
            return ((hi as u64) << 32) | lo as u64;
        }
        hi = next_hi;
    }
}

/// Combine a millisecond tick with a sub-millisecond timer counting 0..=999.
///
/// Samples the sub-millisecond counter until the millisecond tick is the same
/// before and after, so a tick interrupt in between cannot pair a fresh
/// counter with a stale millisecond value.
#[inline]
pub fn read_tick_counter(
    mut read_ms: impl FnMut() -> u32,
    mut read_sub_us: impl FnMut() -> u32,
) -> u64 {
    let mut ms = read_ms();
    loop {
        let sub = read_sub_us();
        let now_ms = read_ms();
        if now_ms == ms {
            return ms as u64 * 1000 + sub as u64;
        }
        ms = now_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    #[test]
    fn test_split_counter_stable() {
        let value = read_split_counter(|| 2, || 0x10);
        assert_eq!(value, (2 << 32) | 0x10);
    }

    #[test]
    fn test_split_counter_retries_on_carry() {
        // low wraps between the first high read and the low read
        let his = [1u32, 2, 2];
        let los = [0xFFFF_FFF0u32, 0x0000_0003];
        let hi_i = Cell::new(0);
        let lo_i = Cell::new(0);

        let value = read_split_counter(
            || {
                let v = his[hi_i.get()];
                hi_i.set(hi_i.get() + 1);
                v
            },
            || {
                let v = los[lo_i.get()];
                lo_i.set(lo_i.get() + 1);
                v
            },
        );

        assert_eq!(value, (2 << 32) | 3);
        assert_eq!(lo_i.get(), 2);
    }

    #[test]
    fn test_tick_counter_combines() {
        assert_eq!(read_tick_counter(|| 1234, || 567), 1_234_567);
    }

    #[test]
    fn test_tick_counter_past_u32_millis_range() {
        // 5_000_000 ms * 1000 overflows u32; must not wrap
        assert_eq!(read_tick_counter(|| 5_000_000, || 1), 5_000_000_001);
    }

    #[test]
    fn test_tick_counter_retries_on_tick() {
        let ticks = [9u32, 10, 10];
        let subs = [999u32, 2];
        let t = Cell::new(0);
        let s = Cell::new(0);

        let value = read_tick_counter(
            || {
                let v = ticks[t.get()];
                t.set(t.get() + 1);
                v
            },
            || {
                let v = subs[s.get()];
                s.set(s.get() + 1);
                v
            },
        );

        assert_eq!(value, 10_002);
    }
}
