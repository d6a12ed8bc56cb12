//! RP2350 (dual Cortex-M33).
//!
//! Both cores share TIMER0, a free-running 64-bit microsecond counter, so
//! timestamps from the two cores are on the same time base.

use super::cortex_m::CortexM;
use super::read_split_counter;
use crate::platform::{ActiveInterrupt, ClockSource, CoreIdentifier, CriticalSection};

/// SIO CPUID register: 0 on core 0, 1 on core 1.
const SIO_CPUID: usize = 0xD000_0000;

/// TIMER0 raw counter, high half (no latching).
const TIMER0_TIMERAWH: usize = 0x400B_0024;

/// TIMER0 raw counter, low half (no latching).
const TIMER0_TIMERAWL: usize = 0x400B_0028;

#[inline(always)]
fn read_reg(addr: usize) -> u32 {
    // SAFETY: SIO and TIMER0 registers are always mapped and side-effect free to read
    unsafe { core::ptr::read_volatile(addr as *const u32) }
}

/// RP2350 capabilities.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rp2350 {
    cpu: CortexM,
}

impl Rp2350 {
    /// Capability handle, usable from either core.
    pub const fn new() -> Self {
        Self { cpu: CortexM }
    }
}

impl ClockSource for Rp2350 {
    #[inline]
    fn now_us(&self) -> u64 {
        read_split_counter(|| read_reg(TIMER0_TIMERAWH), || read_reg(TIMER0_TIMERAWL))
    }
}

impl CriticalSection for Rp2350 {
    type State = u32;

    #[inline(always)]
    fn enter(&self) -> u32 {
        self.cpu.enter()
    }

    #[inline(always)]
    fn exit(&self, primask: u32) {
        self.cpu.exit(primask);
    }
}

impl CoreIdentifier for Rp2350 {
    #[inline(always)]
    fn current_core(&self) -> usize {
        read_reg(SIO_CPUID) as usize
    }
}

impl ActiveInterrupt for Rp2350 {
    #[inline(always)]
    fn active_interrupt(&self) -> u32 {
        self.cpu.active_interrupt()
    }
}
