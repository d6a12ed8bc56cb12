//! STM32L476 (single Cortex-M4 core).
//!
//! Time base: TIM1 runs as the 1 kHz system tick, counting 0..=999 at 1 MHz,
//! and the HAL millisecond tick counter is advanced from its update
//! interrupt. The HAL counter is used rather than the kernel tick because it
//! starts counting before the scheduler does.

use core::sync::atomic::{AtomicU32, Ordering};

use super::cortex_m::CortexM;
use super::read_tick_counter;
use crate::platform::{ActiveInterrupt, ClockSource, CoreIdentifier, CriticalSection};

/// TIM1 counter register.
const TIM1_CNT: usize = 0x4001_2C24;

/// STM32L476 capabilities.
pub struct Stm32l476 {
    cpu: CortexM,
    millis: &'static AtomicU32,
}

impl Stm32l476 {
    /// `millis` is the HAL millisecond tick counter.
    pub const fn new(millis: &'static AtomicU32) -> Self {
        Self { cpu: CortexM, millis }
    }
}

impl ClockSource for Stm32l476 {
    #[inline]
    fn now_us(&self) -> u64 {
        read_tick_counter(
            || self.millis.load(Ordering::Relaxed),
            // SAFETY: TIM1 is clocked and mapped once the HAL has started it
            || unsafe { core::ptr::read_volatile(TIM1_CNT as *const u32) },
        )
    }
}

impl CriticalSection for Stm32l476 {
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

impl CoreIdentifier for Stm32l476 {
    #[inline(always)]
    fn current_core(&self) -> usize {
        0
    }
}

impl ActiveInterrupt for Stm32l476 {
    #[inline(always)]
    fn active_interrupt(&self) -> u32 {
        self.cpu.active_interrupt()
    }
}
