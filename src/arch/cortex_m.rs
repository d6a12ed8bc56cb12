//! Armv7-M / Armv8-M core operations shared by all supported targets.
//!
//! PRIMASK layout:
//! - Bit 0 (PM): 1 = all configurable-priority exceptions masked
//!
//! Instructions:
//! - `mrs reg, PRIMASK`: read the mask
//! - `cpsid i`: set PM (disable interrupts)
//! - `msr PRIMASK, reg`: write the mask back

use crate::platform::{ActiveInterrupt, CriticalSection};

/// SCB Interrupt Control and State Register.
const SCB_ICSR: usize = 0xE000_ED04;

/// VECTACTIVE field of ICSR: active exception number, 0 in thread mode.
const ICSR_VECTACTIVE_MASK: u32 = 0x1FF;

/// Read PRIMASK and disable interrupts on the calling core.
#[inline(always)]
pub fn save_and_disable_interrupts() -> u32 {
    let primask: u32;
    unsafe {
        core::arch::asm!("mrs {}, PRIMASK", out(reg) primask, options(nostack, preserves_flags));
        core::arch::asm!("cpsid i", options(nostack, preserves_flags));
    }
    primask
}

/// Restore a PRIMASK value saved by [`save_and_disable_interrupts`].
///
/// Interrupts stay disabled if they were disabled when it was saved.
#[inline(always)]
pub fn restore_interrupts(primask: u32) {
    unsafe {
        core::arch::asm!("msr PRIMASK, {}", in(reg) primask, options(nostack, preserves_flags));
    }
}

/// Active exception number from ICSR.VECTACTIVE.
#[inline(always)]
pub fn vect_active() -> u32 {
    // SAFETY: ICSR is an always-mapped, read-only-safe SCB register
    let icsr = unsafe { core::ptr::read_volatile(SCB_ICSR as *const u32) };
    icsr & ICSR_VECTACTIVE_MASK
}

/// Cortex-M critical section and active-exception source.
#[derive(Debug, Clone, Copy, Default)]
pub struct CortexM;

impl CriticalSection for CortexM {
    type State = u32;

    #[inline(always)]
    fn enter(&self) -> u32 {
        save_and_disable_interrupts()
    }

    #[inline(always)]
    fn exit(&self, primask: u32) {
        restore_interrupts(primask);
    }
}

impl ActiveInterrupt for CortexM {
    #[inline(always)]
    fn active_interrupt(&self) -> u32 {
        vect_active()
    }
}
