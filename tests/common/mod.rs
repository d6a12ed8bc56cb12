//! Simulated platform for driving the recorder on the host.
//!
//! Every test thread plays one core: the core id and the interrupt flag are
//! thread-local, the clock and counters are shared.

#![allow(dead_code)]

use std::cell::Cell;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use coretrace::{ActiveInterrupt, ClockSource, CoreIdentifier, CriticalSection, EventId};

thread_local! {
    static CORE_ID: Cell<usize> = const { Cell::new(0) };
    static IRQ_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Make the calling thread act as core `core`.
pub fn become_core(core: usize) {
    CORE_ID.with(|id| id.set(core));
}

/// Whether the calling "core" currently has interrupts enabled.
pub fn irq_enabled() -> bool {
    IRQ_ENABLED.with(|irq| irq.get())
}

pub struct SimPlatform {
    now: AtomicU64,
    irq: AtomicU32,
    clock_reads: AtomicUsize,
    enters: AtomicUsize,
    exits: AtomicUsize,
}

impl SimPlatform {
    pub const fn new() -> Self {
        Self {
            now: AtomicU64::new(0),
            irq: AtomicU32::new(0),
            clock_reads: AtomicUsize::new(0),
            enters: AtomicUsize::new(0),
            exits: AtomicUsize::new(0),
        }
    }

    pub fn set_time(&self, us: u64) {
        self.now.store(us, Ordering::SeqCst);
    }

    pub fn advance(&self, us: u64) {
        self.now.fetch_add(us, Ordering::SeqCst);
    }

    pub fn set_active_irq(&self, irq: u32) {
        self.irq.store(irq, Ordering::SeqCst);
    }

    pub fn clock_reads(&self) -> usize {
        self.clock_reads.load(Ordering::SeqCst)
    }

    pub fn enters(&self) -> usize {
        self.enters.load(Ordering::SeqCst)
    }

    pub fn exits(&self) -> usize {
        self.exits.load(Ordering::SeqCst)
    }
}

impl ClockSource for SimPlatform {
    fn now_us(&self) -> u64 {
        assert!(!irq_enabled(), "clock read outside the critical section");
        self.clock_reads.fetch_add(1, Ordering::SeqCst);
        self.now.load(Ordering::SeqCst)
    }
}

impl CriticalSection for SimPlatform {
    type State = bool;

    fn enter(&self) -> bool {
        self.enters.fetch_add(1, Ordering::SeqCst);
        IRQ_ENABLED.with(|irq| irq.replace(false))
    }

    fn exit(&self, state: bool) {
        self.exits.fetch_add(1, Ordering::SeqCst);
        IRQ_ENABLED.with(|irq| irq.set(state));
    }
}

impl CoreIdentifier for SimPlatform {
    fn current_core(&self) -> usize {
        CORE_ID.with(|id| id.get())
    }
}

impl ActiveInterrupt for SimPlatform {
    fn active_interrupt(&self) -> u32 {
        self.irq.load(Ordering::SeqCst)
    }
}

/// Header word as the recorder writes it.
pub fn header(event: EventId, delta: u16) -> u32 {
    ((event.id() as u32) << 16) | delta as u32
}

/// Minimal task control block.
pub struct Tcb {
    pub addr: u32,
    pub priority: u32,
    pub name: [u8; 16],
}

impl Tcb {
    pub fn new(addr: u32, priority: u32, name: &str) -> Self {
        let mut buf = [0u8; 16];
        buf[..name.len()].copy_from_slice(name.as_bytes());
        Self {
            addr,
            priority,
            name: buf,
        }
    }
}

impl coretrace::TaskControl for Tcb {
    fn trace_id(&self) -> u32 {
        self.addr
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn name(&self) -> &[u8] {
        &self.name
    }
}
