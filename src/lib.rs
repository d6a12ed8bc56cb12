//! Per-core scheduler event recorder for real-time kernels.
//!
//! Every core appends compact binary records (task switches, ready-state
//! transitions, task creation, ISR entry/exit, idle periods) to its own
//! fixed-size word buffer. The buffers are read out by an external tool once
//! capture has ended and decoded offline (see [`decode`]).
//!
//! # Design Principles
//!
//! 1. **O(1), allocation-free**: Safe to call from interrupt handlers
//! 2. **Short interrupt-off window**: Only reservation and header encoding run
//!    with interrupts disabled; payload is written afterwards
//! 3. **Per-core buffers**: No cross-core locks, barriers or ordering
//! 4. **Write-once**: No wraparound; a full buffer disables its core for good
//!
//! # Architecture
//!
//! ```text
//! +-------------------+     +-------------------+     +-------------------+
//! | SCHEDULER HOOKS   |     |  EVENT WRITERS    |     |  PLATFORM         |
//! |  - switched in/out|---->|  - idle, exec,    |<----|  - clock (us)     |
//! |  - ready/suspend  |     |    ready, create, |     |  - critical sect. |
//! |  - isr enter/exit |     |    delay, isr     |     |  - core id, irq   |
//! +-------------------+     +---------+---------+     +-------------------+
//!                                     |
//!                                     v
//! +------------------------------------------------------------------------+
//! |  CORE CONTEXTS  (one per core)                                         |
//! |  reserve() -> offset | encode() -> header | [u32; C] record words      |
//! +------------------------------------------------------------------------+
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use coretrace::{CoreContext, Tracer, DEFAULT_BUFFER_WORDS};
//! use coretrace::arch::rp2350::Rp2350;
//!
//! #[link_section = ".scratch_x.trace"]
//! static CORE0: CoreContext<DEFAULT_BUFFER_WORDS> = CoreContext::new();
//! #[link_section = ".scratch_y.trace"]
//! static CORE1: CoreContext<DEFAULT_BUFFER_WORDS> = CoreContext::new();
//!
//! static TRACER: Tracer<'static, Rp2350, 2> = Tracer::new(Rp2350::new(), [&CORE0, &CORE1]);
//!
//! TRACER.init();
//! TRACER.start();
//! TRACER.task_create(0x2000_1000, 3, b"blink");
//! TRACER.exec_start(0x2000_1000);
//! ```
//!
//! # Record Format
//!
//! ```text
//! +----------------+----------------+
//! | event id (16)  | delta us (16)  |   header word
//! +----------------+----------------+
//! | payload words (0..n)            |
//! +---------------------------------+
//! ```

#![cfg_attr(not(test), no_std)]

pub mod arch;
mod context;
pub mod decode;
mod event;
pub mod hooks;
pub mod output;
pub mod platform;
mod record;
mod recorder;
mod timestamp;

pub use self::context::{CoreContext, CoreState, RecordOutcome, Reservation};
pub use self::event::{name_len, name_words, task_create_words, EventId, EVENT_COUNT};
pub use self::hooks::{TaskControl, TraceHooks};
pub use self::platform::{
    ActiveInterrupt, ClockSource, CoreIdentifier, CriticalGuard, CriticalSection, Platform,
};
pub use self::record::RecordSlot;
pub use self::recorder::Tracer;
pub use self::timestamp::{encode, Header};

/// Default per-core buffer capacity, in 32-bit words.
pub const DEFAULT_BUFFER_WORDS: usize = 1000;

/// Default number of cores a [`Tracer`] serves.
pub const DEFAULT_CORES: usize = 2;
