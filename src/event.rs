//! Event identifiers and record sizes.
//!
//! Ids form the upper half of every header word and must stay stable: they
//! are the contract with offline decoders.

/// Scheduler event kinds recorded in the trace buffer.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventId {
    /// The idle task was switched in.
    Idle = 1,
    /// A task started executing. Payload: task id.
    ExecStart = 2,
    /// A task stopped executing. Payload: task id.
    ExecStop = 3,
    /// A task entered the ready state. Payload: task id.
    ReadyStart = 4,
    /// A task left the ready state. Payload: task id.
    ReadyStop = 5,
    /// A task was created. Payload: task id, name words, priority, name.
    TaskCreate = 6,
    /// Tracing started.
    TraceStart = 7,
    /// Tracing stopped.
    TraceStop = 8,
    /// A task delays until an absolute tick. Payload: wake time.
    DelayUntil = 9,
    /// An interrupt handler was entered. Payload: exception number.
    IsrEnter = 10,
    /// An interrupt handler returned.
    IsrExit = 11,
    /// An interrupt handler returned into the scheduler.
    IsrExitToScheduler = 12,
}

/// Number of defined event kinds.
pub const EVENT_COUNT: usize = 12;

impl EventId {
    /// All event kinds in id order.
    pub const ALL: [EventId; EVENT_COUNT] = [
        EventId::Idle,
        EventId::ExecStart,
        EventId::ExecStop,
        EventId::ReadyStart,
        EventId::ReadyStop,
        EventId::TaskCreate,
        EventId::TraceStart,
        EventId::TraceStop,
        EventId::DelayUntil,
        EventId::IsrEnter,
        EventId::IsrExit,
        EventId::IsrExitToScheduler,
    ];

    /// Raw id as stored in the header word.
    #[inline(always)]
    pub const fn id(self) -> u16 {
        self as u16
    }

    /// Look up an event kind by its raw id.
    pub const fn from_id(id: u16) -> Option<Self> {
        match id {
            1 => Some(EventId::Idle),
            2 => Some(EventId::ExecStart),
            3 => Some(EventId::ExecStop),
            4 => Some(EventId::ReadyStart),
            5 => Some(EventId::ReadyStop),
            6 => Some(EventId::TaskCreate),
            7 => Some(EventId::TraceStart),
            8 => Some(EventId::TraceStop),
            9 => Some(EventId::DelayUntil),
            10 => Some(EventId::IsrEnter),
            11 => Some(EventId::IsrExit),
            12 => Some(EventId::IsrExitToScheduler),
            _ => None,
        }
    }

    /// Record length in words, header included.
    ///
    /// Task creation is variable length; this returns its fixed part (header,
    /// task id, word count, priority). Use [`task_create_words`] for the full
    /// size.
    pub const fn fixed_words(self) -> usize {
        match self {
            EventId::Idle
            | EventId::TraceStart
            | EventId::TraceStop
            | EventId::IsrExit
            | EventId::IsrExitToScheduler => 1,
            EventId::ExecStart
            | EventId::ExecStop
            | EventId::ReadyStart
            | EventId::ReadyStop
            | EventId::DelayUntil
            | EventId::IsrEnter => 2,
            EventId::TaskCreate => 4,
        }
    }

    /// Upper-case event name used in dumps and decoded timelines.
    pub const fn name(self) -> &'static str {
        match self {
            EventId::Idle => "TRACE_IDLE",
            EventId::ExecStart => "TRACE_TASK_START_EXEC",
            EventId::ExecStop => "TRACE_TASK_STOP_EXEC",
            EventId::ReadyStart => "TRACE_TASK_START_READY",
            EventId::ReadyStop => "TRACE_TASK_STOP_READY",
            EventId::TaskCreate => "TRACE_TASK_CREATE",
            EventId::TraceStart => "TRACE_START",
            EventId::TraceStop => "TRACE_STOP",
            EventId::DelayUntil => "TRACE_DELAY_UNTIL",
            EventId::IsrEnter => "TRACE_ISR_ENTER",
            EventId::IsrExit => "TRACE_ISR_EXIT",
            EventId::IsrExitToScheduler => "TRACE_ISR_EXIT_TO_SCHEDULER",
        }
    }
}

/// Byte length of a task name: everything before the first NUL, or the whole
/// slice if there is none.
#[inline]
pub fn name_len(name: &[u8]) -> usize {
    name.iter().position(|&b| b == 0).unwrap_or(name.len())
}

/// Number of words needed to hold `len` name bytes.
#[inline(always)]
pub const fn name_words(len: usize) -> usize {
    len.div_ceil(4)
}

/// Full task-create record length for a name of `len` bytes.
#[inline(always)]
pub const fn task_create_words(len: usize) -> usize {
    EventId::TaskCreate.fixed_words() + name_words(len)
}
