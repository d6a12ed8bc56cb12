//! Offline decoder for captured record streams.
//!
//! Walks one core's words record by record, accumulating header deltas into
//! absolute timestamps. No allocation; works on a host-side copy (`[u32]`) or
//! directly on a stopped [`CoreContext`].
//!
//! Decoding stops at the end of the input or at the first all-zero header
//! word, which marks space that was never written. Delta wraparound (events
//! more than 65.535 ms apart) is not detectable here and is not an error.

use core::fmt;

use crate::context::CoreContext;
use crate::event::EventId;
use crate::timestamp::Header;

/// Random access to a sequence of recorded words.
pub trait WordSource {
    /// Number of words available.
    fn word_len(&self) -> usize;

    /// Word at `index`, if within [`WordSource::word_len`].
    fn word_at(&self, index: usize) -> Option<u32>;
}

impl WordSource for [u32] {
    #[inline]
    fn word_len(&self) -> usize {
        self.len()
    }

    #[inline]
    fn word_at(&self, index: usize) -> Option<u32> {
        self.get(index).copied()
    }
}

impl<const C: usize> WordSource for CoreContext<C> {
    fn word_len(&self) -> usize {
        self.write_index()
    }

    fn word_at(&self, index: usize) -> Option<u32> {
        self.word(index)
    }
}

/// Why decoding stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Header carries an id no writer produces.
    UnknownEvent { offset: usize, id: u16 },
    /// Record extends past the end of the input.
    Truncated { offset: usize, event: EventId },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnknownEvent { offset, id } => {
                write!(f, "unknown event id {} at word {}", id, offset)
            }
            DecodeError::Truncated { offset, event } => {
                write!(f, "truncated {} record at word {}", event.name(), offset)
            }
        }
    }
}

/// Decoded task-creation payload.
pub struct TaskCreate<'a, W: WordSource + ?Sized = [u32]> {
    /// Task identifier.
    pub task_id: u32,
    /// Task priority.
    pub priority: u32,
    /// Number of name words following the fixed part.
    pub word_count: usize,
    words: &'a W,
    name_start: usize,
}

impl<'a, W: WordSource + ?Sized> TaskCreate<'a, W> {
    /// Name bytes, up to the first NUL padding byte.
    pub fn name_bytes(&self) -> impl Iterator<Item = u8> + 'a {
        let words = self.words;
        let start = self.name_start;
        (start..start + self.word_count)
            .filter_map(move |i| words.word_at(i))
            .flat_map(u32::to_le_bytes)
            .take_while(|&b| b != 0)
    }

    /// Length of the name in bytes.
    pub fn name_len(&self) -> usize {
        self.name_bytes().count()
    }

    /// Copy the name into `out`; returns the number of bytes copied.
    pub fn copy_name(&self, out: &mut [u8]) -> usize {
        let mut copied = 0;
        for (dst, b) in out.iter_mut().zip(self.name_bytes()) {
            *dst = b;
            copied += 1;
        }
        copied
    }

    /// Printable view of the name; non-ASCII bytes are shown escaped.
    pub fn name(&self) -> TaskName<'a, W> {
        TaskName(*self)
    }
}

/// [`fmt::Display`] adapter for a recorded task name.
pub struct TaskName<'a, W: WordSource + ?Sized = [u32]>(TaskCreate<'a, W>);

impl<W: WordSource + ?Sized> fmt::Display for TaskName<'_, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.name_bytes() {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl<W: WordSource + ?Sized> Clone for TaskCreate<'_, W> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<W: WordSource + ?Sized> Copy for TaskCreate<'_, W> {}

impl<W: WordSource + ?Sized> fmt::Debug for TaskCreate<'_, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCreate")
            .field("task_id", &self.task_id)
            .field("priority", &self.priority)
            .field("word_count", &self.word_count)
            .field("name_len", &self.name_len())
            .finish()
    }
}

/// Event-specific payload of a record.
pub enum Payload<'a, W: WordSource + ?Sized = [u32]> {
    /// Header only.
    None,
    /// Task id (exec and ready start/stop).
    Task(u32),
    /// Active exception number (ISR enter).
    Irq(u32),
    /// Absolute wake tick (delay-until).
    WakeTime(u32),
    /// Task creation.
    TaskCreate(TaskCreate<'a, W>),
}

impl<W: WordSource + ?Sized> Clone for Payload<'_, W> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<W: WordSource + ?Sized> Copy for Payload<'_, W> {}

impl<W: WordSource + ?Sized> fmt::Debug for Payload<'_, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::None => f.write_str("None"),
            Payload::Task(id) => f.debug_tuple("Task").field(id).finish(),
            Payload::Irq(irq) => f.debug_tuple("Irq").field(irq).finish(),
            Payload::WakeTime(wake) => f.debug_tuple("WakeTime").field(wake).finish(),
            Payload::TaskCreate(create) => f.debug_tuple("TaskCreate").field(create).finish(),
        }
    }
}

impl<W: WordSource + ?Sized> fmt::Display for Payload<'_, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::None => Ok(()),
            Payload::Task(id) => write!(f, "task={:#010x}", id),
            Payload::Irq(irq) => write!(f, "irq={}", irq),
            Payload::WakeTime(wake) => write!(f, "wake={}", wake),
            Payload::TaskCreate(create) => write!(
                f,
                "task={:#010x} prio={} name={}",
                create.task_id,
                create.priority,
                create.name()
            ),
        }
    }
}

/// One decoded record.
pub struct Record<'a, W: WordSource + ?Sized = [u32]> {
    /// Word offset of the header.
    pub offset: usize,
    /// Event kind.
    pub event: EventId,
    /// Raw 16-bit delta from the header.
    pub delta: u16,
    /// Absolute time in microseconds: start time plus all deltas so far.
    pub timestamp: u64,
    /// Event payload.
    pub payload: Payload<'a, W>,
}

impl<W: WordSource + ?Sized> Record<'_, W> {
    /// Task id carried by exec, ready and create records.
    pub fn task_id(&self) -> Option<u32> {
        match self.payload {
            Payload::Task(id) => Some(id),
            Payload::TaskCreate(create) => Some(create.task_id),
            _ => None,
        }
    }
}

impl<W: WordSource + ?Sized> Clone for Record<'_, W> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<W: WordSource + ?Sized> Copy for Record<'_, W> {}

impl<W: WordSource + ?Sized> fmt::Debug for Record<'_, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("offset", &self.offset)
            .field("event", &self.event)
            .field("delta", &self.delta)
            .field("timestamp", &self.timestamp)
            .field("payload", &self.payload)
            .finish()
    }
}

/// Iterator over the records of one core.
pub struct Decoder<'a, W: WordSource + ?Sized = [u32]> {
    words: &'a W,
    len: usize,
    pos: usize,
    time: u64,
    done: bool,
}

impl<'a, W: WordSource + ?Sized> Decoder<'a, W> {
    /// Decode from time 0.
    pub fn new(words: &'a W) -> Self {
        Self::with_start(words, 0)
    }

    /// Decode with timestamps starting at `start_us`.
    pub fn with_start(words: &'a W, start_us: u64) -> Self {
        Self {
            len: words.word_len(),
            words,
            pos: 0,
            time: start_us,
            done: false,
        }
    }

    /// Word offset of the next record.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Timestamp of the last decoded record.
    pub fn time(&self) -> u64 {
        self.time
    }

    fn word(&self, index: usize) -> u32 {
        self.words.word_at(index).unwrap_or(0)
    }

    fn fail(&mut self, err: DecodeError) -> Option<Result<Record<'a, W>, DecodeError>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<'a, W: WordSource + ?Sized> Iterator for Decoder<'a, W> {
    type Item = Result<Record<'a, W>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.len {
            return None;
        }

        let offset = self.pos;
        let raw = self.word(offset);
        if raw == 0 {
            self.done = true;
            return None;
        }

        let header = Header::from_raw(raw);
        let Some(event) = header.event() else {
            return self.fail(DecodeError::UnknownEvent {
                offset,
                id: header.event_id(),
            });
        };

        let truncated = DecodeError::Truncated { offset, event };
        let mut length = event.fixed_words();
        if offset + length > self.len {
            return self.fail(truncated);
        }

        let payload = match event {
            EventId::Idle
            | EventId::TraceStart
            | EventId::TraceStop
            | EventId::IsrExit
            | EventId::IsrExitToScheduler => Payload::None,
            EventId::ExecStart | EventId::ExecStop | EventId::ReadyStart | EventId::ReadyStop => {
                Payload::Task(self.word(offset + 1))
            }
            EventId::IsrEnter => Payload::Irq(self.word(offset + 1)),
            EventId::DelayUntil => Payload::WakeTime(self.word(offset + 1)),
            EventId::TaskCreate => {
                let word_count = self.word(offset + 2) as usize;
                let end = length
                    .checked_add(word_count)
                    .and_then(|total| offset.checked_add(total));
                match end {
                    Some(end) if end <= self.len => length = end - offset,
                    _ => return self.fail(truncated),
                }
                Payload::TaskCreate(TaskCreate {
                    task_id: self.word(offset + 1),
                    priority: self.word(offset + 3),
                    word_count,
                    words: self.words,
                    name_start: offset + 4,
                })
            }
        };

        self.time = self.time.wrapping_add(header.delta() as u64);
        self.pos = offset + length;

        Some(Ok(Record {
            offset,
            event,
            delta: header.delta(),
            timestamp: self.time,
            payload,
        }))
    }
}

impl<W: WordSource + ?Sized> core::iter::FusedIterator for Decoder<'_, W> {}

/// Little-endian byte image to words; a trailing partial word is ignored.
pub fn words_from_le_bytes(bytes: &[u8]) -> impl Iterator<Item = u32> + '_ {
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
}
