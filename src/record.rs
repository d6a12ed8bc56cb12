//! Write cursor over a reserved record range.

use core::sync::atomic::{AtomicU32, Ordering};

/// Exclusive view of the words reserved for one record.
///
/// Handed to the payload closure of [`crate::CoreContext::record`] after the
/// header has been written. The range belongs to the caller until the next
/// reservation, which can never hand it out again, so plain relaxed stores
/// are enough.
pub struct RecordSlot<'a> {
    words: &'a [AtomicU32],
    cursor: usize,
}

impl<'a> RecordSlot<'a> {
    pub(crate) fn new(words: &'a [AtomicU32]) -> Self {
        Self { words, cursor: 0 }
    }

    /// Append one word.
    ///
    /// Writing past the reservation is a caller bug; the word is discarded.
    #[inline(always)]
    pub fn push(&mut self, word: u32) {
        debug_assert!(
            self.cursor < self.words.len(),
            "record overrun: {} words reserved",
            self.words.len()
        );
        if let Some(slot) = self.words.get(self.cursor) {
            slot.store(word, Ordering::Relaxed);
        }
        self.cursor += 1;
    }

    /// Append raw bytes packed little-endian, four per word.
    ///
    /// The last word is zero padded.
    #[inline]
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        for chunk in bytes.chunks(4) {
            let mut packed = [0u8; 4];
            packed[..chunk.len()].copy_from_slice(chunk);
            self.push(u32::from_le_bytes(packed));
        }
    }

    /// Words reserved for this record, header included.
    #[inline]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Always false: every record holds at least its header.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Words written so far.
    #[inline]
    pub fn written(&self) -> usize {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words<const N: usize>() -> [AtomicU32; N] {
        core::array::from_fn(|_| AtomicU32::new(0xDEAD_BEEF))
    }

    fn load(words: &[AtomicU32]) -> std::vec::Vec<u32> {
        words.iter().map(|w| w.load(Ordering::Relaxed)).collect()
    }

    #[test]
    fn test_push_in_order() {
        let buf = words::<3>();
        let mut slot = RecordSlot::new(&buf);
        slot.push(1);
        slot.push(2);
        assert_eq!(slot.written(), 2);
        assert_eq!(load(&buf), [1, 2, 0xDEAD_BEEF]);
    }

    #[test]
    fn test_push_bytes_little_endian_padded() {
        let buf = words::<2>();
        let mut slot = RecordSlot::new(&buf);
        slot.push_bytes(b"ABCDE");

        assert_eq!(slot.written(), 2);
        let out = load(&buf);
        assert_eq!(out[0].to_le_bytes(), *b"ABCD");
        assert_eq!(out[1].to_le_bytes(), [b'E', 0, 0, 0]);
    }

    #[test]
    fn test_push_bytes_exact_word() {
        let buf = words::<1>();
        let mut slot = RecordSlot::new(&buf);
        slot.push_bytes(b"IDLE");
        assert_eq!(load(&buf)[0], u32::from_le_bytes(*b"IDLE"));
    }

    #[test]
    fn test_push_bytes_empty_writes_nothing() {
        let buf = words::<1>();
        let mut slot = RecordSlot::new(&buf);
        slot.push_bytes(b"");
        assert_eq!(slot.written(), 0);
        assert_eq!(load(&buf), [0xDEAD_BEEF]);
    }
}
