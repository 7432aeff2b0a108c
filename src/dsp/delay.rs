//! Delay memory: a circular buffer of machine words addressed relative to
//! a write pointer that moves one slot per tick.

use crate::isa::{DELAY_MASK, DELAY_SIZE, PROGRAM_SIZE};

/// The chip's delay RAM.
///
/// Addresses are offsets from the current write pointer, so a word
/// written at address 0 is read back at address `n` exactly `n` ticks
/// later. Writes made during a tick are held in a fixed queue and only
/// land in the buffer at [`DelayMemory::commit`], so reads never observe
/// a same-tick write.
#[derive(Debug, Clone)]
pub struct DelayMemory {
    words: Box<[i32]>,
    write_ptr: u16,
    pending: [(u16, i32); PROGRAM_SIZE],
    pending_len: usize,
}

impl DelayMemory {
    pub fn new() -> Self {
        DelayMemory {
            words: vec![0; DELAY_SIZE].into_boxed_slice(),
            write_ptr: 0,
            pending: [(0, 0); PROGRAM_SIZE],
            pending_len: 0,
        }
    }

    /// Physical slot for a logical address at the current pointer.
    #[inline]
    pub fn slot(&self, addr: u16) -> usize {
        (self.write_ptr.wrapping_sub(addr) & DELAY_MASK) as usize
    }

    #[inline]
    pub fn read(&self, addr: u16) -> i32 {
        self.words[self.slot(addr)]
    }

    /// Schedule a write for the end of the tick.
    #[inline]
    pub fn write(&mut self, addr: u16, value: i32) {
        // One write per instruction at most, so the queue cannot overflow.
        if self.pending_len < self.pending.len() {
            self.pending[self.pending_len] = (self.slot(addr) as u16, value);
            self.pending_len += 1;
        }
    }

    /// Apply this tick's writes in program order.
    pub fn commit(&mut self) {
        for &(slot, value) in &self.pending[..self.pending_len] {
            self.words[slot as usize] = value;
        }
        self.pending_len = 0;
    }

    /// Move the write pointer one slot forward, wrapping.
    #[inline]
    pub fn advance(&mut self) {
        self.write_ptr = self.write_ptr.wrapping_add(1) & DELAY_MASK;
    }

    pub fn write_ptr(&self) -> u16 {
        self.write_ptr
    }

    /// Writes queued but not yet committed.
    pub fn pending(&self) -> usize {
        self.pending_len
    }

    pub fn clear(&mut self) {
        self.words.fill(0);
        self.write_ptr = 0;
        self.pending_len = 0;
    }

    /// True if no word is non-zero and nothing is queued.
    pub fn is_silent(&self) -> bool {
        self.pending_len == 0 && self.words.iter().all(|&w| w == 0)
    }
}

impl Default for DelayMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(mem: &mut DelayMemory) {
        mem.commit();
        mem.advance();
    }

    #[test]
    fn test_write_is_read_back_after_delay() {
        let mut mem = DelayMemory::new();
        mem.write(0, 1234);
        tick(&mut mem);
        for _ in 1..100 {
            tick(&mut mem);
        }
        assert_eq!(mem.read(100), 1234);
        assert_eq!(mem.read(99), 0);
        assert_eq!(mem.read(101), 0);
    }

    #[test]
    fn test_reads_never_see_same_tick_writes() {
        let mut mem = DelayMemory::new();
        mem.write(5, 42);
        assert_eq!(mem.read(5), 0);
        assert_eq!(mem.pending(), 1);
        mem.commit();
        assert_eq!(mem.read(5), 42);
        assert_eq!(mem.pending(), 0);
    }

    #[test]
    fn test_pointer_wraps_to_slot_zero() {
        let mut mem = DelayMemory::new();
        for _ in 0..DELAY_SIZE - 1 {
            mem.advance();
        }
        assert_eq!(mem.write_ptr() as usize, DELAY_SIZE - 1);
        assert_eq!(mem.slot(0), DELAY_SIZE - 1);
        mem.write(0, 7);
        tick(&mut mem);
        assert_eq!(mem.write_ptr(), 0);
        assert_eq!(mem.slot(0), 0);
        assert_eq!(mem.read(1), 7);
    }

    #[test]
    fn test_last_write_to_a_slot_wins() {
        let mut mem = DelayMemory::new();
        mem.write(3, 1);
        mem.write(3, 2);
        mem.commit();
        assert_eq!(mem.read(3), 2);
        mem.clear();
        assert!(mem.is_silent());
    }
}
