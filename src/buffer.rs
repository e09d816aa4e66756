// Hardware Zip Accelerator Streaming Bridge
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Input staging and output draining over DMA slots.
//!
//! Both stages only track offsets; the bytes live in the session's
//! [`DmaRegion`].

use crate::dma::{BufSlot, DmaRegion};

/// Bounded staging area for caller input awaiting an offload.
///
/// Staged bytes occupy `start..end` of the slot. New input is appended at
/// `end`; the accelerator consumes from `start`.
#[derive(Debug, Clone)]
pub struct InputStage {
    slot: BufSlot,
    start: usize,
    end: usize,
    min_chunk: usize,
}

impl InputStage {
    pub fn new(slot: BufSlot, min_chunk: usize) -> Self {
        Self {
            slot,
            start: 0,
            end: 0,
            min_chunk,
        }
    }

    #[inline]
    pub fn slot(&self) -> BufSlot {
        self.slot
    }

    /// Bytes staged and not yet consumed.
    #[inline]
    pub fn staged(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.staged() == 0
    }

    /// Enough is staged to be worth an offload, or nothing more fits.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.staged() >= self.min_chunk || self.end == self.slot.capacity
    }

    /// Offset of the first staged byte within the slot.
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// Copy as much of `input` as fits; returns the number of bytes taken.
    pub fn fill(&mut self, region: &mut DmaRegion, input: &[u8]) -> usize {
        if input.is_empty() {
            return 0;
        }
        if self.end == self.slot.capacity && self.start > 0 {
            self.compact(region);
        }
        let len = input.len().min(self.slot.capacity - self.end);
        if len > 0 {
            let buf = region.bytes_mut(self.slot);
            buf[self.end..self.end + len].copy_from_slice(&input[..len]);
            self.end += len;
        }
        len
    }

    /// Mark `len` staged bytes as consumed.
    ///
    /// Once everything is consumed the stage restarts at the slot base.
    pub fn consume(&mut self, len: usize) {
        debug_assert!(len <= self.staged());
        self.start += len.min(self.staged());
        if self.start == self.end {
            self.reset();
        }
    }

    /// The staged bytes.
    pub fn staged_bytes<'a>(&self, region: &'a DmaRegion) -> &'a [u8] {
        &region.bytes(self.slot)[self.start..self.end]
    }

    /// Drop all staged bytes.
    pub fn reset(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    fn compact(&mut self, region: &mut DmaRegion) {
        let staged = self.staged();
        region
            .bytes_mut(self.slot)
            .copy_within(self.start..self.end, 0);
        log::trace!("compacted {} staged bytes from offset {}", staged, self.start);
        self.start = 0;
        self.end = staged;
    }
}

/// Output produced by the accelerator awaiting delivery to the caller.
///
/// Undelivered bytes occupy `read..write` of the slot.
#[derive(Debug, Clone)]
pub struct OutputStage {
    slot: BufSlot,
    read: usize,
    write: usize,
}

impl OutputStage {
    pub fn new(slot: BufSlot) -> Self {
        Self {
            slot,
            read: 0,
            write: 0,
        }
    }

    #[inline]
    pub fn slot(&self) -> BufSlot {
        self.slot
    }

    /// Bytes not yet handed to the caller.
    #[inline]
    pub fn pending(&self) -> usize {
        self.write - self.read
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Offset where the next produced byte lands.
    #[inline]
    pub fn write_offset(&self) -> usize {
        self.write
    }

    /// Free space after the write offset.
    #[inline]
    pub fn room(&self) -> usize {
        self.slot.capacity - self.write
    }

    /// Append bytes produced by software (wrapper header or trailer).
    pub fn push(&mut self, region: &mut DmaRegion, bytes: &[u8]) {
        assert!(bytes.len() <= self.room(), "output stage overflow");
        let buf = region.bytes_mut(self.slot);
        buf[self.write..self.write + bytes.len()].copy_from_slice(bytes);
        self.write += bytes.len();
    }

    /// Account for `len` bytes the accelerator wrote at the write offset.
    pub fn commit(&mut self, len: usize) {
        assert!(len <= self.room(), "output stage overflow");
        self.write += len;
    }

    /// Bytes between `from` and the write offset.
    pub fn written_since<'a>(&self, region: &'a DmaRegion, from: usize) -> &'a [u8] {
        &region.bytes(self.slot)[from..self.write]
    }

    /// Copy pending bytes into `out`; returns the number copied.
    ///
    /// When everything has been delivered the stage restarts at the slot base.
    pub fn drain(&mut self, region: &DmaRegion, out: &mut [u8]) -> usize {
        let len = self.pending().min(out.len());
        if len > 0 {
            let buf = region.bytes(self.slot);
            out[..len].copy_from_slice(&buf[self.read..self.read + len]);
            self.read += len;
        }
        if self.read == self.write {
            self.reset();
        }
        len
    }

    pub fn reset(&mut self) {
        self.read = 0;
        self.write = 0;
    }
}
