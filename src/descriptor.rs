// Hardware Zip Accelerator Streaming Bridge
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Work descriptor and completion record.
//!
//! The accelerator uses one 128-byte record format for both directions: the
//! bridge fills in the request words and submits it, the completion that comes
//! back carries the same layout with the result words filled in. Field sizes
//! and ordering are fixed by the firmware.

use crate::alg::{AlgType, HwFlush};
use bitflags::bitflags;

bitflags! {
    /// Stream control bits of the `dw7` word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SqeFlags: u32 {
        /// Finish the stream (clear = sync flush).
        const FINISH = 1 << 25;
        /// Stateful operation, context is kept between descriptors.
        const STATEFUL = 1 << 26;
        /// First descriptor of a stream (clear = continue previous state).
        const STREAM_NEW = 1 << 27;
    }
}

/// Mask of the status byte in `dw3`.
const STATUS_MASK: u32 = 0xff;

/// Decompression reached the end of the deflate stream.
pub const DECOMP_END: u32 = 1 << 8;

/// Size of the descriptor in bytes.
pub const SQE_SIZE: usize = 128;

/// 128-byte work descriptor / completion record.
///
/// # Layout
///
/// | Word | Field | Direction |
/// |------|-------|-----------|
/// | 0 | consumed | completion |
/// | 1 | produced | completion |
/// | 3 | status (bits 7:0), end flag (bit 8) | completion |
/// | 4 | input_data_length | request |
/// | 7 | stream flags | request |
/// | 9 | algorithm (bits 7:0) | both |
/// | 13 | tag | both |
/// | 14 | dest_avail_out | request |
/// | 15, 28, 29 | opaque context words | both |
/// | 18-23 | source, destination, context addresses | request |
/// | 30 | isize | both |
/// | 31 | checksum | both |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, align(64))]
pub struct ZipSqe {
    pub consumed: u32,
    pub produced: u32,
    pub comp_data_length: u32,
    pub dw3: u32,
    pub input_data_length: u32,
    pub lba_l: u32,
    pub lba_h: u32,
    pub dw7: u32,
    pub dw8: u32,
    pub dw9: u32,
    pub dw10: u32,
    pub priv_info: u32,
    pub dw12: u32,
    pub tag: u32,
    pub dest_avail_out: u32,
    pub ctx_dw0: u32,
    pub comp_head_addr_l: u32,
    pub comp_head_addr_h: u32,
    pub source_addr_l: u32,
    pub source_addr_h: u32,
    pub dest_addr_l: u32,
    pub dest_addr_h: u32,
    pub stream_ctx_addr_l: u32,
    pub stream_ctx_addr_h: u32,
    pub cipher_key1_addr_l: u32,
    pub cipher_key1_addr_h: u32,
    pub cipher_key2_addr_l: u32,
    pub cipher_key2_addr_h: u32,
    pub ctx_dw1: u32,
    pub ctx_dw2: u32,
    pub isize: u32,
    pub checksum: u32,
}

#[inline]
const fn split(addr: u64) -> (u32, u32) {
    (addr as u32, (addr >> 32) as u32)
}

#[inline]
const fn join(lo: u32, hi: u32) -> u64 {
    ((hi as u64) << 32) | lo as u64
}

impl ZipSqe {
    /// Create a new zeroed descriptor.
    #[inline]
    pub const fn new() -> Self {
        Self {
            consumed: 0,
            produced: 0,
            comp_data_length: 0,
            dw3: 0,
            input_data_length: 0,
            lba_l: 0,
            lba_h: 0,
            dw7: 0,
            dw8: 0,
            dw9: 0,
            dw10: 0,
            priv_info: 0,
            dw12: 0,
            tag: 0,
            dest_avail_out: 0,
            ctx_dw0: 0,
            comp_head_addr_l: 0,
            comp_head_addr_h: 0,
            source_addr_l: 0,
            source_addr_h: 0,
            dest_addr_l: 0,
            dest_addr_h: 0,
            stream_ctx_addr_l: 0,
            stream_ctx_addr_h: 0,
            cipher_key1_addr_l: 0,
            cipher_key1_addr_h: 0,
            cipher_key2_addr_l: 0,
            cipher_key2_addr_h: 0,
            ctx_dw1: 0,
            ctx_dw2: 0,
            isize: 0,
            checksum: 0,
        }
    }

    /// Create a stateful compression/decompression request.
    ///
    /// `fresh` selects a new stream; otherwise the accelerator resumes from the
    /// context at `ctx_addr`.
    #[allow(clippy::too_many_arguments)]
    pub fn stream_request(
        alg: AlgType,
        fresh: bool,
        flush: HwFlush,
        src: u64,
        src_len: u32,
        dst: u64,
        dst_avail: u32,
        ctx_addr: u64,
    ) -> Self {
        let mut sqe = Self::new();
        sqe.set_alg(alg);
        let mut flags = SqeFlags::STATEFUL;
        if fresh {
            flags |= SqeFlags::STREAM_NEW;
        }
        if flush == HwFlush::Finish {
            flags |= SqeFlags::FINISH;
        }
        sqe.set_flags(flags);
        sqe.set_source_addr(src);
        sqe.input_data_length = src_len;
        sqe.set_dest_addr(dst);
        sqe.dest_avail_out = dst_avail;
        sqe.set_stream_ctx_addr(ctx_addr);
        sqe
    }

    /// Set the algorithm code (low byte of `dw9`).
    #[inline]
    pub fn set_alg(&mut self, alg: AlgType) {
        self.dw9 = (self.dw9 & !0xff) | alg.as_u8() as u32;
    }

    /// Get the raw algorithm code.
    #[inline]
    pub fn alg_code(&self) -> u8 {
        (self.dw9 & 0xff) as u8
    }

    /// Replace the stream control flags.
    #[inline]
    pub fn set_flags(&mut self, flags: SqeFlags) {
        self.dw7 = (self.dw7 & !SqeFlags::all().bits()) | flags.bits();
    }

    /// Get the stream control flags.
    #[inline]
    pub fn flags(&self) -> SqeFlags {
        SqeFlags::from_bits_truncate(self.dw7)
    }

    /// Flush type requested by this descriptor.
    #[inline]
    pub fn flush(&self) -> HwFlush {
        if self.flags().contains(SqeFlags::FINISH) {
            HwFlush::Finish
        } else {
            HwFlush::Sync
        }
    }

    #[inline]
    pub fn set_source_addr(&mut self, addr: u64) {
        (self.source_addr_l, self.source_addr_h) = split(addr);
    }

    #[inline]
    pub fn source_addr(&self) -> u64 {
        join(self.source_addr_l, self.source_addr_h)
    }

    #[inline]
    pub fn set_dest_addr(&mut self, addr: u64) {
        (self.dest_addr_l, self.dest_addr_h) = split(addr);
    }

    #[inline]
    pub fn dest_addr(&self) -> u64 {
        join(self.dest_addr_l, self.dest_addr_h)
    }

    #[inline]
    pub fn set_stream_ctx_addr(&mut self, addr: u64) {
        (self.stream_ctx_addr_l, self.stream_ctx_addr_h) = split(addr);
    }

    #[inline]
    pub fn stream_ctx_addr(&self) -> u64 {
        join(self.stream_ctx_addr_l, self.stream_ctx_addr_h)
    }

    /// Opaque context words as a triple.
    #[inline]
    pub fn ctx_words(&self) -> [u32; 3] {
        [self.ctx_dw0, self.ctx_dw1, self.ctx_dw2]
    }

    #[inline]
    pub fn set_ctx_words(&mut self, words: [u32; 3]) {
        [self.ctx_dw0, self.ctx_dw1, self.ctx_dw2] = words;
    }

    /// Completion status byte.
    #[inline]
    pub fn status(&self) -> CompletionStatus {
        CompletionStatus::from((self.dw3 & STATUS_MASK) as u8)
    }

    /// Set the completion status word.
    #[inline]
    pub fn set_status(&mut self, status: CompletionStatus, stream_end: bool) {
        self.dw3 = status.as_u8() as u32;
        if stream_end {
            self.dw3 |= DECOMP_END;
        }
    }

    /// Returns true if a decompression descriptor hit the end of the stream.
    #[inline]
    pub fn is_stream_end(&self) -> bool {
        (self.dw3 & (DECOMP_END | STATUS_MASK))
            == (DECOMP_END | CompletionStatus::StreamEnd.as_u8() as u32)
    }

    /// Serialize to the little-endian 128-byte wire image.
    pub fn to_bytes(&self) -> [u8; SQE_SIZE] {
        let mut out = [0u8; SQE_SIZE];
        for (chunk, word) in out.chunks_exact_mut(4).zip(self.words()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Parse the little-endian 128-byte wire image.
    pub fn from_bytes(bytes: &[u8; SQE_SIZE]) -> Self {
        let mut words = [0u32; SQE_SIZE / 4];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self::from_words(words)
    }

    fn words(&self) -> [u32; SQE_SIZE / 4] {
        [
            self.consumed,
            self.produced,
            self.comp_data_length,
            self.dw3,
            self.input_data_length,
            self.lba_l,
            self.lba_h,
            self.dw7,
            self.dw8,
            self.dw9,
            self.dw10,
            self.priv_info,
            self.dw12,
            self.tag,
            self.dest_avail_out,
            self.ctx_dw0,
            self.comp_head_addr_l,
            self.comp_head_addr_h,
            self.source_addr_l,
            self.source_addr_h,
            self.dest_addr_l,
            self.dest_addr_h,
            self.stream_ctx_addr_l,
            self.stream_ctx_addr_h,
            self.cipher_key1_addr_l,
            self.cipher_key1_addr_h,
            self.cipher_key2_addr_l,
            self.cipher_key2_addr_h,
            self.ctx_dw1,
            self.ctx_dw2,
            self.isize,
            self.checksum,
        ]
    }

    fn from_words(w: [u32; SQE_SIZE / 4]) -> Self {
        Self {
            consumed: w[0],
            produced: w[1],
            comp_data_length: w[2],
            dw3: w[3],
            input_data_length: w[4],
            lba_l: w[5],
            lba_h: w[6],
            dw7: w[7],
            dw8: w[8],
            dw9: w[9],
            dw10: w[10],
            priv_info: w[11],
            dw12: w[12],
            tag: w[13],
            dest_avail_out: w[14],
            ctx_dw0: w[15],
            comp_head_addr_l: w[16],
            comp_head_addr_h: w[17],
            source_addr_l: w[18],
            source_addr_h: w[19],
            dest_addr_l: w[20],
            dest_addr_h: w[21],
            stream_ctx_addr_l: w[22],
            stream_ctx_addr_h: w[23],
            cipher_key1_addr_l: w[24],
            cipher_key1_addr_h: w[25],
            cipher_key2_addr_l: w[26],
            cipher_key2_addr_h: w[27],
            ctx_dw1: w[28],
            ctx_dw2: w[29],
            isize: w[30],
            checksum: w[31],
        }
    }
}

impl Default for ZipSqe {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// Descriptor completed.
    Success,
    /// Destination ran out of room; the accelerator still holds output.
    DestinationFull,
    /// Stream end marker.
    StreamEnd,
    /// Any other code.
    Unknown(u8),
}

impl From<u8> for CompletionStatus {
    fn from(status: u8) -> Self {
        match status {
            0x00 => Self::Success,
            0x0d => Self::DestinationFull,
            0x13 => Self::StreamEnd,
            _ => Self::Unknown(status),
        }
    }
}

impl CompletionStatus {
    /// Returns the raw status byte.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::DestinationFull => 0x0d,
            Self::StreamEnd => 0x13,
            Self::Unknown(code) => code,
        }
    }

    /// Returns true for success and the two informational codes.
    #[inline]
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

// Compile-time size and alignment checks against the firmware layout
const _: () = assert!(std::mem::size_of::<ZipSqe>() == SQE_SIZE);
const _: () = assert!(std::mem::align_of::<ZipSqe>() == 64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_size_and_alignment() {
        assert_eq!(std::mem::size_of::<ZipSqe>(), 128);
        assert_eq!(std::mem::align_of::<ZipSqe>(), 64);
    }

    #[test]
    fn test_field_offsets() {
        let sqe = ZipSqe::new();
        let base = &sqe as *const ZipSqe as usize;
        assert_eq!(&sqe.dw3 as *const u32 as usize - base, 12);
        assert_eq!(&sqe.dw7 as *const u32 as usize - base, 28);
        assert_eq!(&sqe.dw9 as *const u32 as usize - base, 36);
        assert_eq!(&sqe.tag as *const u32 as usize - base, 52);
        assert_eq!(&sqe.source_addr_l as *const u32 as usize - base, 72);
        assert_eq!(&sqe.ctx_dw1 as *const u32 as usize - base, 112);
        assert_eq!(&sqe.checksum as *const u32 as usize - base, 124);
    }

    #[test]
    fn test_flag_bits() {
        assert_eq!(SqeFlags::FINISH.bits(), 0x0200_0000);
        assert_eq!(SqeFlags::STATEFUL.bits(), 0x0400_0000);
        assert_eq!(SqeFlags::STREAM_NEW.bits(), 0x0800_0000);
    }

    #[test]
    fn test_stream_request() {
        let sqe = ZipSqe::stream_request(
            AlgType::Gzip,
            true,
            HwFlush::Finish,
            0x1_2345_6000,
            700,
            0x2_0000_0040,
            4096,
            0x3_0000_0000,
        );
        assert_eq!(sqe.alg_code(), 0x03);
        assert_eq!(
            sqe.flags(),
            SqeFlags::STATEFUL | SqeFlags::STREAM_NEW | SqeFlags::FINISH
        );
        assert_eq!(sqe.flush(), HwFlush::Finish);
        assert_eq!(sqe.source_addr_l, 0x2345_6000);
        assert_eq!(sqe.source_addr_h, 0x1);
        assert_eq!(sqe.source_addr(), 0x1_2345_6000);
        assert_eq!(sqe.dest_addr(), 0x2_0000_0040);
        assert_eq!(sqe.stream_ctx_addr(), 0x3_0000_0000);
        assert_eq!(sqe.input_data_length, 700);
        assert_eq!(sqe.dest_avail_out, 4096);
    }

    #[test]
    fn test_continuing_sync_request() {
        let sqe =
            ZipSqe::stream_request(AlgType::Zlib, false, HwFlush::Sync, 0, 0, 0, 0, 0);
        assert_eq!(sqe.dw7, SqeFlags::STATEFUL.bits());
        assert_eq!(sqe.flush(), HwFlush::Sync);
    }

    #[test]
    fn test_wire_image() {
        let mut sqe = ZipSqe::new();
        sqe.consumed = 0x0403_0201;
        sqe.checksum = 0xdead_beef;
        sqe.set_alg(AlgType::Zlib);
        let bytes = sqe.to_bytes();
        assert_eq!(&bytes[..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(bytes[36], 0x02);
        assert_eq!(&bytes[124..], &[0xef, 0xbe, 0xad, 0xde]);
        assert_eq!(ZipSqe::from_bytes(&bytes), sqe);
    }

    #[test]
    fn test_completion_status() {
        assert!(CompletionStatus::Success.is_accepted());
        assert!(CompletionStatus::from(0x0d).is_accepted());
        assert!(CompletionStatus::from(0x13).is_accepted());
        assert!(!CompletionStatus::from(0x05).is_accepted());
        assert_eq!(CompletionStatus::from(0x42), CompletionStatus::Unknown(0x42));
    }

    #[test]
    fn test_stream_end_flag() {
        let mut sqe = ZipSqe::new();
        sqe.set_status(CompletionStatus::StreamEnd, true);
        assert_eq!(sqe.dw3, 0x113);
        assert!(sqe.is_stream_end());

        sqe.set_status(CompletionStatus::StreamEnd, false);
        assert!(!sqe.is_stream_end());

        sqe.set_status(CompletionStatus::Success, true);
        assert!(!sqe.is_stream_end());
    }
}
