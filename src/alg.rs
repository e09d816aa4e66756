// Hardware Zip Accelerator Streaming Bridge
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Algorithm, direction and flush selectors.
//!
//! The algorithm codes match the accelerator firmware's `dw9` encoding.

/// Stream format handled by a session.
///
/// Each variant has a unique 8-bit code that is placed in the low byte of
/// the descriptor's `dw9` word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AlgType {
    /// Bare deflate data, no wrapper.
    Raw = 0x01,

    /// zlib wrapper: 2-byte header, 4-byte Adler-32 trailer.
    Zlib = 0x02,

    /// gzip wrapper: 10-byte header, CRC-32 + ISIZE trailer.
    Gzip = 0x03,
}

impl AlgType {
    /// Returns the algorithm code as a u8 value.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode an algorithm code.
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Raw),
            0x02 => Some(Self::Zlib),
            0x03 => Some(Self::Gzip),
            _ => None,
        }
    }

    /// Returns the channel capability name for the algorithm.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Raw => "deflate",
            Self::Zlib => "zlib",
            Self::Gzip => "gzip",
        }
    }
}

impl std::fmt::Display for AlgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:#04x})", self.name(), self.as_u8())
    }
}

/// Operation a channel performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Direction {
    /// Deflate.
    Compress = 0,
    /// Inflate.
    Decompress = 1,
}

impl Direction {
    /// Operation type as passed to the channel at open time.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Flush request from the caller of [`Session::step`](crate::Session::step).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flush {
    /// Accumulate input; offload once enough is staged.
    #[default]
    None,
    /// End the logical stream.
    Finish,
}

/// Flush type carried by a work descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwFlush {
    /// Emit everything processed at a byte boundary, keep the stream open.
    Sync,
    /// Close the stream.
    Finish,
}
