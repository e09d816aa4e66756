// Hardware Zip Accelerator Streaming Bridge
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Running stream checksums.
//!
//! zlib streams carry an Adler-32, gzip streams a CRC-32 (IEEE). Both are
//! maintained in software across round-trips and are authoritative over
//! whatever the accelerator reports.

use crate::alg::AlgType;

/// Adler-32 modulus.
const ADLER_MOD: u32 = 65_521;

/// Largest block for which the Adler sums cannot overflow u32.
const ADLER_NMAX: usize = 5_552;

/// Adler-32 of an empty input.
pub const ADLER_INIT: u32 = 1;

/// Continue an Adler-32 from `seed` over `data`.
pub fn adler32(seed: u32, data: &[u8]) -> u32 {
    let mut a = seed & 0xffff;
    let mut b = seed >> 16;
    for block in data.chunks(ADLER_NMAX) {
        for &byte in block {
            a += byte as u32;
            b += a;
        }
        a %= ADLER_MOD;
        b %= ADLER_MOD;
    }
    (b << 16) | a
}

/// Continue a CRC-32 from `seed` over `data`.
pub fn crc32(seed: u32, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(seed);
    hasher.update(data);
    hasher.finalize()
}

/// Checksum accumulator matching a stream's wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamChecksum {
    /// Raw deflate, nothing to track.
    None,
    Adler32(u32),
    Crc32(u32),
}

impl StreamChecksum {
    /// Fresh accumulator for `alg`.
    pub const fn for_alg(alg: AlgType) -> Self {
        match alg {
            AlgType::Raw => Self::None,
            AlgType::Zlib => Self::Adler32(ADLER_INIT),
            AlgType::Gzip => Self::Crc32(0),
        }
    }

    /// Fold `data` into the running value.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::None => {}
            Self::Adler32(v) => *v = adler32(*v, data),
            Self::Crc32(v) => *v = crc32(*v, data),
        }
    }

    /// Current value (0 for raw streams).
    pub const fn value(&self) -> u32 {
        match *self {
            Self::None => 0,
            Self::Adler32(v) | Self::Crc32(v) => v,
        }
    }

    /// Back to the initial value of the same kind.
    pub fn reset(&mut self) {
        *self = match self {
            Self::None => Self::None,
            Self::Adler32(_) => Self::Adler32(ADLER_INIT),
            Self::Crc32(_) => Self::Crc32(0),
        };
    }
}
