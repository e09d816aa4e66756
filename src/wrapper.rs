// Hardware Zip Accelerator Streaming Bridge
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! zlib and gzip wrapper bytes.
//!
//! The accelerator only handles the deflate payload. On compression the
//! bridge emits a fixed header and builds the trailer from its running
//! checksum; on decompression it checks both.

use crate::alg::AlgType;
use crate::error::{ZipError, ZipResult};

/// zlib header: deflate, 32K window, default level.
pub const ZLIB_HEADER: [u8; 2] = [0x78, 0x9c];

/// gzip header: deflate, no flags, no mtime, OS = Unix.
pub const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03];

pub const ZLIB_TRAILER_LEN: usize = 4;
pub const GZIP_TRAILER_LEN: usize = 8;

/// Longest trailer of any wrapper.
pub const MAX_TRAILER_LEN: usize = GZIP_TRAILER_LEN;

const GZIP_FTEXT: u8 = 0x01;

/// Header emitted for a compressed stream.
pub const fn header(alg: AlgType) -> &'static [u8] {
    match alg {
        AlgType::Raw => &[],
        AlgType::Zlib => &ZLIB_HEADER,
        AlgType::Gzip => &GZIP_HEADER,
    }
}

#[inline]
pub const fn header_len(alg: AlgType) -> usize {
    header(alg).len()
}

#[inline]
pub const fn trailer_len(alg: AlgType) -> usize {
    match alg {
        AlgType::Raw => 0,
        AlgType::Zlib => ZLIB_TRAILER_LEN,
        AlgType::Gzip => GZIP_TRAILER_LEN,
    }
}

/// Write the trailer into `out`, returning its length.
///
/// zlib stores the Adler-32 big-endian; gzip stores CRC-32 then the input
/// size modulo 2^32, both little-endian.
pub fn encode_trailer(alg: AlgType, checksum: u32, isize: u32, out: &mut [u8]) -> usize {
    let len = trailer_len(alg);
    assert!(out.len() >= len, "no room for {} trailer", alg.name());
    match alg {
        AlgType::Raw => {}
        AlgType::Zlib => out[..4].copy_from_slice(&checksum.to_be_bytes()),
        AlgType::Gzip => {
            out[..4].copy_from_slice(&checksum.to_le_bytes());
            out[4..8].copy_from_slice(&isize.to_le_bytes());
        }
    }
    len
}

/// Validate a stream header. `bytes` must hold at least [`header_len`] bytes.
pub fn check_header(alg: AlgType, bytes: &[u8]) -> ZipResult<()> {
    if bytes.len() < header_len(alg) {
        return Err(ZipError::TruncatedStream(format!(
            "{} header needs {} bytes, have {}",
            alg.name(),
            header_len(alg),
            bytes.len()
        )));
    }
    match alg {
        AlgType::Raw => Ok(()),
        AlgType::Zlib => {
            let (cmf, flg) = (bytes[0], bytes[1]);
            if cmf & 0x0f != 8 || cmf >> 4 > 7 {
                return Err(ZipError::BadHeader(format!(
                    "zlib CMF {cmf:#04x} is not deflate"
                )));
            }
            if ((cmf as u16) << 8 | flg as u16) % 31 != 0 {
                return Err(ZipError::BadHeader("zlib header check bits".into()));
            }
            if flg & 0x20 != 0 {
                return Err(ZipError::BadHeader(
                    "zlib preset dictionary not supported".into(),
                ));
            }
            Ok(())
        }
        AlgType::Gzip => {
            if bytes[0] != 0x1f || bytes[1] != 0x8b {
                return Err(ZipError::BadHeader("gzip magic".into()));
            }
            if bytes[2] != 0x08 {
                return Err(ZipError::BadHeader(format!(
                    "gzip method {:#04x} is not deflate",
                    bytes[2]
                )));
            }
            if bytes[3] & !GZIP_FTEXT != 0 {
                return Err(ZipError::BadHeader(format!(
                    "gzip flags {:#04x} need a variable-length header",
                    bytes[3]
                )));
            }
            Ok(())
        }
    }
}

/// Validate a stream trailer against the running checksum and size.
pub fn check_trailer(alg: AlgType, bytes: &[u8], checksum: u32, isize: u32) -> ZipResult<()> {
    let len = trailer_len(alg);
    if bytes.len() < len {
        return Err(ZipError::TruncatedStream(format!(
            "{} trailer needs {} bytes, have {}",
            alg.name(),
            len,
            bytes.len()
        )));
    }
    match alg {
        AlgType::Raw => Ok(()),
        AlgType::Zlib => {
            let expected = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            if expected != checksum {
                return Err(ZipError::ChecksumMismatch {
                    expected,
                    actual: checksum,
                });
            }
            Ok(())
        }
        AlgType::Gzip => {
            let expected = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            if expected != checksum {
                return Err(ZipError::ChecksumMismatch {
                    expected,
                    actual: checksum,
                });
            }
            let size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
            if size != isize {
                return Err(ZipError::SizeMismatch {
                    expected: size,
                    actual: isize,
                });
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lengths() {
        assert_eq!(header_len(AlgType::Raw), 0);
        assert_eq!(header_len(AlgType::Zlib), 2);
        assert_eq!(header_len(AlgType::Gzip), 10);
        assert_eq!(trailer_len(AlgType::Zlib), 4);
        assert_eq!(trailer_len(AlgType::Gzip), 8);
    }

    #[test]
    fn test_own_headers_validate() {
        check_header(AlgType::Zlib, &ZLIB_HEADER).unwrap();
        check_header(AlgType::Gzip, &GZIP_HEADER).unwrap();
        // other zlib levels
        check_header(AlgType::Zlib, &[0x78, 0x01]).unwrap();
        check_header(AlgType::Zlib, &[0x78, 0xda]).unwrap();
    }

    #[test]
    fn test_bad_headers() {
        assert!(matches!(
            check_header(AlgType::Zlib, &[0x78, 0x9d]),
            Err(ZipError::BadHeader(_))
        ));
        assert!(matches!(
            check_header(AlgType::Zlib, &[0x78, 0xbb]),
            Err(ZipError::BadHeader(_))
        ));
        let mut named = GZIP_HEADER;
        named[3] = 0x08;
        assert!(matches!(
            check_header(AlgType::Gzip, &named),
            Err(ZipError::BadHeader(_))
        ));
        assert!(matches!(
            check_header(AlgType::Gzip, &GZIP_HEADER[..6]),
            Err(ZipError::TruncatedStream(_))
        ));
    }

    #[test]
    fn test_trailer_encoding() {
        let mut buf = [0u8; 8];
        assert_eq!(encode_trailer(AlgType::Zlib, 0x11e6_0398, 0, &mut buf), 4);
        assert_eq!(&buf[..4], &[0x11, 0xe6, 0x03, 0x98]);

        assert_eq!(encode_trailer(AlgType::Gzip, 0xcbf4_3926, 9, &mut buf), 8);
        assert_eq!(buf, [0x26, 0x39, 0xf4, 0xcb, 9, 0, 0, 0]);
        check_trailer(AlgType::Gzip, &buf, 0xcbf4_3926, 9).unwrap();
    }

    #[test]
    fn test_trailer_mismatch() {
        let mut buf = [0u8; 8];
        encode_trailer(AlgType::Gzip, 0xcbf4_3926, 9, &mut buf);
        assert!(matches!(
            check_trailer(AlgType::Gzip, &buf, 0xcbf4_3927, 9),
            Err(ZipError::ChecksumMismatch { .. })
        ));
        assert!(matches!(
            check_trailer(AlgType::Gzip, &buf, 0xcbf4_3926, 10),
            Err(ZipError::SizeMismatch {
                expected: 9,
                actual: 10
            })
        ));
        assert!(matches!(
            check_trailer(AlgType::Zlib, &buf[..3], 0, 0),
            Err(ZipError::TruncatedStream(_))
        ));
    }
}
