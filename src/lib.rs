// Hardware Zip Accelerator Streaming Bridge
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! # Hardware Zip Accelerator Streaming Bridge
//!
//! This crate drives zlib, gzip and raw deflate streams through a hardware
//! compression accelerator that works on fixed-size 128-byte descriptors.
//! Callers feed arbitrarily sized input and output buffers; the bridge stages
//! input into DMA-visible memory, issues one descriptor at a time, and hands
//! produced bytes back as room allows.
//!
//! ## Supported Streams
//!
//! | Algorithm | Header | Trailer |
//! |-----------|--------|---------|
//! | Raw deflate | none | none |
//! | zlib | 2 bytes | Adler-32 (big-endian) |
//! | gzip | 10 bytes | CRC-32 + ISIZE (little-endian) |
//!
//! The accelerator only handles the deflate payload. Headers, trailers and
//! running checksums are produced and verified in software.
//!
//! ## Accelerator Access
//!
//! Device access sits behind two traits in [`queue`]: a [`QueueProvider`]
//! opens [`Channel`]s, and a channel submits descriptors, polls completions
//! and hands out DMA memory. With the default `soft-channel` feature the
//! crate ships [`SoftAccelerator`], which executes descriptors with flate2
//! engines and can inject queue faults.
//!
//! ## Example
//!
//! ```rust
//! # #[cfg(feature = "soft-channel")]
//! # fn main() -> Result<(), hzip_bridge::ZipError> {
//! use hzip_bridge::{AlgType, Direction, Flush, Session, SessionConfig, SoftAccelerator, StepStatus};
//!
//! let accel = SoftAccelerator::new();
//! let mut session = Session::init(&accel, Direction::Compress, AlgType::Zlib, SessionConfig::default())?;
//!
//! let data = b"Hello, accelerator! Hello, accelerator!";
//! let mut out = vec![0u8; 128];
//! let step = session.step(data, &mut out, Flush::Finish)?;
//! assert_eq!(step.status, StepStatus::FinishDone);
//! println!("compressed {} bytes into {}", step.bytes_read, step.bytes_written);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "soft-channel"))]
//! # fn main() {}
//! ```
//!
//! ## Errors
//!
//! Setup failures ([`ZipError::is_setup_failure`]) leave nothing behind and
//! let callers fall back to a software codec. Every other error poisons the
//! session.

// Module declarations
pub mod alg;
pub mod buffer;
pub mod checksum;
pub mod config;
pub mod descriptor;
pub mod dma;
pub mod error;
pub mod queue;
pub mod session;
#[cfg(feature = "soft-channel")]
pub mod soft;
pub mod submit;
pub mod wrapper;

// Re-exports for convenient access
pub use alg::{AlgType, Direction, Flush, HwFlush};
pub use config::SessionConfig;
pub use descriptor::{CompletionStatus, SqeFlags, ZipSqe};
pub use dma::DmaRegion;
pub use error::{ZipError, ZipResult};
pub use queue::{Channel, PollStatus, QueueProvider, SubmitStatus};
pub use session::{Session, Step, StepStatus};
#[cfg(feature = "soft-channel")]
pub use soft::{FaultPlan, SoftAccelerator, SoftChannel, SoftStats};
