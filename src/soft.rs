// Hardware Zip Accelerator Streaming Bridge
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Software-emulated accelerator.
//!
//! [`SoftAccelerator`] implements the queue seams with flate2 raw deflate and
//! inflate engines standing in for the hardware stream state. It follows the
//! same conventions as the device firmware:
//!
//! - descriptors address DMA memory directly (unified addressing);
//! - compression output of zlib/gzip channels ends with a per-descriptor
//!   segment trailer that the host strips;
//! - `STREAM_NEW` restarts the engine, `FINISH` closes a deflate stream;
//! - a full destination is reported as status `0x0d`, end of an inflate
//!   stream as `0x113`.
//!
//! Faults can be injected to exercise the retry and error paths.

use crate::alg::{AlgType, Direction, HwFlush};
use crate::checksum::{adler32, crc32, StreamChecksum, ADLER_INIT};
use crate::descriptor::{CompletionStatus, SqeFlags, ZipSqe, SQE_SIZE};
use crate::dma::DmaRegion;
use crate::error::{ZipError, ZipResult};
use crate::queue::{Channel, PollStatus, QueueProvider, SubmitStatus};
use crate::wrapper::trailer_len;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Status reported for corrupt deflate input.
const STATUS_DATA_ERROR: u8 = 0x06;

/// Faults injected into every channel of a [`SoftAccelerator`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// Answer each submission with this many busy replies first.
    pub busy_per_submit: u32,
    /// Answer each poll sequence with this many not-ready replies first.
    pub not_ready_per_poll: u32,
    /// Refuse to open channels.
    pub fail_open: bool,
    /// Refuse DMA reservations.
    pub fail_reserve: bool,
    /// Fail the receive of the n-th completion (1-based) with an I/O error.
    pub io_error_on: Option<u64>,
    /// Report this status byte instead of the computed one.
    pub status_override: Option<u8>,
}

/// Counters shared by a [`SoftAccelerator`] and its channels.
#[derive(Debug, Default)]
pub struct SoftStats {
    opened: AtomicU64,
    closed: AtomicU64,
    reserved: AtomicU64,
    released: AtomicU64,
    submitted: AtomicU64,
    busy: AtomicU64,
    completed: AtomicU64,
}

impl SoftStats {
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }

    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::Relaxed)
    }

    pub fn regions_reserved(&self) -> u64 {
        self.reserved.load(Ordering::Relaxed)
    }

    pub fn regions_released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    /// Accepted descriptors.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Busy replies handed out.
    pub fn busy(&self) -> u64 {
        self.busy.load(Ordering::Relaxed)
    }

    /// Completions delivered.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

/// Software accelerator opening [`SoftChannel`]s.
#[derive(Debug, Clone, Default)]
pub struct SoftAccelerator {
    faults: FaultPlan,
    stats: Arc<SoftStats>,
}

impl SoftAccelerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accelerator whose channels misbehave according to `faults`.
    pub fn with_faults(faults: FaultPlan) -> Self {
        Self {
            faults,
            stats: Arc::default(),
        }
    }

    /// Shared counters.
    pub fn stats(&self) -> Arc<SoftStats> {
        Arc::clone(&self.stats)
    }
}

impl QueueProvider for SoftAccelerator {
    type Channel = SoftChannel;

    fn open_channel(
        &self,
        alg: AlgType,
        direction: Direction,
        sqe_size: u16,
    ) -> ZipResult<SoftChannel> {
        if self.faults.fail_open {
            return Err(ZipError::ChannelOpen(format!(
                "no {} {:?} queue available",
                alg.name(),
                direction
            )));
        }
        if sqe_size as usize != SQE_SIZE {
            return Err(ZipError::ChannelOpen(format!(
                "descriptor size {sqe_size} not supported"
            )));
        }
        self.stats.opened.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "soft channel opened: {} op {} ({:?})",
            alg,
            direction.as_u16(),
            direction
        );
        Ok(SoftChannel::new(
            alg,
            direction,
            self.faults.clone(),
            Arc::clone(&self.stats),
        ))
    }
}

enum Engine {
    Deflate(Compress),
    Inflate(Decompress),
}

impl Engine {
    fn new(direction: Direction) -> Self {
        match direction {
            Direction::Compress => Self::Deflate(Compress::new(Compression::default(), false)),
            Direction::Decompress => Self::Inflate(Decompress::new(false)),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Deflate(c) => c.reset(),
            Self::Inflate(d) => d.reset(false),
        }
    }
}

/// One emulated hardware channel with a queue depth of one.
pub struct SoftChannel {
    alg: AlgType,
    direction: Direction,
    engine: Engine,
    outstanding: Option<ZipSqe>,
    /// Context words handed out with the last completion.
    ctx: [u32; 3],
    faults: FaultPlan,
    stats: Arc<SoftStats>,
    busy_left: u32,
    not_ready_left: u32,
    deliveries: u64,
    closed: bool,
}

impl SoftChannel {
    fn new(alg: AlgType, direction: Direction, faults: FaultPlan, stats: Arc<SoftStats>) -> Self {
        Self {
            alg,
            direction,
            engine: Engine::new(direction),
            outstanding: None,
            ctx: [0; 3],
            busy_left: faults.busy_per_submit,
            not_ready_left: 0,
            faults,
            stats,
            deliveries: 0,
            closed: false,
        }
    }

    fn execute(&mut self, sqe: &ZipSqe) -> ZipResult<ZipSqe> {
        let fresh = sqe.flags().contains(SqeFlags::STREAM_NEW);
        if fresh {
            self.engine.reset();
            self.ctx = [0; 3];
        } else if sqe.ctx_words() != self.ctx {
            return Err(ZipError::SubmitFailed(format!(
                "stale stream context {:x?}, expected {:x?}",
                sqe.ctx_words(),
                self.ctx
            )));
        }

        // SAFETY: the submitting session owns the region behind these
        // addresses and blocks until this descriptor completes, so the ranges
        // are valid and not accessed concurrently. Source and destination
        // lie in disjoint slots.
        let src: &[u8] = match sqe.input_data_length {
            0 => &[],
            len => unsafe {
                std::slice::from_raw_parts(sqe.source_addr() as *const u8, len as usize)
            },
        };
        let dst: &mut [u8] = match sqe.dest_avail_out {
            0 => &mut [],
            len => unsafe {
                std::slice::from_raw_parts_mut(sqe.dest_addr() as *mut u8, len as usize)
            },
        };

        let mut record = *sqe;
        let (consumed, produced, status, stream_end) = match &mut self.engine {
            Engine::Deflate(c) => deflate(self.alg, c, sqe.flush(), src, dst)?,
            Engine::Inflate(d) => inflate(d, src, dst),
        };

        let mut checksum = match self.alg {
            AlgType::Raw => StreamChecksum::None,
            AlgType::Zlib => StreamChecksum::Adler32(if fresh { ADLER_INIT } else { sqe.checksum }),
            AlgType::Gzip => StreamChecksum::Crc32(if fresh { 0 } else { sqe.checksum }),
        };
        let isize_seed = if fresh { 0 } else { sqe.isize };
        let plain = match self.direction {
            Direction::Compress => &src[..consumed],
            Direction::Decompress => &dst[..produced],
        };
        checksum.update(plain);

        record.consumed = consumed as u32;
        record.produced = produced as u32;
        record.checksum = checksum.value();
        record.isize = isize_seed.wrapping_add(plain.len() as u32);
        match self.faults.status_override {
            Some(code) => record.dw3 = code as u32,
            None => record.set_status(status, stream_end),
        }

        self.ctx = [
            self.ctx[0].wrapping_add(1),
            self.ctx[1].wrapping_add(consumed as u32),
            self.ctx[2].wrapping_add(produced as u32),
        ];
        record.set_ctx_words(self.ctx);
        Ok(record)
    }
}

/// Run one deflate descriptor; appends the segment trailer for wrapped algorithms.
fn deflate(
    alg: AlgType,
    engine: &mut Compress,
    flush: HwFlush,
    src: &[u8],
    dst: &mut [u8],
) -> ZipResult<(usize, usize, CompletionStatus, bool)> {
    let tl = trailer_len(alg);
    if dst.len() < tl {
        return Ok((0, 0, CompletionStatus::DestinationFull, false));
    }
    let cap = dst.len() - tl;
    let mode = match flush {
        HwFlush::Sync => FlushCompress::Sync,
        HwFlush::Finish => FlushCompress::Finish,
    };

    let (in_before, out_before) = (engine.total_in(), engine.total_out());
    let result = engine
        .compress(src, &mut dst[..cap], mode)
        .map_err(|e| ZipError::SubmitFailed(format!("deflate engine: {e}")))?;
    let consumed = (engine.total_in() - in_before) as usize;
    let mut produced = (engine.total_out() - out_before) as usize;

    let complete = match flush {
        HwFlush::Sync => consumed == src.len() && produced < cap,
        HwFlush::Finish => result == Status::StreamEnd,
    };
    let status = if complete {
        CompletionStatus::Success
    } else {
        CompletionStatus::DestinationFull
    };

    let segment = &src[..consumed];
    match alg {
        AlgType::Raw => {}
        AlgType::Zlib => {
            let sum = adler32(ADLER_INIT, segment);
            dst[produced..produced + 4].copy_from_slice(&sum.to_be_bytes());
            produced += 4;
        }
        AlgType::Gzip => {
            let sum = crc32(0, segment);
            dst[produced..produced + 4].copy_from_slice(&sum.to_le_bytes());
            dst[produced + 4..produced + 8].copy_from_slice(&(consumed as u32).to_le_bytes());
            produced += 8;
        }
    }
    Ok((consumed, produced, status, false))
}

/// Run one inflate descriptor over raw deflate data.
fn inflate(
    engine: &mut Decompress,
    src: &[u8],
    dst: &mut [u8],
) -> (usize, usize, CompletionStatus, bool) {
    let (in_before, out_before) = (engine.total_in(), engine.total_out());
    let result = engine.decompress(src, dst, FlushDecompress::None);
    let consumed = (engine.total_in() - in_before) as usize;
    let produced = (engine.total_out() - out_before) as usize;

    match result {
        Ok(Status::StreamEnd) => (consumed, produced, CompletionStatus::StreamEnd, true),
        Ok(_) if produced == dst.len() && !dst.is_empty() => {
            (consumed, produced, CompletionStatus::DestinationFull, false)
        }
        Ok(_) => (consumed, produced, CompletionStatus::Success, false),
        Err(e) => {
            log::debug!("soft inflate rejected input: {}", e);
            (
                consumed,
                produced,
                CompletionStatus::Unknown(STATUS_DATA_ERROR),
                false,
            )
        }
    }
}

impl Channel for SoftChannel {
    fn submit(&mut self, sqe: &ZipSqe) -> ZipResult<SubmitStatus> {
        if self.closed {
            return Err(ZipError::SubmitFailed("channel closed".into()));
        }
        if self.busy_left > 0 {
            self.busy_left -= 1;
            self.stats.busy.fetch_add(1, Ordering::Relaxed);
            return Ok(SubmitStatus::Busy);
        }
        if self.outstanding.is_some() {
            return Err(ZipError::SubmitFailed(
                "a descriptor is already outstanding".into(),
            ));
        }
        if AlgType::from_u8(sqe.alg_code()) != Some(self.alg) {
            return Err(ZipError::SubmitFailed(format!(
                "descriptor algorithm {:#04x} on a {} channel",
                sqe.alg_code(),
                self.alg.name()
            )));
        }

        let record = self.execute(sqe)?;
        self.outstanding = Some(record);
        self.busy_left = self.faults.busy_per_submit;
        self.not_ready_left = self.faults.not_ready_per_poll;
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(SubmitStatus::Accepted)
    }

    fn poll(&mut self) -> ZipResult<PollStatus> {
        if self.outstanding.is_none() {
            return Ok(PollStatus::NotReady);
        }
        if self.not_ready_left > 0 {
            self.not_ready_left -= 1;
            return Ok(PollStatus::NotReady);
        }
        self.deliveries += 1;
        if self.faults.io_error_on == Some(self.deliveries) {
            self.outstanding = None;
            return Err(ZipError::Io(std::io::Error::other(
                "injected receive failure",
            )));
        }
        match self.outstanding.take() {
            Some(record) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                Ok(PollStatus::Ready(record))
            }
            None => Ok(PollStatus::NotReady),
        }
    }

    fn reserve_dma_region(&mut self, size: usize) -> ZipResult<DmaRegion> {
        if self.faults.fail_reserve {
            return Err(ZipError::DmaReservation { size });
        }
        let region = DmaRegion::anonymous(size)?;
        self.stats.reserved.fetch_add(1, Ordering::Relaxed);
        Ok(region)
    }

    fn release_dma_region(&mut self, region: DmaRegion) {
        self.stats.released.fetch_add(1, Ordering::Relaxed);
        drop(region);
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stats.closed.fetch_add(1, Ordering::Relaxed);
            log::debug!("soft channel closed: {} {:?}", self.alg, self.direction);
        }
    }
}
