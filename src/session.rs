// Hardware Zip Accelerator Streaming Bridge
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Streaming offload sessions.
//!
//! A [`Session`] owns one accelerator channel and one DMA region carved into
//! an input stage, an output stage and the hardware stream context. Each
//! [`Session::step`] call ingests caller input, decides whether a round-trip
//! to the accelerator is due, and drains produced bytes into the caller's
//! buffer.

use crate::alg::{AlgType, Direction, Flush, HwFlush};
use crate::buffer::{InputStage, OutputStage};
use crate::checksum::StreamChecksum;
use crate::config::SessionConfig;
use crate::descriptor::{CompletionStatus, ZipSqe, SQE_SIZE};
use crate::dma::{BufSlot, DmaLayout, DmaRegion};
use crate::error::{ZipError, ZipResult};
use crate::queue::{Channel, QueueProvider};
use crate::submit::{self, RetryPolicy};
use crate::wrapper::{self, MAX_TRAILER_LEN};

/// Outcome class of one [`Session::step`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Staged input is below the offload threshold; supply more input.
    NeedMoreInput,
    /// Produced bytes are still pending; supply more output room.
    NeedMoreOutput,
    /// A round-trip completed and its output was fully delivered.
    BlockDone,
    /// The stream ended and all of its output was delivered.
    FinishDone,
}

/// Result of one [`Session::step`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// How far the stream got during the call.
    pub status: StepStatus,
    /// Bytes taken from the caller's input.
    pub bytes_read: usize,
    /// Bytes written to the caller's output.
    pub bytes_written: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No round-trip issued for the current stream yet.
    Fresh,
    /// At least one round-trip issued; the accelerator holds stream context.
    Continuing,
    /// Decompression payload ended; waiting for the wrapper trailer.
    Trailer,
    /// Stream complete; remaining output is being delivered.
    Ended,
    /// A fatal error occurred.
    Poisoned,
}

struct Resources<C> {
    channel: C,
    region: DmaRegion,
}

/// Caller buffers of one step call.
struct CallerIo<'a> {
    input: &'a [u8],
    output: &'a mut [u8],
    read: usize,
    written: usize,
}

impl CallerIo<'_> {
    fn unread(&self) -> &[u8] {
        &self.input[self.read..]
    }

    fn room(&self) -> usize {
        self.output.len() - self.written
    }
}

/// One compression or decompression stream offloaded to an accelerator.
///
/// The session keeps at most one descriptor outstanding and blocks inside
/// [`step`](Self::step) until its completion arrives. Consecutive streams may
/// run through the same session: after [`StepStatus::FinishDone`] the next
/// call starts a fresh stream.
///
/// # Example
///
/// ```rust
/// # #[cfg(feature = "soft-channel")]
/// # fn main() -> Result<(), hzip_bridge::ZipError> {
/// use hzip_bridge::{AlgType, Direction, Flush, Session, SessionConfig, SoftAccelerator, StepStatus};
///
/// let accel = SoftAccelerator::new();
/// let config = SessionConfig::default().with_in_capacity(4096).with_out_capacity(8192);
/// let mut session = Session::init(&accel, Direction::Compress, AlgType::Gzip, config)?;
///
/// let mut out = vec![0u8; 256];
/// let step = session.step(b"hello hello hello", &mut out, Flush::Finish)?;
/// assert_eq!(step.status, StepStatus::FinishDone);
/// assert_eq!(&out[..2], &[0x1f, 0x8b]);
/// session.end();
/// # Ok(())
/// # }
/// # #[cfg(not(feature = "soft-channel"))]
/// # fn main() {}
/// ```
pub struct Session<C: Channel> {
    res: Option<Resources<C>>,
    direction: Direction,
    alg: AlgType,
    policy: RetryPolicy,
    input: InputStage,
    output: OutputStage,
    ctx_slot: BufSlot,
    ctx_words: [u32; 3],
    phase: Phase,
    /// The accelerator reported a full destination and still holds output.
    hw_pending: bool,
    /// A compress finish round-trip was issued and the trailer is not out yet.
    finishing: bool,
    checksum: StreamChecksum,
    /// Uncompressed length of the current stream modulo 2^32.
    isize: u32,
    total_in: u64,
    total_out: u64,
    next_tag: u32,
    finished: bool,
}

impl<C: Channel> Session<C> {
    /// Open a channel and reserve the session's DMA region.
    ///
    /// # Errors
    ///
    /// Returns an error for which [`ZipError::is_setup_failure`] is true if
    /// the configuration is invalid, no channel can be opened, or the DMA
    /// region cannot be reserved or translated. Anything acquired before the
    /// failure is released again.
    pub fn init<P>(
        provider: &P,
        direction: Direction,
        alg: AlgType,
        config: SessionConfig,
    ) -> ZipResult<Self>
    where
        P: QueueProvider<Channel = C> + ?Sized,
    {
        config.validate()?;
        let layout = DmaLayout::new(config.in_capacity, config.out_capacity, config.ctx_size);

        let channel = provider
            .open_channel(alg, direction, SQE_SIZE as u16)
            .map_err(|e| match e {
                e if e.is_setup_failure() => e,
                e => ZipError::ChannelOpen(e.to_string()),
            })?;
        let mut channel = scopeguard::guard(channel, |mut channel| {
            log::debug!("closing channel after failed session setup");
            channel.close();
        });

        let mut region = channel
            .reserve_dma_region(layout.region_size)
            .map_err(|e| match e {
                e if e.is_setup_failure() => e,
                _ => ZipError::DmaReservation {
                    size: layout.region_size,
                },
            })?;
        if let Err(e) = prepare_region(&*channel, &mut region, &layout) {
            channel.release_dma_region(region);
            return Err(e);
        }
        let channel = scopeguard::ScopeGuard::into_inner(channel);

        log::info!(
            "opened {} {:?} session: in={} out={} ctx={} region={}",
            alg.name(),
            direction,
            layout.input.capacity,
            layout.output.capacity,
            layout.ctx.capacity,
            region.len()
        );

        Ok(Self {
            res: Some(Resources { channel, region }),
            direction,
            alg,
            policy: config.retry_policy(),
            input: InputStage::new(layout.input, config.min_chunk),
            output: OutputStage::new(layout.output),
            ctx_slot: layout.ctx,
            ctx_words: [0; 3],
            phase: Phase::Fresh,
            hw_pending: false,
            finishing: false,
            checksum: StreamChecksum::for_alg(alg),
            isize: 0,
            total_in: 0,
            total_out: 0,
            next_tag: 0,
            finished: false,
        })
    }

    /// Advance the stream with the given caller buffers.
    ///
    /// Takes as much of `input` as fits the input stage, issues at most one
    /// round-trip, and copies as much pending output as fits into `output`.
    /// With [`Flush::Finish`] the stream is terminated once all of `input`
    /// has been staged; callers keep passing the remaining input with
    /// `Finish` until [`StepStatus::FinishDone`]. A call with empty `input`
    /// while input is staged is treated as a finish request.
    ///
    /// # Errors
    ///
    /// Any error poisons the session; later calls fail with
    /// [`ZipError::SessionPoisoned`].
    pub fn step(&mut self, input: &[u8], output: &mut [u8], flush: Flush) -> ZipResult<Step> {
        if self.res.is_none() {
            return Err(ZipError::SessionEnded);
        }
        if self.phase == Phase::Poisoned {
            return Err(ZipError::SessionPoisoned);
        }

        let mut io = CallerIo {
            input,
            output,
            read: 0,
            written: 0,
        };
        let result = self.advance(&mut io, flush);
        self.total_in += io.read as u64;
        self.total_out += io.written as u64;

        match result {
            Ok(status) => {
                if status == StepStatus::FinishDone {
                    self.finished = true;
                } else if io.read > 0 {
                    self.finished = false;
                }
                Ok(Step {
                    status,
                    bytes_read: io.read,
                    bytes_written: io.written,
                })
            }
            Err(e) => {
                log::error!("{} {:?} session failed: {}", self.alg.name(), self.direction, e);
                self.phase = Phase::Poisoned;
                Err(e)
            }
        }
    }

    /// Release the DMA region and close the channel.
    ///
    /// Idempotent; also runs on drop.
    pub fn end(&mut self) {
        if let Some(Resources {
            mut channel,
            region,
        }) = self.res.take()
        {
            channel.release_dma_region(region);
            channel.close();
            log::info!(
                "closed {} {:?} session: in={} out={}",
                self.alg.name(),
                self.direction,
                self.total_in,
                self.total_out
            );
        }
    }

    /// Caller bytes consumed over the session's lifetime.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Bytes delivered to the caller over the session's lifetime.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Running checksum of the current (or just finished) stream's plaintext.
    ///
    /// Adler-32 for zlib, CRC-32 for gzip, 0 for raw deflate.
    pub fn checksum(&self) -> u32 {
        self.checksum.value()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn alg(&self) -> AlgType {
        self.alg
    }

    /// True after a step returned [`StepStatus::FinishDone`] and before new
    /// input was taken.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// True once [`end`](Self::end) ran.
    pub fn is_ended(&self) -> bool {
        self.res.is_none()
    }

    /// True after a fatal error.
    pub fn is_poisoned(&self) -> bool {
        self.phase == Phase::Poisoned
    }

    /// The flow-control transition function.
    fn advance(&mut self, io: &mut CallerIo<'_>, flush: Flush) -> ZipResult<StepStatus> {
        if !self.output.is_empty() {
            if io.room() == 0 {
                return Ok(StepStatus::NeedMoreOutput);
            }
            self.drain(io)?;
            if !self.output.is_empty() {
                return Ok(StepStatus::NeedMoreOutput);
            }
            if self.phase == Phase::Ended {
                self.reset_stream();
                return Ok(StepStatus::FinishDone);
            }
        } else if self.phase == Phase::Ended {
            self.reset_stream();
        }

        let mut finish = flush == Flush::Finish;
        if self.finishing {
            // the trailer is still owed; new input belongs to the next stream
            finish = true;
        } else {
            if !finish && io.input.is_empty() && !self.input.is_empty() {
                log::debug!(
                    "empty input with {} bytes staged, finishing stream",
                    self.input.staged()
                );
                finish = true;
            }

            self.ingest(io)?;
            if finish && !io.unread().is_empty() {
                // the stage is full; finish once the rest of the input is in
                finish = false;
            }
        }

        if self.phase == Phase::Trailer {
            return self.finish_trailer(io);
        }

        if !self.input.is_full() && !finish && !self.hw_pending {
            return Ok(StepStatus::NeedMoreInput);
        }
        let stage_free = self.output.is_empty();
        if finish && (!self.input.is_empty() || self.phase == Phase::Continuing) && stage_free {
            return self.offload(io, HwFlush::Finish);
        }
        if (self.input.is_full() || self.hw_pending) && stage_free {
            return self.offload(io, HwFlush::Sync);
        }
        if finish && self.input.is_empty() && stage_free {
            self.checksum.reset();
            self.isize = 0;
            return Ok(StepStatus::FinishDone);
        }

        Err(ZipError::InconsistentState(format!(
            "phase {:?}, staged {}, pending {}, hw_pending {}, finish {}",
            self.phase,
            self.input.staged(),
            self.output.pending(),
            self.hw_pending,
            finish
        )))
    }

    fn ingest(&mut self, io: &mut CallerIo<'_>) -> ZipResult<()> {
        let res = self.res.as_mut().ok_or(ZipError::SessionEnded)?;
        let taken = self.input.fill(&mut res.region, io.unread());
        io.read += taken;
        Ok(())
    }

    fn drain(&mut self, io: &mut CallerIo<'_>) -> ZipResult<()> {
        let res = self.res.as_ref().ok_or(ZipError::SessionEnded)?;
        let copied = self.output.drain(&res.region, &mut io.output[io.written..]);
        io.written += copied;
        Ok(())
    }

    /// Issue one round-trip, apply its completion and deliver what fits.
    fn offload(&mut self, io: &mut CallerIo<'_>, flush: HwFlush) -> ZipResult<StepStatus> {
        let fresh = self.phase == Phase::Fresh;
        if fresh {
            self.checksum.reset();
            self.isize = 0;
            self.ctx_words = [0; 3];
            if let Some(status) = self.begin_stream(flush)? {
                return Ok(status);
            }
        }
        if flush == HwFlush::Finish && self.direction == Direction::Compress {
            self.finishing = true;
        }

        let res = self.res.as_mut().ok_or(ZipError::SessionEnded)?;
        let staged = self.input.staged();
        let room = self.output.room();
        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1);

        let mut sqe = ZipSqe::stream_request(
            self.alg,
            fresh,
            flush,
            res.region.bus_addr(self.input.slot(), self.input.start()),
            staged as u32,
            res.region.bus_addr(self.output.slot(), self.output.write_offset()),
            room as u32,
            res.region.bus_addr(self.ctx_slot, 0),
        );
        sqe.tag = tag;
        sqe.set_ctx_words(self.ctx_words);
        sqe.checksum = self.checksum.value();
        sqe.isize = self.isize;

        log::debug!(
            "round-trip {}: {:?} {} bytes in, {} bytes room{}",
            tag,
            flush,
            staged,
            room,
            if fresh { ", new stream" } else { "" }
        );
        let record = submit::round_trip(&mut res.channel, &sqe, &self.policy)?;
        self.apply(&record, flush, staged, room)?;

        if self.phase == Phase::Trailer {
            return self.finish_trailer(io);
        }
        self.drain(io)?;

        if !self.output.is_empty() {
            return Ok(StepStatus::NeedMoreOutput);
        }
        if self.phase == Phase::Ended {
            self.reset_stream();
            return Ok(StepStatus::FinishDone);
        }
        if flush == HwFlush::Finish
            && self.direction == Direction::Decompress
            && !self.hw_pending
        {
            // input ran out before the compressed stream ended
            return Ok(StepStatus::NeedMoreInput);
        }
        Ok(StepStatus::BlockDone)
    }

    /// Wrapper work before the first round-trip of a stream.
    ///
    /// Returns a status if the round-trip has to wait for more input.
    fn begin_stream(&mut self, flush: HwFlush) -> ZipResult<Option<StepStatus>> {
        let header = wrapper::header(self.alg);
        if header.is_empty() {
            return Ok(None);
        }
        let res = self.res.as_mut().ok_or(ZipError::SessionEnded)?;
        match self.direction {
            Direction::Compress => {
                self.output.push(&mut res.region, header);
            }
            Direction::Decompress => {
                if self.input.staged() < header.len() {
                    if flush == HwFlush::Finish {
                        return Err(ZipError::TruncatedStream(format!(
                            "{} header needs {} bytes, have {}",
                            self.alg.name(),
                            header.len(),
                            self.input.staged()
                        )));
                    }
                    return Ok(Some(StepStatus::NeedMoreInput));
                }
                wrapper::check_header(self.alg, self.input.staged_bytes(&res.region))?;
                self.input.consume(header.len());
                log::debug!("skipped {}-byte {} header", header.len(), self.alg.name());
            }
        }
        Ok(None)
    }

    /// Fold a completion record into the stage and stream state.
    fn apply(&mut self, record: &ZipSqe, flush: HwFlush, staged: usize, room: usize) -> ZipResult<()> {
        let status = record.status();
        let consumed = record.consumed as usize;
        let produced = record.produced as usize;
        let stream_end = record.is_stream_end();

        if consumed > staged || produced > room {
            return Err(ZipError::InconsistentState(format!(
                "completion reports {consumed}/{staged} bytes consumed, {produced}/{room} produced"
            )));
        }
        if !status.is_accepted() {
            log::warn!(
                "unexpected completion status {:#04x} on {} stream (tag {})",
                status.as_u8(),
                self.alg.name(),
                record.tag
            );
            if consumed == 0 && produced == 0 && !stream_end {
                return Err(ZipError::Stalled {
                    status: status.as_u8(),
                });
            }
        } else if status == CompletionStatus::DestinationFull {
            log::debug!("destination full, accelerator holds more output");
        }

        self.phase = Phase::Continuing;
        self.hw_pending = status == CompletionStatus::DestinationFull;
        self.ctx_words = record.ctx_words();

        let res = self.res.as_mut().ok_or(ZipError::SessionEnded)?;
        match self.direction {
            Direction::Compress => {
                let trailer = wrapper::trailer_len(self.alg);
                let payload = produced
                    .checked_sub(trailer)
                    .ok_or(ZipError::ShortCompletion {
                        produced: record.produced,
                        required: trailer as u32,
                    })?;
                self.checksum
                    .update(&self.input.staged_bytes(&res.region)[..consumed]);
                self.isize = self.isize.wrapping_add(consumed as u32);
                self.input.consume(consumed);
                self.output.commit(payload);

                if flush == HwFlush::Finish && !self.hw_pending && self.input.is_empty() {
                    let mut buf = [0u8; MAX_TRAILER_LEN];
                    let len = wrapper::encode_trailer(
                        self.alg,
                        self.checksum.value(),
                        self.isize,
                        &mut buf,
                    );
                    self.output.push(&mut res.region, &buf[..len]);
                    self.phase = Phase::Ended;
                }
            }
            Direction::Decompress => {
                let from = self.output.write_offset();
                self.output.commit(produced);
                self.checksum
                    .update(self.output.written_since(&res.region, from));
                self.isize = self.isize.wrapping_add(produced as u32);
                self.input.consume(consumed);

                if stream_end {
                    self.hw_pending = false;
                    self.phase = if self.alg == AlgType::Raw {
                        self.discard_leftover();
                        Phase::Ended
                    } else {
                        Phase::Trailer
                    };
                }
            }
        }

        if self.alg != AlgType::Raw && record.checksum != self.checksum.value() {
            log::warn!(
                "accelerator checksum {:#010x} differs from computed {:#010x}",
                record.checksum,
                self.checksum.value()
            );
        }
        log::debug!(
            "round-trip {} done: status {:#04x}, consumed {}, produced {}, phase {:?}",
            record.tag,
            status.as_u8(),
            consumed,
            produced,
            self.phase
        );
        Ok(())
    }

    /// Validate the decompression trailer once it is fully staged.
    fn finish_trailer(&mut self, io: &mut CallerIo<'_>) -> ZipResult<StepStatus> {
        let len = wrapper::trailer_len(self.alg);
        if self.input.staged() >= len {
            let res = self.res.as_ref().ok_or(ZipError::SessionEnded)?;
            wrapper::check_trailer(
                self.alg,
                &self.input.staged_bytes(&res.region)[..len],
                self.checksum.value(),
                self.isize,
            )?;
            self.input.consume(len);
            self.discard_leftover();
            self.phase = Phase::Ended;
            log::debug!("{} trailer verified", self.alg.name());
        }

        self.drain(io)?;
        if !self.output.is_empty() {
            return Ok(StepStatus::NeedMoreOutput);
        }
        if self.phase == Phase::Ended {
            self.reset_stream();
            return Ok(StepStatus::FinishDone);
        }
        Ok(StepStatus::NeedMoreInput)
    }

    fn discard_leftover(&mut self) {
        if !self.input.is_empty() {
            log::warn!(
                "discarding {} bytes after end of {} stream",
                self.input.staged(),
                self.alg.name()
            );
            self.input.reset();
        }
    }

    /// Back to a fresh stream. The checksum of the finished stream stays
    /// readable until the next stream starts.
    fn reset_stream(&mut self) {
        self.phase = Phase::Fresh;
        self.hw_pending = false;
        self.finishing = false;
        self.ctx_words = [0; 3];
        self.input.reset();
        self.output.reset();
    }
}

impl<C: Channel> Drop for Session<C> {
    fn drop(&mut self) {
        self.end();
    }
}

impl<C: Channel> std::fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("alg", &self.alg)
            .field("direction", &self.direction)
            .field("phase", &self.phase)
            .field("finishing", &self.finishing)
            .field("staged", &self.input.staged())
            .field("pending", &self.output.pending())
            .field("total_in", &self.total_in)
            .field("total_out", &self.total_out)
            .finish()
    }
}

/// Check the reserved region and give it a bus address.
fn prepare_region<C: Channel + ?Sized>(
    channel: &C,
    region: &mut DmaRegion,
    layout: &DmaLayout,
) -> ZipResult<()> {
    if region.len() < layout.region_size {
        return Err(ZipError::DmaReservation {
            size: layout.region_size,
        });
    }
    if !channel.unified_addressing() {
        let bus = channel
            .translate(region.virt_base())
            .map_err(|_| ZipError::Translation {
                addr: region.virt_base(),
            })?;
        region.set_bus_base(bus);
    }
    for slot in [layout.input, layout.output, layout.ctx] {
        region.slot(slot.offset, slot.capacity)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SqeFlags;
    use crate::queue::{PollStatus, SubmitStatus};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Responder = Box<dyn FnMut(&ZipSqe) -> ZipSqe>;

    #[derive(Default)]
    struct Journal {
        submitted: Vec<ZipSqe>,
        released: u32,
        closed: u32,
    }

    struct Mock {
        journal: Rc<RefCell<Journal>>,
        respond: Responder,
        pending: Option<ZipSqe>,
        bus_offset: Option<u64>,
    }

    impl Channel for Mock {
        fn submit(&mut self, sqe: &ZipSqe) -> ZipResult<SubmitStatus> {
            self.journal.borrow_mut().submitted.push(*sqe);
            self.pending = Some((self.respond)(sqe));
            Ok(SubmitStatus::Accepted)
        }

        fn poll(&mut self) -> ZipResult<PollStatus> {
            Ok(match self.pending.take() {
                Some(record) => PollStatus::Ready(record),
                None => PollStatus::NotReady,
            })
        }

        fn reserve_dma_region(&mut self, size: usize) -> ZipResult<DmaRegion> {
            DmaRegion::heap(size)
        }

        fn release_dma_region(&mut self, _region: DmaRegion) {
            self.journal.borrow_mut().released += 1;
        }

        fn unified_addressing(&self) -> bool {
            self.bus_offset.is_none()
        }

        fn translate(&self, virt: u64) -> ZipResult<u64> {
            Ok(virt + self.bus_offset.unwrap_or(0))
        }

        fn close(&mut self) {
            self.journal.borrow_mut().closed += 1;
        }
    }

    struct MockProvider {
        journal: Rc<RefCell<Journal>>,
        respond: RefCell<Option<Responder>>,
        bus_offset: Option<u64>,
    }

    impl MockProvider {
        fn new(respond: impl FnMut(&ZipSqe) -> ZipSqe + 'static) -> Self {
            Self {
                journal: Rc::default(),
                respond: RefCell::new(Some(Box::new(respond))),
                bus_offset: None,
            }
        }
    }

    impl QueueProvider for MockProvider {
        type Channel = Mock;

        fn open_channel(&self, _alg: AlgType, _dir: Direction, _size: u16) -> ZipResult<Mock> {
            let respond = self
                .respond
                .borrow_mut()
                .take()
                .ok_or_else(|| ZipError::ChannelOpen("responder already taken".into()))?;
            Ok(Mock {
                journal: Rc::clone(&self.journal),
                respond,
                pending: None,
                bus_offset: self.bus_offset,
            })
        }
    }

    /// Consumes everything, produces `out` bytes plus the segment trailer.
    fn consume_all(alg: AlgType, out: u32) -> impl FnMut(&ZipSqe) -> ZipSqe {
        move |sqe: &ZipSqe| {
            let mut record = *sqe;
            record.consumed = sqe.input_data_length;
            record.produced = out + wrapper::trailer_len(alg) as u32;
            record.set_status(CompletionStatus::Success, false);
            record.set_ctx_words([sqe.ctx_dw0 + 1, 0xaa, 0xbb]);
            record
        }
    }

    fn small_config() -> SessionConfig {
        SessionConfig::default()
            .with_in_capacity(64)
            .with_out_capacity(256)
            .with_ctx_size(64)
            .with_min_chunk(16)
    }

    #[test]
    fn test_descriptor_flags_and_context() {
        let provider = MockProvider::new(consume_all(AlgType::Raw, 3));
        let journal = Rc::clone(&provider.journal);
        let mut session =
            Session::init(&provider, Direction::Compress, AlgType::Raw, small_config()).unwrap();
        let mut out = [0u8; 64];

        let step = session.step(&[1; 20], &mut out, Flush::None).unwrap();
        assert_eq!(step.status, StepStatus::BlockDone);
        assert_eq!(step.bytes_read, 20);
        assert_eq!(step.bytes_written, 3);

        let step = session.step(&[2; 4], &mut out, Flush::Finish).unwrap();
        assert_eq!(step.status, StepStatus::FinishDone);

        let journal = journal.borrow();
        let (first, second) = (&journal.submitted[0], &journal.submitted[1]);
        assert_eq!(
            first.flags(),
            SqeFlags::STATEFUL | SqeFlags::STREAM_NEW
        );
        assert_eq!(second.flags(), SqeFlags::STATEFUL | SqeFlags::FINISH);
        assert_eq!(first.input_data_length, 20);
        assert_eq!(second.input_data_length, 4);
        assert_eq!(second.ctx_words(), [1, 0xaa, 0xbb]);
        assert_eq!(second.tag, first.tag + 1);
        assert_eq!(first.stream_ctx_addr(), second.stream_ctx_addr());
    }

    #[test]
    fn test_below_threshold_waits() {
        let provider = MockProvider::new(consume_all(AlgType::Raw, 1));
        let journal = Rc::clone(&provider.journal);
        let mut session =
            Session::init(&provider, Direction::Compress, AlgType::Raw, small_config()).unwrap();
        let mut out = [0u8; 8];
        let step = session.step(&[0; 15], &mut out, Flush::None).unwrap();
        assert_eq!(step.status, StepStatus::NeedMoreInput);
        assert_eq!(step.bytes_read, 15);
        assert!(journal.borrow().submitted.is_empty());
    }

    #[test]
    fn test_translated_addresses() {
        let mut provider = MockProvider::new(consume_all(AlgType::Raw, 0));
        provider.bus_offset = Some(0x4000_0000);
        let journal = Rc::clone(&provider.journal);
        let mut session =
            Session::init(&provider, Direction::Compress, AlgType::Raw, small_config()).unwrap();
        let mut out = [0u8; 8];
        session.step(&[9; 16], &mut out, Flush::Finish).unwrap();

        let sqe = journal.borrow().submitted[0];
        let virt = session
            .res
            .as_ref()
            .map(|r| r.region.virt_base())
            .unwrap();
        assert_eq!(sqe.source_addr(), virt + 0x4000_0000);
        assert!(sqe.dest_addr() > sqe.source_addr());
    }

    #[test]
    fn test_zlib_wrapper_around_payload() {
        let provider = MockProvider::new(consume_all(AlgType::Zlib, 5));
        let mut session =
            Session::init(&provider, Direction::Compress, AlgType::Zlib, small_config()).unwrap();
        let mut out = [0u8; 64];
        let step = session.step(b"Wikipedia", &mut out, Flush::Finish).unwrap();
        assert_eq!(step.status, StepStatus::FinishDone);
        // header + 5 payload bytes + trailer; hardware trailer stripped
        assert_eq!(step.bytes_written, 2 + 5 + 4);
        assert_eq!(&out[..2], &[0x78, 0x9c]);
        assert_eq!(&out[7..11], &0x11e6_0398u32.to_be_bytes());
        assert_eq!(session.checksum(), 0x11e6_0398);
        assert!(session.is_finished());
    }

    #[test]
    fn test_destination_full_finish_keeps_finishing() {
        let mut calls = 0;
        let provider = MockProvider::new(move |sqe: &ZipSqe| {
            calls += 1;
            let mut record = *sqe;
            record.consumed = if calls == 1 { sqe.input_data_length } else { 0 };
            record.produced = 3 + wrapper::trailer_len(AlgType::Zlib) as u32;
            let status = if calls == 1 {
                CompletionStatus::DestinationFull
            } else {
                CompletionStatus::Success
            };
            record.set_status(status, false);
            record.set_ctx_words([sqe.ctx_dw0 + 1, 0, 0]);
            record
        });
        let journal = Rc::clone(&provider.journal);
        let mut session =
            Session::init(&provider, Direction::Compress, AlgType::Zlib, small_config()).unwrap();
        let mut out = [0u8; 64];
        let mut stream = Vec::new();

        let step = session.step(&[7; 10], &mut out, Flush::None).unwrap();
        assert_eq!(step.status, StepStatus::NeedMoreInput);

        // empty input finishes; the accelerator still holds output afterwards
        let step = session.step(&[], &mut out, Flush::None).unwrap();
        assert_eq!(step.status, StepStatus::BlockDone);
        assert_eq!(step.bytes_written, 2 + 3);
        stream.extend_from_slice(&out[..step.bytes_written]);

        // input offered mid-finish is left for the next stream
        let step = session.step(&[5; 4], &mut out, Flush::None).unwrap();
        assert_eq!(step.status, StepStatus::FinishDone);
        assert_eq!(step.bytes_read, 0);
        stream.extend_from_slice(&out[..step.bytes_written]);

        let flushes: Vec<HwFlush> = journal.borrow().submitted.iter().map(|s| s.flush()).collect();
        assert_eq!(flushes, [HwFlush::Finish, HwFlush::Finish]);
        assert_eq!(stream.len(), 2 + 3 + 3 + 4);
        let adler = crate::checksum::adler32(crate::checksum::ADLER_INIT, &[7; 10]);
        assert_eq!(&stream[8..], &adler.to_be_bytes());
        assert!(session.is_finished());

        let step = session.step(&[5; 4], &mut out, Flush::None).unwrap();
        assert_eq!(step.status, StepStatus::NeedMoreInput);
        assert_eq!(step.bytes_read, 4);
    }

    #[test]
    fn test_short_completion_poisons() {
        let provider = MockProvider::new(|sqe: &ZipSqe| {
            let mut record = *sqe;
            record.consumed = sqe.input_data_length;
            record.produced = 2;
            record
        });
        let mut session =
            Session::init(&provider, Direction::Compress, AlgType::Zlib, small_config()).unwrap();
        let mut out = [0u8; 64];
        assert!(matches!(
            session.step(&[0; 16], &mut out, Flush::None),
            Err(ZipError::ShortCompletion {
                produced: 2,
                required: 4
            })
        ));
        assert!(session.is_poisoned());
        assert!(matches!(
            session.step(&[], &mut out, Flush::Finish),
            Err(ZipError::SessionPoisoned)
        ));
    }

    #[test]
    fn test_unknown_status_without_progress_stalls() {
        let provider = MockProvider::new(|sqe: &ZipSqe| {
            let mut record = *sqe;
            record.consumed = 0;
            record.produced = 0;
            record.dw3 = 0x42;
            record
        });
        let mut session =
            Session::init(&provider, Direction::Decompress, AlgType::Raw, small_config()).unwrap();
        let mut out = [0u8; 64];
        assert!(matches!(
            session.step(&[0; 16], &mut out, Flush::None),
            Err(ZipError::Stalled { status: 0x42 })
        ));
    }

    #[test]
    fn test_unknown_status_with_progress_continues() {
        let provider = MockProvider::new(|sqe: &ZipSqe| {
            let mut record = *sqe;
            record.consumed = sqe.input_data_length;
            record.produced = 4;
            record.dw3 = 0x42;
            record
        });
        let mut session =
            Session::init(&provider, Direction::Decompress, AlgType::Raw, small_config()).unwrap();
        let mut out = [0u8; 64];
        let step = session.step(&[0; 16], &mut out, Flush::None).unwrap();
        assert_eq!(step.status, StepStatus::BlockDone);
        assert_eq!(step.bytes_written, 4);
    }

    #[test]
    fn test_overreported_completion_is_rejected() {
        let provider = MockProvider::new(|sqe: &ZipSqe| {
            let mut record = *sqe;
            record.consumed = sqe.input_data_length + 1;
            record
        });
        let mut session =
            Session::init(&provider, Direction::Compress, AlgType::Raw, small_config()).unwrap();
        let mut out = [0u8; 64];
        assert!(matches!(
            session.step(&[0; 16], &mut out, Flush::None),
            Err(ZipError::InconsistentState(_))
        ));
    }

    #[test]
    fn test_tag_mismatch_is_fatal() {
        let provider = MockProvider::new(|sqe: &ZipSqe| {
            let mut record = *sqe;
            record.tag = sqe.tag.wrapping_add(7);
            record
        });
        let mut session =
            Session::init(&provider, Direction::Compress, AlgType::Raw, small_config()).unwrap();
        let mut out = [0u8; 64];
        assert!(matches!(
            session.step(&[0; 16], &mut out, Flush::None),
            Err(ZipError::TagMismatch { .. })
        ));
        assert!(session.is_poisoned());
    }

    #[test]
    fn test_empty_stream_finishes_without_round_trip() {
        let provider = MockProvider::new(consume_all(AlgType::Gzip, 0));
        let journal = Rc::clone(&provider.journal);
        let mut session =
            Session::init(&provider, Direction::Compress, AlgType::Gzip, small_config()).unwrap();
        let mut out = [0u8; 64];
        let step = session.step(&[], &mut out, Flush::Finish).unwrap();
        assert_eq!(step.status, StepStatus::FinishDone);
        assert_eq!(step.bytes_written, 0);
        assert!(journal.borrow().submitted.is_empty());
    }

    #[test]
    fn test_decompress_rejects_bad_header() {
        let provider = MockProvider::new(consume_all(AlgType::Zlib, 0));
        let mut session =
            Session::init(&provider, Direction::Decompress, AlgType::Zlib, small_config()).unwrap();
        let mut out = [0u8; 64];
        assert!(matches!(
            session.step(&[0x78, 0x9d, 0, 0], &mut out, Flush::Finish),
            Err(ZipError::BadHeader(_))
        ));
    }

    #[test]
    fn test_end_is_idempotent() {
        let provider = MockProvider::new(consume_all(AlgType::Raw, 0));
        let journal = Rc::clone(&provider.journal);
        let mut session =
            Session::init(&provider, Direction::Compress, AlgType::Raw, small_config()).unwrap();
        session.end();
        session.end();
        drop(session);
        assert_eq!(journal.borrow().released, 1);
        assert_eq!(journal.borrow().closed, 1);
    }

    #[test]
    fn test_step_after_end() {
        let provider = MockProvider::new(consume_all(AlgType::Raw, 0));
        let mut session =
            Session::init(&provider, Direction::Compress, AlgType::Raw, small_config()).unwrap();
        session.end();
        let mut out = [0u8; 8];
        assert!(matches!(
            session.step(b"x", &mut out, Flush::None),
            Err(ZipError::SessionEnded)
        ));
    }

    #[test]
    fn test_invalid_config_opens_nothing() {
        let provider = MockProvider::new(consume_all(AlgType::Raw, 0));
        let journal = Rc::clone(&provider.journal);
        let err = Session::init(
            &provider,
            Direction::Compress,
            AlgType::Raw,
            small_config().with_out_capacity(65),
        )
        .err()
        .unwrap();
        assert!(err.is_setup_failure());
        assert_eq!(journal.borrow().closed, 0);
    }
}
