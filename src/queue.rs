// Hardware Zip Accelerator Streaming Bridge
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Accelerator queue service interface.
//!
//! A channel is the interface through which a session submits descriptors to
//! the accelerator and receives completions. Channels are opened by a
//! [`QueueProvider`] and owned by exactly one session for its whole lifetime.
//!
//! The bridge never talks to a device directly; platform transports implement
//! these traits. [`SoftAccelerator`](crate::SoftAccelerator) is the
//! software-emulated implementation.

use crate::alg::{AlgType, Direction};
use crate::descriptor::ZipSqe;
use crate::dma::DmaRegion;
use crate::error::ZipResult;

/// Result of a submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    /// Descriptor was accepted by the queue.
    Accepted,
    /// Queue is full, try again later.
    Busy,
}

/// Result of a completion poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// A completion record is available.
    Ready(ZipSqe),
    /// Nothing completed yet.
    NotReady,
}

/// One open hardware channel.
///
/// Hard failures are reported as `Err`; transient conditions as
/// [`SubmitStatus::Busy`] / [`PollStatus::NotReady`].
pub trait Channel {
    /// Submit one descriptor.
    fn submit(&mut self, sqe: &ZipSqe) -> ZipResult<SubmitStatus>;

    /// Poll for one completion.
    fn poll(&mut self) -> ZipResult<PollStatus>;

    /// Reserve a DMA-visible region of at least `size` bytes.
    fn reserve_dma_region(&mut self, size: usize) -> ZipResult<DmaRegion>;

    /// Return a region obtained from [`reserve_dma_region`](Self::reserve_dma_region).
    fn release_dma_region(&mut self, region: DmaRegion);

    /// Whether the device uses CPU virtual addresses (SVA).
    fn unified_addressing(&self) -> bool {
        true
    }

    /// Translate a virtual address to a device-visible physical address.
    ///
    /// Only called when [`unified_addressing`](Self::unified_addressing) is false.
    fn translate(&self, virt: u64) -> ZipResult<u64> {
        Ok(virt)
    }

    /// Release the channel. Called at most once per channel.
    fn close(&mut self);
}

/// Opens channels on an accelerator.
pub trait QueueProvider {
    type Channel: Channel;

    /// Open a channel for `alg` in `direction`, with descriptors of `sqe_size` bytes.
    fn open_channel(
        &self,
        alg: AlgType,
        direction: Direction,
        sqe_size: u16,
    ) -> ZipResult<Self::Channel>;
}

impl<P: QueueProvider + ?Sized> QueueProvider for &P {
    type Channel = P::Channel;

    fn open_channel(
        &self,
        alg: AlgType,
        direction: Direction,
        sqe_size: u16,
    ) -> ZipResult<Self::Channel> {
        (**self).open_channel(alg, direction, sqe_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_status() {
        assert_eq!(SubmitStatus::Accepted, SubmitStatus::Accepted);
        assert_ne!(SubmitStatus::Accepted, SubmitStatus::Busy);
    }

    #[test]
    fn test_poll_status_carries_record() {
        let mut sqe = ZipSqe::new();
        sqe.produced = 17;
        match PollStatus::Ready(sqe) {
            PollStatus::Ready(record) => assert_eq!(record.produced, 17),
            PollStatus::NotReady => panic!("expected a record"),
        }
    }
}
