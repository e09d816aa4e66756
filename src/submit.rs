// Hardware Zip Accelerator Streaming Bridge
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Descriptor submission and completion polling.
//!
//! Both loops block the calling thread. A busy queue is retried after a short
//! yield; a not-ready completion is busy-polled. With no limit configured both
//! loops run until the queue answers, so a caller-level timeout belongs to the
//! queue service.

use crate::descriptor::ZipSqe;
use crate::error::{ZipError, ZipResult};
use crate::queue::{Channel, PollStatus, SubmitStatus};
use std::time::Duration;

/// Retry limits for one round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Busy submissions tolerated before giving up (`None` = forever).
    pub max_submit_retries: Option<u32>,
    /// Empty polls tolerated before giving up (`None` = forever).
    pub max_poll_spins: Option<u64>,
    /// Pause between busy submissions.
    pub submit_backoff: Duration,
}

/// Submit a descriptor, retrying while the queue reports busy.
pub fn submit_retry<C: Channel + ?Sized>(
    channel: &mut C,
    sqe: &ZipSqe,
    policy: &RetryPolicy,
) -> ZipResult<()> {
    let mut retries: u32 = 0;
    loop {
        match channel.submit(sqe)? {
            SubmitStatus::Accepted => {
                if retries > 0 {
                    log::trace!("descriptor {} accepted after {} retries", sqe.tag, retries);
                }
                return Ok(());
            }
            SubmitStatus::Busy => {
                if policy.max_submit_retries.is_some_and(|max| retries >= max) {
                    return Err(ZipError::QueueFull { retries });
                }
                retries += 1;
                // Brief pause to allow queue to drain
                if policy.submit_backoff.is_zero() {
                    core::hint::spin_loop();
                } else {
                    std::thread::sleep(policy.submit_backoff);
                }
            }
        }
    }
}

/// Poll until a completion record arrives.
pub fn wait_for_completion<C: Channel + ?Sized>(
    channel: &mut C,
    policy: &RetryPolicy,
) -> ZipResult<ZipSqe> {
    let mut spins: u64 = 0;
    loop {
        match channel.poll()? {
            PollStatus::Ready(record) => return Ok(record),
            PollStatus::NotReady => {
                if policy.max_poll_spins.is_some_and(|max| spins >= max) {
                    return Err(ZipError::PollTimeout { spins });
                }
                spins += 1;
                core::hint::spin_loop();
            }
        }
    }
}

/// Submit `sqe` and block until its completion arrives.
///
/// The completion must carry the submitted tag; anything else means a second
/// descriptor is outstanding on the channel.
pub fn round_trip<C: Channel + ?Sized>(
    channel: &mut C,
    sqe: &ZipSqe,
    policy: &RetryPolicy,
) -> ZipResult<ZipSqe> {
    submit_retry(channel, sqe, policy)?;
    let record = wait_for_completion(channel, policy)?;
    if record.tag != sqe.tag {
        return Err(ZipError::TagMismatch {
            expected: sqe.tag,
            actual: record.tag,
        });
    }
    Ok(record)
}
