// Hardware Zip Accelerator Streaming Bridge
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Session tunables.

use crate::error::{ZipError, ZipResult};
use crate::submit::RetryPolicy;
use crate::wrapper::{GZIP_HEADER, MAX_TRAILER_LEN};
use std::time::Duration;

/// Default input staging capacity (one offload chunk).
pub const DEFAULT_IN_CAPACITY: usize = 512 * 1024;

/// Default output staging capacity.
pub const DEFAULT_OUT_CAPACITY: usize = 1024 * 1024;

/// Default size of the hardware stream context buffer.
pub const DEFAULT_CTX_SIZE: usize = 64 * 1024;

/// Staged bytes below which an offload is not worth issuing.
pub const DEFAULT_MIN_CHUNK: usize = 512;

/// Default pause between busy submissions.
pub const DEFAULT_SUBMIT_BACKOFF: Duration = Duration::from_micros(1);

/// Configuration for one [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Input staging capacity `C_in`.
    pub in_capacity: usize,
    /// Output staging capacity `C_out`.
    pub out_capacity: usize,
    /// Hardware context buffer size.
    pub ctx_size: usize,
    /// Fill level at which the input stage counts as full.
    pub min_chunk: usize,
    /// Busy submissions tolerated per round-trip (`None` = forever).
    pub max_submit_retries: Option<u32>,
    /// Empty polls tolerated per round-trip (`None` = forever).
    pub max_poll_spins: Option<u64>,
    /// Pause between busy submissions.
    pub submit_backoff: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            in_capacity: DEFAULT_IN_CAPACITY,
            out_capacity: DEFAULT_OUT_CAPACITY,
            ctx_size: DEFAULT_CTX_SIZE,
            min_chunk: DEFAULT_MIN_CHUNK,
            max_submit_retries: None,
            max_poll_spins: None,
            submit_backoff: DEFAULT_SUBMIT_BACKOFF,
        }
    }
}

impl SessionConfig {
    /// Set the input staging capacity.
    pub fn with_in_capacity(mut self, bytes: usize) -> Self {
        self.in_capacity = bytes;
        self
    }

    /// Set the output staging capacity.
    pub fn with_out_capacity(mut self, bytes: usize) -> Self {
        self.out_capacity = bytes;
        self
    }

    /// Set the hardware context size.
    pub fn with_ctx_size(mut self, bytes: usize) -> Self {
        self.ctx_size = bytes;
        self
    }

    /// Set the full threshold of the input stage.
    pub fn with_min_chunk(mut self, bytes: usize) -> Self {
        self.min_chunk = bytes;
        self
    }

    /// Bound busy retries per submission.
    pub fn with_max_submit_retries(mut self, retries: u32) -> Self {
        self.max_submit_retries = Some(retries);
        self
    }

    /// Bound empty polls per completion.
    pub fn with_max_poll_spins(mut self, spins: u64) -> Self {
        self.max_poll_spins = Some(spins);
        self
    }

    /// Set the pause between busy submissions.
    pub fn with_submit_backoff(mut self, backoff: Duration) -> Self {
        self.submit_backoff = backoff;
        self
    }

    /// Smallest output capacity that always fits one compressed input chunk.
    ///
    /// Covers header, stored-block expansion, sync markers and trailer.
    pub fn min_out_capacity(in_capacity: usize) -> usize {
        in_capacity + in_capacity / 8 + 64 + GZIP_HEADER.len() + MAX_TRAILER_LEN
    }

    /// Check the configuration for consistency.
    pub fn validate(&self) -> ZipResult<()> {
        if self.in_capacity == 0 || self.out_capacity == 0 || self.ctx_size == 0 {
            return Err(ZipError::InvalidConfig(
                "buffer capacities must be non-zero".into(),
            ));
        }
        if self.min_chunk == 0 || self.min_chunk > self.in_capacity {
            return Err(ZipError::InvalidConfig(format!(
                "min_chunk {} must be in 1..={}",
                self.min_chunk, self.in_capacity
            )));
        }
        let min_out = Self::min_out_capacity(self.in_capacity);
        if self.out_capacity < min_out {
            return Err(ZipError::InvalidConfig(format!(
                "out_capacity {} below {} required for in_capacity {}",
                self.out_capacity, min_out, self.in_capacity
            )));
        }
        if self.in_capacity > u32::MAX as usize || self.out_capacity > u32::MAX as usize {
            return Err(ZipError::InvalidConfig(
                "buffer capacities must fit a descriptor length field".into(),
            ));
        }
        Ok(())
    }

    /// Retry limits derived from this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_submit_retries: self.max_submit_retries,
            max_poll_spins: self.max_poll_spins,
            submit_backoff: self.submit_backoff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let cfg = SessionConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.in_capacity, 512 * 1024);
        assert_eq!(cfg.min_chunk, 512);
        assert_eq!(cfg.max_submit_retries, None);
    }

    #[test]
    fn test_setters() {
        let cfg = SessionConfig::default()
            .with_in_capacity(4096)
            .with_out_capacity(8192)
            .with_min_chunk(256)
            .with_max_submit_retries(3)
            .with_max_poll_spins(1000)
            .with_submit_backoff(Duration::ZERO);
        cfg.validate().unwrap();
        let policy = cfg.retry_policy();
        assert_eq!(policy.max_submit_retries, Some(3));
        assert_eq!(policy.max_poll_spins, Some(1000));
        assert!(policy.submit_backoff.is_zero());
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let cfg = SessionConfig::default().with_in_capacity(1024).with_min_chunk(2048);
        assert!(matches!(cfg.validate(), Err(ZipError::InvalidConfig(_))));
        let cfg = SessionConfig::default().with_min_chunk(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_small_output() {
        let cfg = SessionConfig::default()
            .with_in_capacity(4096)
            .with_out_capacity(4096);
        assert!(matches!(cfg.validate(), Err(ZipError::InvalidConfig(_))));
        let ok = SessionConfig::default()
            .with_in_capacity(4096)
            .with_out_capacity(SessionConfig::min_out_capacity(4096));
        ok.validate().unwrap();
    }
}
