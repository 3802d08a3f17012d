// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Digest delivery transport.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The message header preceding every digest payload.
///
/// The wire layout is a byte-for-byte contract with the control plane:
/// `switch_id`, `list_id`, `buffer_id`, `num_samples`, each little-endian,
/// in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestHeader {
    pub switch_id: u64,
    pub list_id: u32,
    pub buffer_id: u64,
    pub num_samples: u32,
}

impl DigestHeader {
    pub const WIRE_SIZE: usize = 24;

    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        out[0..8].copy_from_slice(&self.switch_id.to_le_bytes());
        out[8..12].copy_from_slice(&self.list_id.to_le_bytes());
        out[12..20].copy_from_slice(&self.buffer_id.to_le_bytes());
        out[20..24].copy_from_slice(&self.num_samples.to_le_bytes());
        out
    }
}

/// Abstract sink for flushed digest buffers.
///
/// `send` runs on the flush worker, never on a packet thread, so an
/// implementation may block on I/O without stalling the data plane.
pub trait DigestTransport: Send + Sync {
    fn send(&self, header: &DigestHeader, payload: &[u8]);
}

/// An in-memory transport that records every message; meant for tests and
/// local drains.
#[derive(Debug, Default)]
pub struct CollectTransport {
    messages: Mutex<Vec<(DigestHeader, Vec<u8>)>>,
    delivered: Condvar,
}

impl CollectTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<(DigestHeader, Vec<u8>)> {
        self.messages.lock().clone()
    }

    /// Blocks until at least `n` messages arrived or `timeout` elapsed.
    #[must_use]
    pub fn wait_for(&self, n: usize, timeout: Duration) -> bool {
        let mut messages = self.messages.lock();
        if messages.len() >= n {
            return true;
        }
        let deadline = std::time::Instant::now() + timeout;
        while messages.len() < n {
            if self
                .delivered
                .wait_until(&mut messages, deadline)
                .timed_out()
            {
                return messages.len() >= n;
            }
        }
        true
    }
}

impl DigestTransport for CollectTransport {
    fn send(&self, header: &DigestHeader, payload: &[u8]) {
        self.messages.lock().push((*header, payload.to_vec()));
        self.delivered.notify_all();
    }
}
