// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Multi-rate token-bucket meters.
//!
//! The algorithm is a color-blind trTCM (RFC 2698) generalized to N rates.
//! Bucket `i` guards color `i + 1`; a packet's color is the highest color
//! whose bucket cannot cover it, green when all can. Buckets of colors above
//! the assigned one are drained; lower buckets are left alone.
//!
//! All arithmetic is integer-exact: tokens are tracked in millionths of a
//! unit, replenished as `elapsed_micros * units_per_second` and capped at
//! `burst * 1_000_000`, so a scripted (timestamp, size) sequence always
//! produces the same color sequence.

use crate::ResourceError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Meter colors. N-rate meters may produce values past `RED`.
pub mod color {
    pub const GREEN: u32 = 0;
    pub const YELLOW: u32 = 1;
    pub const RED: u32 = 2;
}

/// Whether a meter consumes per packet or per byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeterKind {
    Packets,
    Bytes,
}

/// One rate: sustained units per second plus a burst cap in units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterRate {
    pub units_per_sec: u64,
    pub burst: u64,
}

const SCALE: u128 = 1_000_000;

#[derive(Debug, Clone)]
struct Bucket {
    rate: MeterRate,
    tokens_millionths: u128,
    last_update_us: u64,
}

impl Bucket {
    fn new(rate: MeterRate) -> Self {
        Self {
            rate,
            tokens_millionths: u128::from(rate.burst) * SCALE,
            last_update_us: 0,
        }
    }

    fn replenish(&mut self, now_us: u64) {
        let elapsed = u128::from(now_us.saturating_sub(self.last_update_us));
        let cap = u128::from(self.rate.burst) * SCALE;
        self.tokens_millionths =
            cap.min(self.tokens_millionths + elapsed * u128::from(self.rate.units_per_sec));
        self.last_update_us = now_us;
    }
}

/// One meter: a stack of token buckets behind a per-meter lock.
#[derive(Debug, Default)]
pub struct Meter {
    buckets: Mutex<Vec<Bucket>>,
}

impl Meter {
    /// Installs the rates, lowest color first, and refills every bucket.
    ///
    /// Rates must be non-decreasing in `units_per_sec` (a committed rate may
    /// not exceed a peak rate) and every burst must be non-zero.
    pub fn set_rates(&self, rates: &[MeterRate], now_us: u64) -> Result<(), ResourceError> {
        for pair in rates.windows(2) {
            if pair[0].units_per_sec > pair[1].units_per_sec {
                return Err(ResourceError::InvalidRates);
            }
        }
        if rates.iter().any(|r| r.burst == 0 || r.units_per_sec == 0) {
            return Err(ResourceError::InvalidRates);
        }
        let mut buckets = self.buckets.lock();
        *buckets = rates
            .iter()
            .map(|r| {
                let mut b = Bucket::new(*r);
                b.last_update_us = now_us;
                b
            })
            .collect();
        Ok(())
    }

    #[must_use]
    pub fn rates(&self) -> Vec<MeterRate> {
        self.buckets.lock().iter().map(|b| b.rate).collect()
    }

    /// Marks one packet of `amount` units at `now_us`, returning its color.
    /// An unconfigured meter marks green.
    #[must_use]
    pub fn execute(&self, now_us: u64, amount: u64) -> u32 {
        let mut buckets = self.buckets.lock();
        if buckets.is_empty() {
            return color::GREEN;
        }
        for b in buckets.iter_mut() {
            b.replenish(now_us);
        }
        let need = u128::from(amount) * SCALE;
        let mut packet_color = color::GREEN;
        for (i, b) in buckets.iter().enumerate().rev() {
            if b.tokens_millionths < need {
                packet_color = u32::try_from(i).unwrap_or(u32::MAX) + 1;
                break;
            }
        }
        for b in buckets.iter_mut().skip(packet_color as usize) {
            b.tokens_millionths -= need;
        }
        packet_color
    }
}

/// A fixed-size array of meters sharing one consumption kind.
#[derive(Debug)]
pub struct MeterArray {
    kind: MeterKind,
    meters: Vec<Meter>,
}

impl MeterArray {
    #[must_use]
    pub fn new(size: usize, kind: MeterKind) -> Self {
        Self {
            kind,
            meters: (0..size).map(|_| Meter::default()).collect(),
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.meters.len()
    }

    #[must_use]
    pub fn kind(&self) -> MeterKind {
        self.kind
    }

    fn meter(&self, index: usize) -> Result<&Meter, ResourceError> {
        self.meters.get(index).ok_or(ResourceError::IndexOutOfRange {
            index,
            size: self.meters.len(),
        })
    }

    pub fn set_rates(
        &self,
        index: usize,
        rates: &[MeterRate],
        now_us: u64,
    ) -> Result<(), ResourceError> {
        self.meter(index)?.set_rates(rates, now_us)?;
        debug!(index, nrates = rates.len(), "meter rates installed");
        Ok(())
    }

    /// Installs the same rates on every meter of the array.
    pub fn set_rates_all(&self, rates: &[MeterRate], now_us: u64) -> Result<(), ResourceError> {
        for m in &self.meters {
            m.set_rates(rates, now_us)?;
        }
        Ok(())
    }

    pub fn rates(&self, index: usize) -> Result<Vec<MeterRate>, ResourceError> {
        self.meter(index).map(Meter::rates)
    }

    /// Data-plane marking; `packet_len` is consulted only for byte meters.
    pub fn execute(
        &self,
        index: usize,
        now_us: u64,
        packet_len: u64,
    ) -> Result<u32, ResourceError> {
        let amount = match self.kind {
            MeterKind::Packets => 1,
            MeterKind::Bytes => packet_len,
        };
        Ok(self.meter(index)?.execute(now_us, amount))
    }
}
