// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Byte/packet counter arrays with lock-free data-plane increment.

use crate::ResourceError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A control-plane snapshot of one counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterPair {
    pub bytes: u64,
    pub packets: u64,
}

/// One byte/packet pair.
#[derive(Debug, Default)]
pub struct Counter {
    bytes: AtomicU64,
    packets: AtomicU64,
}

impl Counter {
    pub fn add(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.packets.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn read(&self) -> CounterPair {
        CounterPair {
            bytes: self.bytes.load(Ordering::Relaxed),
            packets: self.packets.load(Ordering::Relaxed),
        }
    }

    pub fn write(&self, pair: CounterPair) {
        self.bytes.store(pair.bytes, Ordering::Relaxed);
        self.packets.store(pair.packets, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.write(CounterPair::default());
    }
}

/// A fixed-size array of counters.
#[derive(Debug)]
pub struct CounterArray {
    counters: Vec<Counter>,
}

impl CounterArray {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            counters: (0..size).map(|_| Counter::default()).collect(),
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.counters.len()
    }

    fn counter(&self, index: usize) -> Result<&Counter, ResourceError> {
        self.counters.get(index).ok_or(ResourceError::IndexOutOfRange {
            index,
            size: self.counters.len(),
        })
    }

    /// Data-plane increment: one packet, `bytes` bytes.
    pub fn add(&self, index: usize, bytes: u64) -> Result<(), ResourceError> {
        self.counter(index)?.add(bytes);
        Ok(())
    }

    pub fn read(&self, index: usize) -> Result<CounterPair, ResourceError> {
        self.counter(index).map(Counter::read)
    }

    pub fn write(&self, index: usize, pair: CounterPair) -> Result<(), ResourceError> {
        self.counter(index)?.write(pair);
        Ok(())
    }

    pub fn reset_all(&self) {
        for c in &self.counters {
            c.reset();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn increments_accumulate() {
        let counters = CounterArray::new(2);
        counters.add(0, 100).unwrap();
        counters.add(0, 50).unwrap();
        counters.add(1, 9).unwrap();
        assert_eq!(
            counters.read(0).unwrap(),
            CounterPair {
                bytes: 150,
                packets: 2
            }
        );
        assert_eq!(
            counters.read(1).unwrap(),
            CounterPair {
                bytes: 9,
                packets: 1
            }
        );
    }

    #[test]
    fn out_of_range_is_typed() {
        let counters = CounterArray::new(1);
        assert_eq!(
            counters.add(3, 1),
            Err(ResourceError::IndexOutOfRange { index: 3, size: 1 })
        );
    }

    #[test]
    fn reset_zeroes_everything() {
        let counters = CounterArray::new(2);
        counters.add(0, 10).unwrap();
        counters.reset_all();
        assert_eq!(counters.read(0).unwrap(), CounterPair::default());
    }
}
