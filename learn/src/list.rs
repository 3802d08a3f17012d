// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! One digest list: sample layout, in-flight filter, current buffer and the
//! unacknowledged-buffer bookkeeping.

use crate::transport::{DigestHeader, DigestTransport};
use crate::LearnError;
use ahash::RandomState;
use parking_lot::Mutex;
use phv::{FieldRef, Phv};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// One element of a sample's fixed layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleElement {
    Field(FieldRef),
    Const(Vec<u8>),
}

/// Loader-facing configuration of a digest list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestListSpec {
    pub list_id: u32,
    pub max_samples: u32,
    pub timeout: Duration,
    pub layout: Vec<SampleElement>,
}

#[derive(Debug, Default)]
struct RetainedBuffer {
    /// Sample bytes by rank; `None` once acknowledged.
    samples: Vec<Option<Vec<u8>>>,
}

#[derive(Debug)]
struct ListState {
    samples: Vec<Vec<u8>>,
    opened_at: Option<Instant>,
    next_buffer_id: u64,
    filter: HashSet<Vec<u8>, RandomState>,
    retained: HashMap<u64, RetainedBuffer, RandomState>,
}

/// What `add_sample` observed; tells the engine whether to wake the worker.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum AddOutcome {
    /// Sample was a duplicate of an in-flight one.
    Duplicate,
    Buffered,
    /// Sample opened a fresh buffer; the flush deadline moved.
    Opened,
    /// Buffer reached its maximum sample count.
    Full,
}

pub(crate) struct DigestList {
    spec: DigestListSpec,
    switch_id: u64,
    transport: Arc<dyn DigestTransport>,
    state: Mutex<ListState>,
}

impl DigestList {
    pub(crate) fn new(
        spec: DigestListSpec,
        switch_id: u64,
        transport: Arc<dyn DigestTransport>,
    ) -> Self {
        Self {
            spec,
            switch_id,
            transport,
            state: Mutex::new(ListState {
                samples: Vec::new(),
                opened_at: None,
                next_buffer_id: 0,
                filter: HashSet::default(),
                retained: HashMap::default(),
            }),
        }
    }

    fn build_sample(&self, phv: &Phv) -> Vec<u8> {
        let mut out = Vec::new();
        for elem in &self.spec.layout {
            match elem {
                SampleElement::Field(r) => out.extend_from_slice(phv.field(*r).bytes()),
                SampleElement::Const(bytes) => out.extend_from_slice(bytes),
            }
        }
        out
    }

    /// Builds and buffers a sample, deduplicating against every sample still
    /// in flight (buffered or flushed-but-unacknowledged).
    pub(crate) fn add_sample(&self, phv: &Phv) -> AddOutcome {
        let sample = self.build_sample(phv);
        let mut state = self.state.lock();
        if state.filter.contains(&sample) {
            trace!(list = self.spec.list_id, "duplicate sample dropped");
            return AddOutcome::Duplicate;
        }
        state.filter.insert(sample.clone());
        let opened = state.samples.is_empty();
        if opened {
            state.opened_at = Some(Instant::now());
        }
        state.samples.push(sample);
        if state.samples.len() >= self.spec.max_samples as usize {
            AddOutcome::Full
        } else if opened {
            AddOutcome::Opened
        } else {
            AddOutcome::Buffered
        }
    }

    /// Deadline of the currently open buffer, if any.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.state
            .lock()
            .opened_at
            .map(|t| t + self.spec.timeout)
    }

    fn is_due(&self, now: Instant) -> bool {
        let state = self.state.lock();
        if state.samples.is_empty() {
            return false;
        }
        state.samples.len() >= self.spec.max_samples as usize
            || state
                .opened_at
                .is_some_and(|t| t + self.spec.timeout <= now)
    }

    /// Swaps the buffer out under the lock and delivers it outside, so new
    /// samples accumulate into the fresh buffer during delivery.
    pub(crate) fn flush_if_due(&self, now: Instant) {
        if !self.is_due(now) {
            return;
        }
        let (header, payload) = {
            let mut state = self.state.lock();
            if state.samples.is_empty() {
                return;
            }
            let samples = std::mem::take(&mut state.samples);
            state.opened_at = None;
            let buffer_id = state.next_buffer_id;
            state.next_buffer_id += 1;
            let header = DigestHeader {
                switch_id: self.switch_id,
                list_id: self.spec.list_id,
                buffer_id,
                num_samples: u32::try_from(samples.len()).unwrap_or(u32::MAX),
            };
            let payload: Vec<u8> = samples.concat();
            state.retained.insert(
                buffer_id,
                RetainedBuffer {
                    samples: samples.into_iter().map(Some).collect(),
                },
            );
            (header, payload)
        };
        debug!(
            list = header.list_id,
            buffer = header.buffer_id,
            samples = header.num_samples,
            "digest buffer flushed"
        );
        self.transport.send(&header, &payload);
    }

    /// Acknowledges individual samples of a flushed buffer, releasing their
    /// filter entries.
    pub(crate) fn ack(&self, buffer_id: u64, sample_ids: &[usize]) -> Result<(), LearnError> {
        let mut state = self.state.lock();
        let retained = state
            .retained
            .get_mut(&buffer_id)
            .ok_or(LearnError::UnknownBuffer(buffer_id))?;
        let mut released = Vec::new();
        for &id in sample_ids {
            if let Some(slot) = retained.samples.get_mut(id) {
                if let Some(sample) = slot.take() {
                    released.push(sample);
                }
            }
        }
        let done = retained.samples.iter().all(Option::is_none);
        if done {
            state.retained.remove(&buffer_id);
        }
        for sample in released {
            state.filter.remove(&sample);
        }
        Ok(())
    }

    /// Acknowledges a whole buffer.
    pub(crate) fn ack_buffer(&self, buffer_id: u64) -> Result<(), LearnError> {
        let mut state = self.state.lock();
        let retained = state
            .retained
            .remove(&buffer_id)
            .ok_or(LearnError::UnknownBuffer(buffer_id))?;
        for sample in retained.samples.into_iter().flatten() {
            state.filter.remove(&sample);
        }
        Ok(())
    }

    /// Buffers flushed but not yet fully acknowledged.
    pub(crate) fn unacked(&self) -> usize {
        self.state.lock().retained.len()
    }
}
