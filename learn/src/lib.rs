// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Learning / digest engine.
//!
//! Digest lists accumulate fixed-layout samples of packet state, deduplicated
//! against everything still in flight. A buffer flushes when it reaches its
//! maximum sample count or when its timeout elapses, whichever happens first;
//! delivery happens on a dedicated worker thread and is at-least-once: the
//! buffer is retained until the control plane acknowledges it.

#![deny(unsafe_code, clippy::all)]
#![allow(clippy::missing_errors_doc)]

mod list;
pub mod transport;

pub use list::{DigestListSpec, SampleElement};
pub use transport::{CollectTransport, DigestHeader, DigestTransport};

use crate::list::{AddOutcome, DigestList};
use ahash::RandomState;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use phv::Phv;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::debug;

/// Error type for learn-engine control-plane operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LearnError {
    #[error("unknown digest list {0}")]
    UnknownList(u32),
    #[error("unknown or already acknowledged buffer {0}")]
    UnknownBuffer(u64),
}

enum WorkerMsg {
    /// A buffer filled up or a fresh buffer opened: re-evaluate deadlines.
    Kick,
    Shutdown,
}

#[derive(Default)]
struct Lists {
    by_id: HashMap<u32, Arc<DigestList>, RandomState>,
}

/// The digest engine: owns every list and the single flush worker.
pub struct LearnEngine {
    switch_id: u64,
    lists: Arc<RwLock<Lists>>,
    tx: Sender<WorkerMsg>,
    worker: Option<JoinHandle<()>>,
}

impl LearnEngine {
    #[must_use]
    pub fn new(switch_id: u64) -> Self {
        let lists: Arc<RwLock<Lists>> = Arc::new(RwLock::new(Lists::default()));
        let (tx, rx) = bounded(64);
        let worker_lists = lists.clone();
        let worker = std::thread::Builder::new()
            .name("digest-flush".to_string())
            .spawn(move || flush_worker(&worker_lists, &rx))
            .ok();
        Self {
            switch_id,
            lists,
            tx,
            worker,
        }
    }

    /// Registers a digest list. Replaces any previous list with the same id.
    pub fn add_list(&self, spec: DigestListSpec, transport: Arc<dyn DigestTransport>) {
        let list_id = spec.list_id;
        let list = Arc::new(DigestList::new(spec, self.switch_id, transport));
        self.lists.write().by_id.insert(list_id, list);
        debug!(list = list_id, "digest list registered");
    }

    /// Builds a sample of `phv` for the list, deduplicating in-flight ones.
    ///
    /// Runs on the packet thread; the worker is only signaled, delivery never
    /// happens here.
    pub fn learn(&self, list_id: u32, phv: &Phv) -> Result<(), LearnError> {
        let list = self
            .lists
            .read()
            .by_id
            .get(&list_id)
            .cloned()
            .ok_or(LearnError::UnknownList(list_id))?;
        match list.add_sample(phv) {
            AddOutcome::Full | AddOutcome::Opened => {
                // a full buffer wants an immediate flush; a newly opened one
                // moves the worker's earliest deadline
                let _ = self.tx.try_send(WorkerMsg::Kick);
            }
            AddOutcome::Buffered | AddOutcome::Duplicate => {}
        }
        Ok(())
    }

    /// Acknowledges individual samples of a flushed buffer.
    pub fn ack(&self, list_id: u32, buffer_id: u64, sample_ids: &[usize]) -> Result<(), LearnError> {
        self.list(list_id)?.ack(buffer_id, sample_ids)
    }

    /// Acknowledges a whole flushed buffer.
    pub fn ack_buffer(&self, list_id: u32, buffer_id: u64) -> Result<(), LearnError> {
        self.list(list_id)?.ack_buffer(buffer_id)
    }

    /// Number of flushed-but-unacknowledged buffers for a list.
    pub fn unacked(&self, list_id: u32) -> Result<usize, LearnError> {
        Ok(self.list(list_id)?.unacked())
    }

    fn list(&self, list_id: u32) -> Result<Arc<DigestList>, LearnError> {
        self.lists
            .read()
            .by_id
            .get(&list_id)
            .cloned()
            .ok_or(LearnError::UnknownList(list_id))
    }
}

impl Drop for LearnEngine {
    fn drop(&mut self) {
        let _ = self.tx.send(WorkerMsg::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Idle wait when no buffer is open; kicks cut it short.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

fn flush_worker(lists: &RwLock<Lists>, rx: &Receiver<WorkerMsg>) {
    loop {
        let now = Instant::now();
        let next_deadline = lists
            .read()
            .by_id
            .values()
            .filter_map(|l| l.deadline())
            .min();
        let wait = next_deadline.map_or(IDLE_WAIT, |d| d.saturating_duration_since(now));
        match rx.recv_timeout(wait) {
            Ok(WorkerMsg::Shutdown) | Err(RecvTimeoutError::Disconnected) => return,
            Ok(WorkerMsg::Kick) | Err(RecvTimeoutError::Timeout) => {}
        }
        let snapshot: Vec<Arc<DigestList>> = lists.read().by_id.values().cloned().collect();
        let now = Instant::now();
        for list in snapshot {
            list.flush_if_due(now);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use phv::{FieldSpec, HeaderType, KeySpec, PhvFactory, PhvSpec, ResetPolicy};

    fn engine_with_list(
        max_samples: u32,
        timeout: Duration,
    ) -> (LearnEngine, Arc<CollectTransport>, PhvFactory, phv::HeaderId) {
        let ty = HeaderType::new("sample_t", vec![FieldSpec::new("addr", 16)]);
        let mut spec = PhvSpec::new();
        let hid = spec.add_header("sample", ty, true);
        let factory = PhvFactory::new(spec, ResetPolicy::Invalidate);

        let engine = LearnEngine::new(7);
        let transport = Arc::new(CollectTransport::new());
        engine.add_list(
            DigestListSpec {
                list_id: 1,
                max_samples,
                timeout,
                layout: vec![
                    SampleElement::Const(vec![0xaa]),
                    SampleElement::Field(phv::FieldRef::new(hid, 0)),
                ],
            },
            transport.clone(),
        );
        (engine, transport, factory, hid)
    }

    fn learn_value(engine: &LearnEngine, factory: &PhvFactory, hid: phv::HeaderId, v: u64) {
        let mut phv = factory.get();
        phv.header_mut(hid).field_mut(0).set_from_uint(v);
        engine.learn(1, &phv).unwrap();
    }

    #[test]
    fn full_buffer_flushes_immediately() {
        let (engine, transport, factory, hid) =
            engine_with_list(2, Duration::from_secs(60));
        learn_value(&engine, &factory, hid, 0x0101);
        learn_value(&engine, &factory, hid, 0x0202);
        assert!(transport.wait_for(1, Duration::from_secs(2)));
        let messages = transport.messages();
        assert_eq!(messages.len(), 1);
        let (hdr, payload) = &messages[0];
        assert_eq!(hdr.switch_id, 7);
        assert_eq!(hdr.list_id, 1);
        assert_eq!(hdr.buffer_id, 0);
        assert_eq!(hdr.num_samples, 2);
        assert_eq!(payload, &vec![0xaa, 0x01, 0x01, 0xaa, 0x02, 0x02]);
    }

    #[test]
    fn lone_sample_flushes_on_timeout() {
        let (engine, transport, factory, hid) =
            engine_with_list(16, Duration::from_millis(100));
        learn_value(&engine, &factory, hid, 0x0303);
        // nothing yet: the buffer is below max_samples
        assert!(!transport.wait_for(1, Duration::from_millis(30)));
        assert!(transport.wait_for(1, Duration::from_secs(2)));
        let messages = transport.messages();
        assert_eq!(messages[0].0.num_samples, 1);
    }

    #[test]
    fn duplicates_collapse_inside_a_buffer() {
        let (engine, transport, factory, hid) =
            engine_with_list(2, Duration::from_millis(80));
        learn_value(&engine, &factory, hid, 0x0404);
        learn_value(&engine, &factory, hid, 0x0404);
        assert!(transport.wait_for(1, Duration::from_secs(2)));
        assert_eq!(transport.messages()[0].0.num_samples, 1);
    }

    #[test]
    fn dedup_holds_until_ack_releases_the_sample() {
        let (engine, transport, factory, hid) =
            engine_with_list(1, Duration::from_secs(60));
        learn_value(&engine, &factory, hid, 0x0505);
        assert!(transport.wait_for(1, Duration::from_secs(2)));
        assert_eq!(engine.unacked(1).unwrap(), 1);

        // still in flight: the same sample is dropped
        learn_value(&engine, &factory, hid, 0x0505);
        assert!(!transport.wait_for(2, Duration::from_millis(50)));

        engine.ack_buffer(1, 0).unwrap();
        assert_eq!(engine.unacked(1).unwrap(), 0);
        learn_value(&engine, &factory, hid, 0x0505);
        assert!(transport.wait_for(2, Duration::from_secs(2)));
        assert_eq!(transport.messages()[1].0.buffer_id, 1);
    }

    #[test]
    fn per_sample_ack_releases_incrementally() {
        let (engine, transport, factory, hid) =
            engine_with_list(2, Duration::from_secs(60));
        learn_value(&engine, &factory, hid, 0x0606);
        learn_value(&engine, &factory, hid, 0x0707);
        assert!(transport.wait_for(1, Duration::from_secs(2)));

        engine.ack(1, 0, &[0]).unwrap();
        assert_eq!(engine.unacked(1).unwrap(), 1);
        engine.ack(1, 0, &[1]).unwrap();
        assert_eq!(engine.unacked(1).unwrap(), 0);
        assert_eq!(
            engine.ack(1, 0, &[0]),
            Err(LearnError::UnknownBuffer(0))
        );
    }

    #[test]
    fn unknown_list_is_typed() {
        let (engine, _transport, factory, _hid) =
            engine_with_list(2, Duration::from_secs(60));
        let phv = factory.get();
        assert_eq!(engine.learn(9, &phv), Err(LearnError::UnknownList(9)));
    }

    #[test]
    fn sample_layout_matches_key_extraction() {
        // the digest layout and the key builder read the same field bytes
        let ty = HeaderType::new("h_t", vec![FieldSpec::new("f", 16)]);
        let mut spec = PhvSpec::new();
        let hid = spec.add_header("h", ty, true);
        let factory = PhvFactory::new(spec, ResetPolicy::Invalidate);
        let mut phv = factory.get();
        phv.header_mut(hid).field_mut(0).set_from_uint(0xbeef);
        let key = KeySpec::new(vec![KeySpec::field(hid, 0)]).key_bytes(&phv);
        assert_eq!(key, vec![0xbe, 0xef]);
    }
}
