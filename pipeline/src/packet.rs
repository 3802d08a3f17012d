// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The per-packet unit of work.
//!
//! A packet enters as a byte buffer plus ingress metadata and leases its PHV
//! from the configuration's pool; the lease returns on drop. Parsing and
//! deparsing the buffer against the header model are external collaborators;
//! the pipeline only reads and writes the PHV.

use phv::{Phv, PhvLease};
use serde::{Deserialize, Serialize};

/// Ingress metadata captured when the packet was received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressMeta {
    pub port: u16,
    /// Wire length in bytes.
    pub length: u64,
    /// Arrival timestamp, microseconds on the receiver's clock.
    pub arrival_us: u64,
    pub packet_id: u64,
}

/// One packet being processed, start to finish, on one thread.
#[derive(Debug)]
pub struct Packet {
    payload: Vec<u8>,
    ingress: IngressMeta,
    phv: PhvLease,
    dropped: bool,
    exited: bool,
}

impl Packet {
    #[must_use]
    pub fn new(payload: Vec<u8>, ingress: IngressMeta, phv: PhvLease) -> Self {
        Self {
            payload,
            ingress,
            phv,
            dropped: false,
            exited: false,
        }
    }

    #[must_use]
    pub fn ingress(&self) -> &IngressMeta {
        &self.ingress
    }

    #[must_use]
    pub fn phv(&self) -> &Phv {
        &self.phv
    }

    #[must_use]
    pub fn phv_mut(&mut self) -> &mut Phv {
        &mut self.phv
    }

    /// The byte buffer; after pipeline completion this is what the external
    /// deparser rewrites from the PHV.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Marks the packet to be discarded at egress. Processing continues.
    pub fn mark_dropped(&mut self) {
        self.dropped = true;
    }

    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.dropped
    }

    /// Requests pipeline termination after the current action completes.
    pub fn request_exit(&mut self) {
        self.exited = true;
    }

    #[must_use]
    pub fn exit_requested(&self) -> bool {
        self.exited
    }
}
