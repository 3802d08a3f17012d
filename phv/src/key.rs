// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Match-key extraction.
//!
//! A table's key is the concatenation, in declared order, of validity bytes
//! and field byte strings pulled from the PHV. The resulting byte string is
//! canonical: two packets with equal selected state build equal keys.

use crate::phv::Phv;
use crate::HeaderId;
use serde::{Deserialize, Serialize};

/// Reference to one field: header id plus declaration offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub header: HeaderId,
    pub field: u32,
}

impl FieldRef {
    #[must_use]
    pub fn new(header: HeaderId, field: u32) -> Self {
        Self { header, field }
    }
}

/// One element of a match key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyElement {
    /// The field's width-exact byte string.
    Field(FieldRef),
    /// One byte, `0x01` when the header is valid and `0x00` otherwise.
    Validity(HeaderId),
}

/// Ordered description of a table's match key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec {
    pub elements: Vec<KeyElement>,
}

impl KeySpec {
    #[must_use]
    pub fn new(elements: Vec<KeyElement>) -> Self {
        Self { elements }
    }

    #[must_use]
    pub fn field(header: HeaderId, field: u32) -> KeyElement {
        KeyElement::Field(FieldRef::new(header, field))
    }

    /// Appends the key bytes for `phv` to `out`.
    ///
    /// Fields of invalid headers contribute their current (stale) bytes;
    /// uninitialized-read semantics rely on this.
    pub fn build(&self, phv: &Phv, out: &mut Vec<u8>) {
        for elem in &self.elements {
            match elem {
                KeyElement::Field(r) => out.extend_from_slice(phv.field(*r).bytes()),
                KeyElement::Validity(h) => out.push(u8::from(phv.is_valid(*h))),
            }
        }
    }

    /// Convenience wrapper around [`KeySpec::build`].
    #[must_use]
    pub fn key_bytes(&self, phv: &Phv) -> Vec<u8> {
        let mut out = Vec::new();
        self.build(phv, &mut out);
        out
    }

    /// Key width in bytes for PHVs built from `phv`'s configuration.
    #[must_use]
    pub fn nbytes(&self, phv: &Phv) -> usize {
        self.elements
            .iter()
            .map(|e| match e {
                KeyElement::Field(r) => phv.field(*r).nbytes(),
                KeyElement::Validity(_) => 1,
            })
            .sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::header::{FieldSpec, HeaderType};
    use crate::phv::{PhvFactory, PhvSpec, ResetPolicy};

    #[test]
    fn concatenates_in_declared_order() {
        let ty = HeaderType::new(
            "h_t",
            vec![FieldSpec::new("a", 16), FieldSpec::new("b", 8)],
        );
        let mut spec = PhvSpec::new();
        let hid = spec.add_header("h", ty, false);
        let factory = PhvFactory::new(spec, ResetPolicy::Invalidate);
        let mut phv = factory.get();
        phv.header_mut(hid).mark_valid();
        phv.header_mut(hid).field_mut(0).set_from_uint(0x0102);
        phv.header_mut(hid).field_mut(1).set_from_uint(0x33);

        let key = KeySpec::new(vec![
            KeyElement::Validity(hid),
            KeySpec::field(hid, 1),
            KeySpec::field(hid, 0),
        ]);
        assert_eq!(key.key_bytes(&phv), vec![0x01, 0x33, 0x01, 0x02]);
        assert_eq!(key.nbytes(&phv), 4);

        phv.header_mut(hid).mark_invalid();
        assert_eq!(key.key_bytes(&phv), vec![0x00, 0x33, 0x01, 0x02]);
    }
}
