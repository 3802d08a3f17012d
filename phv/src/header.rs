// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Header instances and their types.

use crate::field::Field;
use crate::HeaderId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One field declaration inside a [`HeaderType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub nbits: usize,
}

impl FieldSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, nbits: usize) -> Self {
        Self {
            name: name.into(),
            nbits,
        }
    }
}

/// An ordered field layout shared by every header instance of the same type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderType {
    name: String,
    fields: Vec<FieldSpec>,
}

impl HeaderType {
    #[must_use]
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Total width in bits.
    #[must_use]
    pub fn nbits(&self) -> usize {
        self.fields.iter().map(|f| f.nbits).sum()
    }

    /// Offset of the field named `name`, if declared.
    #[must_use]
    pub fn field_offset(&self, name: &str) -> Option<u32> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .map(|i| u32::try_from(i).unwrap_or(u32::MAX))
    }
}

/// A named, ordered sequence of fields plus a validity flag.
///
/// Metadata headers always report valid. Field values survive invalidation and
/// pool reuse on purpose; see [`crate::ResetPolicy`].
#[derive(Debug, Clone)]
pub struct Header {
    name: String,
    id: HeaderId,
    header_type: Arc<HeaderType>,
    pub(crate) fields: Vec<Field>,
    valid: bool,
    metadata: bool,
}

impl Header {
    pub(crate) fn new(
        name: impl Into<String>,
        id: HeaderId,
        header_type: Arc<HeaderType>,
        metadata: bool,
    ) -> Self {
        let fields = header_type.fields().iter().map(|f| Field::new(f.nbits)).collect();
        Self {
            name: name.into(),
            id,
            header_type,
            fields,
            valid: false,
            metadata,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn id(&self) -> HeaderId {
        self.id
    }

    #[must_use]
    pub fn header_type(&self) -> &HeaderType {
        &self.header_type
    }

    #[must_use]
    pub fn is_metadata(&self) -> bool {
        self.metadata
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.metadata || self.valid
    }

    pub fn mark_valid(&mut self) {
        self.valid = true;
    }

    pub fn mark_invalid(&mut self) {
        self.valid = false;
    }

    #[must_use]
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Total width in bits.
    #[must_use]
    pub fn nbits(&self) -> usize {
        self.fields.iter().map(Field::nbits).sum()
    }

    /// Field at declaration offset `idx`.
    ///
    /// # Panics
    ///
    /// Panics on an out-of-range offset; offsets come from the compiled
    /// program and referencing a missing field is a contract violation.
    #[must_use]
    pub fn field(&self, idx: u32) -> &Field {
        &self.fields[idx as usize]
    }

    /// Mutable access to the field at declaration offset `idx`.
    ///
    /// # Panics
    ///
    /// Panics on an out-of-range offset.
    #[must_use]
    pub fn field_mut(&mut self, idx: u32) -> &mut Field {
        &mut self.fields[idx as usize]
    }

    /// Invalidates the header. Field bytes are intentionally preserved.
    pub fn reset(&mut self) {
        self.valid = false;
    }

    /// Zeroes every field value.
    pub fn zero_fields(&mut self) {
        for f in &mut self.fields {
            f.zero();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ipv4_type() -> Arc<HeaderType> {
        Arc::new(HeaderType::new(
            "ipv4_t",
            vec![
                FieldSpec::new("version", 4),
                FieldSpec::new("ihl", 4),
                FieldSpec::new("ttl", 8),
                FieldSpec::new("src", 32),
                FieldSpec::new("dst", 32),
            ],
        ))
    }

    #[test]
    fn metadata_is_always_valid() {
        let h = Header::new("meta", HeaderId(0), ipv4_type(), true);
        assert!(h.is_valid());
    }

    #[test]
    fn reset_keeps_field_bytes() {
        let mut h = Header::new("ipv4", HeaderId(0), ipv4_type(), false);
        h.mark_valid();
        h.field_mut(3).set_from_uint(0x0a00_0001);
        h.reset();
        assert!(!h.is_valid());
        assert_eq!(h.field(3).to_u64(), 0x0a00_0001);
    }

    #[test]
    fn type_offsets() {
        let ty = ipv4_type();
        assert_eq!(ty.field_offset("ttl"), Some(2));
        assert_eq!(ty.field_offset("nope"), None);
        assert_eq!(ty.nbits(), 80);
    }
}
