// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bit-width-exact field storage.
//!
//! A [`Field`] keeps two synchronized representations of one value: the
//! arithmetic value as a [`BigUint`] and a width-exact big-endian byte string.
//! Every mutation re-derives the byte string from the masked value, so readers
//! may consume either representation at any time.

use num_bigint::{BigInt, BigUint};
use num_traits::{One, Zero};

/// An arbitrary-but-fixed bit-width unsigned integer.
#[derive(Debug, Clone)]
pub struct Field {
    nbits: usize,
    value: BigUint,
    bytes: Vec<u8>,
    mask: BigUint,
}

impl Field {
    /// Creates a zeroed field of `nbits` bits.
    ///
    /// # Panics
    ///
    /// Panics on a zero-width field; the compiled program never produces one.
    #[must_use]
    pub fn new(nbits: usize) -> Self {
        assert!(nbits > 0, "zero-width field");
        let nbytes = nbits.div_ceil(8);
        Self {
            nbits,
            value: BigUint::zero(),
            bytes: vec![0u8; nbytes],
            mask: (BigUint::one() << nbits) - BigUint::one(),
        }
    }

    /// Width in bits.
    #[must_use]
    pub fn nbits(&self) -> usize {
        self.nbits
    }

    /// Width of the byte representation, `ceil(nbits / 8)`.
    #[must_use]
    pub fn nbytes(&self) -> usize {
        self.bytes.len()
    }

    /// Big-endian byte representation; unused top bits are zero.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Arithmetic value, already truncated to the field width.
    #[must_use]
    pub fn uint(&self) -> &BigUint {
        &self.value
    }

    /// Low 64 bits of the value.
    #[must_use]
    pub fn to_u64(&self) -> u64 {
        self.value.iter_u64_digits().next().unwrap_or(0)
    }

    /// Two's-complement signed view of the stored bits.
    #[must_use]
    pub fn int(&self) -> BigInt {
        let top_bit = (&self.value >> (self.nbits - 1)) & BigUint::one();
        if top_bit.is_zero() {
            BigInt::from(self.value.clone())
        } else {
            BigInt::from(self.value.clone()) - (BigInt::one() << self.nbits)
        }
    }

    /// Sets the value from `v`, truncating to the field width.
    pub fn set_from_uint(&mut self, v: u64) {
        self.value = BigUint::from(v) & &self.mask;
        self.sync_bytes();
    }

    /// Sets the value from a big unsigned integer, truncating to width.
    pub fn set_from_big(&mut self, v: &BigUint) {
        self.value = v & &self.mask;
        self.sync_bytes();
    }

    /// Sets the value from a signed integer, wrapping modulo `2^nbits`.
    pub fn set_from_int(&mut self, v: &BigInt) {
        let modulus = BigInt::one() << self.nbits;
        let mut r = v % &modulus;
        if r.sign() == num_bigint::Sign::Minus {
            r += &modulus;
        }
        self.value = r.to_biguint().unwrap_or_default();
        self.sync_bytes();
    }

    /// Sets the value from big-endian bytes, truncating to width.
    pub fn set_from_bytes(&mut self, bytes: &[u8]) {
        self.value = BigUint::from_bytes_be(bytes) & &self.mask;
        self.sync_bytes();
    }

    /// Copies the value of `other`, truncating to this field's width.
    pub fn set_from_field(&mut self, other: &Field) {
        self.value = other.uint() & &self.mask;
        self.sync_bytes();
    }

    /// Resets the value to zero.
    pub fn zero(&mut self) {
        self.value = BigUint::zero();
        self.bytes.fill(0);
    }

    fn sync_bytes(&mut self) {
        let raw = self.value.to_bytes_be();
        let nbytes = self.bytes.len();
        debug_assert!(raw.len() <= nbytes);
        let pad = nbytes - raw.len();
        self.bytes[..pad].fill(0);
        self.bytes[pad..].copy_from_slice(&raw);
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.nbits == other.nbits && self.value == other.value
    }
}

impl Eq for Field {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn truncates_to_width() {
        let mut f = Field::new(12);
        f.set_from_uint(0xabcd);
        assert_eq!(f.to_u64(), 0xbcd);
        assert_eq!(f.bytes(), &[0x0b, 0xcd]);
    }

    #[test]
    fn bytes_follow_value() {
        let mut f = Field::new(32);
        f.set_from_uint(0x0a01_0203);
        assert_eq!(f.bytes(), &[0x0a, 0x01, 0x02, 0x03]);
        f.set_from_uint(1);
        assert_eq!(f.bytes(), &[0, 0, 0, 1]);
    }

    #[test]
    fn oversized_byte_input_is_masked() {
        let mut f = Field::new(9);
        f.set_from_bytes(&[0xff, 0xff, 0xff]);
        assert_eq!(f.to_u64(), 0x1ff);
        assert_eq!(f.bytes(), &[0x01, 0xff]);
    }

    #[test]
    fn signed_view_is_twos_complement() {
        let mut f = Field::new(8);
        f.set_from_uint(0xff);
        assert_eq!(f.int(), BigInt::from(-1));
        f.set_from_uint(0x7f);
        assert_eq!(f.int(), BigInt::from(127));
        let mut w = Field::new(16);
        w.set_from_int(&BigInt::from(-2));
        assert_eq!(w.to_u64(), 0xfffe);
    }

    #[test]
    fn wide_field_roundtrip() {
        let mut f = Field::new(128);
        let v = BigUint::from_bytes_be(&[0xde; 16]);
        f.set_from_big(&v);
        assert_eq!(f.uint(), &v);
        assert_eq!(f.bytes().len(), 16);
    }

    #[test]
    fn roundtrip_masking_law() {
        bolero::check!()
            .with_type()
            .cloned()
            .for_each(|(v, width): (u64, u8)| {
                let nbits = usize::from(width % 64) + 1;
                let mut f = Field::new(nbits);
                f.set_from_uint(v);
                let mut g = Field::new(nbits);
                g.set_from_bytes(f.bytes());
                let expect = if nbits == 64 { v } else { v & ((1u64 << nbits) - 1) };
                assert_eq!(g.to_u64(), expect);
                assert_eq!(f, g);
            });
    }
}
