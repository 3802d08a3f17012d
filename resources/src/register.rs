// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Register arrays: width-masked cells the data plane and control plane both
//! read and write.
//!
//! One mutex guards the whole array; control-plane compare-and-update reads
//! and data-plane writes exclude each other through it.

use crate::ResourceError;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use parking_lot::Mutex;

/// A fixed-size array of `nbits`-wide cells.
#[derive(Debug)]
pub struct RegisterArray {
    nbits: usize,
    mask: BigUint,
    cells: Mutex<Vec<BigUint>>,
}

impl RegisterArray {
    /// # Panics
    ///
    /// Panics on a zero-width cell; the compiled program never produces one.
    #[must_use]
    pub fn new(size: usize, nbits: usize) -> Self {
        assert!(nbits > 0, "zero-width register");
        Self {
            nbits,
            mask: (BigUint::one() << nbits) - BigUint::one(),
            cells: Mutex::new(vec![BigUint::zero(); size]),
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.cells.lock().len()
    }

    #[must_use]
    pub fn nbits(&self) -> usize {
        self.nbits
    }

    fn check(&self, index: usize) -> Result<(), ResourceError> {
        let size = self.cells.lock().len();
        if index >= size {
            return Err(ResourceError::IndexOutOfRange { index, size });
        }
        Ok(())
    }

    pub fn read(&self, index: usize) -> Result<BigUint, ResourceError> {
        self.check(index)?;
        Ok(self.cells.lock()[index].clone())
    }

    /// Writes the value truncated to the cell width.
    pub fn write(&self, index: usize, value: &BigUint) -> Result<(), ResourceError> {
        self.check(index)?;
        self.cells.lock()[index] = value & &self.mask;
        Ok(())
    }

    /// Atomically replaces cell `index` with `f(current)`, truncated to the
    /// cell width. The lock is held across `f`.
    pub fn apply(
        &self,
        index: usize,
        f: impl FnOnce(&BigUint) -> BigUint,
    ) -> Result<BigUint, ResourceError> {
        self.check(index)?;
        let mut cells = self.cells.lock();
        let next = f(&cells[index]) & &self.mask;
        cells[index] = next.clone();
        Ok(next)
    }

    /// Zeroes every cell.
    pub fn reset_all(&self) {
        for cell in self.cells.lock().iter_mut() {
            *cell = BigUint::zero();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn writes_are_width_masked() {
        let regs = RegisterArray::new(4, 12);
        regs.write(1, &BigUint::from(0xabcdu32)).unwrap();
        assert_eq!(regs.read(1).unwrap(), BigUint::from(0xbcdu32));
        assert_eq!(regs.read(0).unwrap(), BigUint::zero());
    }

    #[test]
    fn apply_is_read_modify_write() {
        let regs = RegisterArray::new(2, 8);
        regs.write(0, &BigUint::from(250u32)).unwrap();
        let v = regs.apply(0, |v| v + BigUint::from(10u32)).unwrap();
        assert_eq!(v, BigUint::from(4u32)); // wraps at 8 bits
        assert_eq!(regs.read(0).unwrap(), BigUint::from(4u32));
    }

    #[test]
    fn out_of_range_is_typed() {
        let regs = RegisterArray::new(2, 8);
        assert_eq!(
            regs.read(2),
            Err(ResourceError::IndexOutOfRange { index: 2, size: 2 })
        );
    }

    #[test]
    fn reset_zeroes_cells() {
        let regs = RegisterArray::new(2, 8);
        regs.write(0, &BigUint::from(7u32)).unwrap();
        regs.reset_all();
        assert_eq!(regs.read(0).unwrap(), BigUint::zero());
    }
}
