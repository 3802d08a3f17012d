// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The runtime environment actions execute against: resource arrays and the
//! optional learn engine.

use learn::LearnEngine;
use resources::{CounterArray, MeterArray, MeterKind, RegisterArray};
use serde::{Deserialize, Serialize};

/// Id of a counter array within a [`RuntimeEnv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterId(pub u32);

/// Id of a meter array within a [`RuntimeEnv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeterId(pub u32);

/// Id of a register array within a [`RuntimeEnv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegisterId(pub u32);

/// Stateful side objects shared by actions and the control plane.
///
/// Arrays are registered at load time; action parameters address them by id,
/// so an unknown id at execution time is a corrupted compiled program.
#[derive(Default)]
pub struct RuntimeEnv {
    counters: Vec<CounterArray>,
    meters: Vec<MeterArray>,
    registers: Vec<RegisterArray>,
    learn: Option<LearnEngine>,
}

impl RuntimeEnv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_counter_array(&mut self, size: usize) -> CounterId {
        self.counters.push(CounterArray::new(size));
        CounterId(u32::try_from(self.counters.len() - 1).unwrap_or(u32::MAX))
    }

    pub fn add_meter_array(&mut self, size: usize, kind: MeterKind) -> MeterId {
        self.meters.push(MeterArray::new(size, kind));
        MeterId(u32::try_from(self.meters.len() - 1).unwrap_or(u32::MAX))
    }

    pub fn add_register_array(&mut self, size: usize, nbits: usize) -> RegisterId {
        self.registers.push(RegisterArray::new(size, nbits));
        RegisterId(u32::try_from(self.registers.len() - 1).unwrap_or(u32::MAX))
    }

    pub fn set_learn(&mut self, engine: LearnEngine) {
        self.learn = Some(engine);
    }

    /// # Panics
    ///
    /// Panics on an unknown id.
    #[must_use]
    pub fn counters(&self, id: CounterId) -> &CounterArray {
        &self.counters[id.0 as usize]
    }

    /// # Panics
    ///
    /// Panics on an unknown id.
    #[must_use]
    pub fn meters(&self, id: MeterId) -> &MeterArray {
        &self.meters[id.0 as usize]
    }

    /// # Panics
    ///
    /// Panics on an unknown id.
    #[must_use]
    pub fn registers(&self, id: RegisterId) -> &RegisterArray {
        &self.registers[id.0 as usize]
    }

    #[must_use]
    pub fn learn(&self) -> Option<&LearnEngine> {
        self.learn.as_ref()
    }
}
