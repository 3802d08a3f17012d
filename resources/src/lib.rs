// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Stateful data-plane resources shared with the control plane: counter
//! arrays, token-bucket meter arrays and register arrays.

#![deny(unsafe_code, clippy::all)]
#![allow(clippy::missing_errors_doc)]

mod counter;
mod errors;
mod meter;
mod register;

pub use counter::{Counter, CounterArray, CounterPair};
pub use errors::ResourceError;
pub use meter::{color, Meter, MeterArray, MeterKind, MeterRate};
pub use register::RegisterArray;
