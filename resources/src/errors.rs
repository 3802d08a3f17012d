// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

/// Error type for resource control-plane operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    #[error("index {index} out of range for array of size {size}")]
    IndexOutOfRange { index: usize, size: usize },
    #[error("invalid meter rates")]
    InvalidRates,
}
