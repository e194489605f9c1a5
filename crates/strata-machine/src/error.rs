// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of StrataTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use strata_tensor::TensorError;
use thiserror::Error;

/// Result alias used throughout the machine crate.
pub type MachineResult<T> = Result<T, MachineError>;

/// Errors raised by differentiable memories and their controllers.
#[derive(Debug, Error)]
pub enum MachineError {
    /// A step or read was requested before the session buffers were set up.
    #[error("controller session has not been initialised")]
    UninitializedSession,
    /// A strength signal arrived negative. Strengths are the output of a
    /// sigmoid in every shipped network, so a negative value indicates a
    /// broken caller rather than a numeric residue.
    #[error("{label} strength must be non-negative, got {value}")]
    NegativeStrength { label: &'static str, value: f32 },
    /// Backward was invoked without a matching recorded forward pass.
    #[error("no recorded forward pass available for {label}")]
    MissingCache { label: &'static str },
    /// The number of supplied output gradients does not match the steps taken.
    #[error("expected {expected} output gradients, got {got}")]
    GradientCount { expected: usize, got: usize },
    /// Propagated tensor-level failure.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}
