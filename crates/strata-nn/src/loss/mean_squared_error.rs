// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of StrataTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use super::Loss;
use crate::{PureResult, Tensor};
use strata_tensor::TensorError;

/// Squared error averaged over every element.
///
/// The trainer applies it once per step to a `(batch, output_size)`
/// controller output and the matching target block, so the reduction
/// denominator is `batch * output_size`, not the batch alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct MeanSquaredError;

impl MeanSquaredError {
    /// Creates the loss.
    pub fn new() -> Self {
        Self
    }
}

fn guard_paired(prediction: &Tensor, target: &Tensor) -> PureResult<()> {
    if prediction.shape() != target.shape() {
        return Err(TensorError::ShapeMismatch {
            left: prediction.shape(),
            right: target.shape(),
        });
    }
    Ok(())
}

impl Loss for MeanSquaredError {
    fn forward(&mut self, prediction: &Tensor, target: &Tensor) -> PureResult<Tensor> {
        guard_paired(prediction, target)?;
        let count = prediction.data().len() as f32;
        let sum: f32 = prediction
            .data()
            .iter()
            .zip(target.data())
            .map(|(pred, tgt)| {
                let diff = pred - tgt;
                diff * diff
            })
            .sum();
        Tensor::from_vec(1, 1, vec![sum / count])
    }

    fn backward(&mut self, prediction: &Tensor, target: &Tensor) -> PureResult<Tensor> {
        guard_paired(prediction, target)?;
        let (rows, cols) = prediction.shape();
        let scale = 2.0 / (rows * cols) as f32;
        let data = prediction
            .data()
            .iter()
            .zip(target.data())
            .map(|(pred, tgt)| scale * (pred - tgt))
            .collect();
        Tensor::from_vec(rows, cols, data)
    }
}
