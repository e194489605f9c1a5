// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of StrataTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter};
use crate::{PureResult, Tensor, TensorError};
use strata_config::determinism;

/// Fully-connected layer storing its weight as `(input_dim, output_dim)` so
/// batched inputs multiply from the left.
#[derive(Debug)]
pub struct Linear {
    weight: Parameter,
    bias: Parameter,
}

impl Linear {
    /// Creates a new linear layer. Weights are sampled from
    /// `N(0, 1 / sqrt(input_dim))`; the seed is derived from the layer name
    /// when deterministic mode is active and from host entropy otherwise.
    pub fn new(name: impl Into<String>, input_dim: usize, output_dim: usize) -> PureResult<Self> {
        let name = name.into();
        let cfg = determinism::config();
        let seed = if cfg.enabled {
            Some(cfg.seed_for(format!("strata-nn/linear/{name}")))
        } else {
            None
        };
        Self::with_init(name, input_dim, output_dim, seed)
    }

    /// Creates a new linear layer with an explicit RNG seed.
    pub fn with_seed(
        name: impl Into<String>,
        input_dim: usize,
        output_dim: usize,
        seed: u64,
    ) -> PureResult<Self> {
        Self::with_init(name.into(), input_dim, output_dim, Some(seed))
    }

    fn with_init(
        name: String,
        input_dim: usize,
        output_dim: usize,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        if input_dim == 0 || output_dim == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: input_dim,
                cols: output_dim,
            });
        }
        let std = 1.0 / (input_dim as f32).sqrt();
        let weights = Tensor::random_normal(input_dim, output_dim, 0.0, std, seed)?;
        let bias = Tensor::zeros(1, output_dim)?;
        Ok(Self {
            weight: Parameter::new(format!("{name}::weight"), weights),
            bias: Parameter::new(format!("{name}::bias"), bias),
        })
    }

    /// Returns a reference to the weight parameter.
    pub fn weight(&self) -> &Parameter {
        &self.weight
    }

    /// Returns a mutable reference to the weight parameter.
    pub fn weight_mut(&mut self) -> &mut Parameter {
        &mut self.weight
    }

    /// Returns a reference to the bias parameter.
    pub fn bias(&self) -> &Parameter {
        &self.bias
    }

    /// Returns a mutable reference to the bias parameter.
    pub fn bias_mut(&mut self) -> &mut Parameter {
        &mut self.bias
    }
}

impl Module for Linear {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        if input.shape().1 != self.weight.value().shape().0 {
            return Err(TensorError::ShapeMismatch {
                left: input.shape(),
                right: self.weight.value().shape(),
            });
        }
        let mut out = input.matmul(self.weight.value())?;
        out.add_row_inplace(self.bias.value().data())?;
        Ok(out)
    }

    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> PureResult<Tensor> {
        if input.shape().0 != grad_output.shape().0 {
            return Err(TensorError::ShapeMismatch {
                left: input.shape(),
                right: grad_output.shape(),
            });
        }
        let grad_w = input.transpose().matmul(grad_output)?;
        self.weight.accumulate_euclidean(&grad_w)?;

        let summed = grad_output.sum_axis0();
        let grad_b = Tensor::from_vec(1, summed.len(), summed)?;
        self.bias.accumulate_euclidean(&grad_b)?;

        let weight_t = self.weight.value().transpose();
        let grad_input = grad_output.matmul(&weight_t)?;
        Ok(grad_input)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&self.weight)?;
        visitor(&self.bias)?;
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&mut self.weight)?;
        visitor(&mut self.bias)?;
        Ok(())
    }
}
