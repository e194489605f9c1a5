// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of StrataTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Pure Rust dense tensor primitives with only lightweight external
//! dependencies.
//!
//! The goal of this module is to offer a pragmatic substrate for
//! differentiable-memory experimentation that **does not rely on PyTorch,
//! NumPy, or any other native bindings**. Everything here is written in safe
//! Rust so it can serve as a foundation for a fully independent learning
//! stack that stays responsive even when the surrounding platform is
//! sandboxed.

use core::fmt;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use std::error::Error;
use strata_config::determinism;

/// Result alias used throughout the pure module.
pub type PureResult<T> = Result<T, TensorError>;

/// Element volume above which matrix products fan out across Rayon workers.
const PARALLEL_MATMUL_VOLUME: usize = 32_768;

/// Errors emitted by tensor utilities.
#[derive(Clone, Debug, PartialEq)]
pub enum TensorError {
    /// A tensor constructor received an invalid shape.
    InvalidDimensions { rows: usize, cols: usize },
    /// Data provided to a constructor or operator does not match the tensor shape.
    DataLength { expected: usize, got: usize },
    /// An operator was asked to combine tensors of incompatible shapes.
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
    /// Learning rate must be positive for gradient descent steps.
    NonPositiveLearningRate { rate: f32 },
    /// Computation received an empty input which would otherwise trigger a panic.
    EmptyInput(&'static str),
    /// Attempted to load or update a parameter that was missing from the state dict.
    MissingParameter { name: String },
    /// Wrapper around I/O failures when persisting or restoring tensors.
    IoError { message: String },
    /// Wrapper around serde failures when deserialising tensors.
    SerializationError { message: String },
    /// Generic configuration violation for pure-language helpers.
    InvalidValue { label: &'static str },
}

impl fmt::Display for TensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorError::InvalidDimensions { rows, cols } => {
                write!(
                    f,
                    "invalid tensor dimensions ({rows} x {cols}); both axes must be non-zero"
                )
            }
            TensorError::DataLength { expected, got } => {
                write!(f, "data length mismatch: expected {expected}, got {got}")
            }
            TensorError::ShapeMismatch { left, right } => {
                write!(
                    f,
                    "shape mismatch: left={:?}, right={:?} cannot be combined",
                    left, right
                )
            }
            TensorError::NonPositiveLearningRate { rate } => {
                write!(f, "learning rate must be positive, got {rate}")
            }
            TensorError::EmptyInput(label) => {
                write!(f, "{label} must not be empty for this computation")
            }
            TensorError::MissingParameter { name } => {
                write!(f, "missing parameter '{name}' while loading module state")
            }
            TensorError::IoError { message } => {
                write!(f, "i/o error while handling tensor data: {message}")
            }
            TensorError::SerializationError { message } => {
                write!(
                    f,
                    "serialization error while handling tensor data: {message}"
                )
            }
            TensorError::InvalidValue { label } => {
                write!(f, "invalid value supplied for {label}")
            }
        }
    }
}

impl Error for TensorError {}

/// Dense row-major matrix of `f32` values.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Tensor {
    fn new_checked(rows: usize, cols: usize, data: Vec<f32>) -> PureResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        if data.len() != rows * cols {
            return Err(TensorError::DataLength {
                expected: rows * cols,
                got: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    fn seedable_rng(seed: Option<u64>, label: &str) -> StdRng {
        determinism::rng_from_optional(seed, label)
    }

    /// Create a tensor filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> PureResult<Self> {
        Self::new_checked(rows, cols, vec![0.0; rows.saturating_mul(cols)])
    }

    /// Create a tensor from raw data. The provided vector must match
    /// `rows * cols` elements.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> PureResult<Self> {
        Self::new_checked(rows, cols, data)
    }

    /// Construct a tensor by applying a generator function to each coordinate.
    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> PureResult<Self>
    where
        F: FnMut(usize, usize) -> f32,
    {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self::new_checked(rows, cols, data)
    }

    /// Construct a tensor by sampling a uniform distribution in `[min, max)`.
    ///
    /// When `seed` is provided the RNG becomes deterministic which makes tests
    /// and benchmarks reproducible. Otherwise entropy from the host is used.
    pub fn random_uniform(
        rows: usize,
        cols: usize,
        min: f32,
        max: f32,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        if !(min < max) {
            return Err(TensorError::InvalidValue {
                label: "random_uniform_bounds",
            });
        }
        let mut rng = Self::seedable_rng(seed, "strata-tensor/tensor/uniform");
        let distribution = Uniform::new(min, max);
        let mut data = Vec::with_capacity(rows * cols);
        for _ in 0..rows * cols {
            data.push(distribution.sample(&mut rng));
        }
        Self::new_checked(rows, cols, data)
    }

    /// Construct a tensor by sampling a normal distribution with the provided
    /// mean and standard deviation.
    pub fn random_normal(
        rows: usize,
        cols: usize,
        mean: f32,
        std: f32,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        if std <= 0.0 {
            return Err(TensorError::InvalidValue {
                label: "random_normal_std",
            });
        }
        let mut rng = Self::seedable_rng(seed, "strata-tensor/tensor/normal");
        let gaussian = StandardNormal;
        let mut data = Vec::with_capacity(rows * cols);
        for _ in 0..rows * cols {
            let sample: f64 = gaussian.sample(&mut rng);
            data.push(mean + std * sample as f32);
        }
        Self::new_checked(rows, cols, data)
    }

    /// Returns the `(rows, cols)` pair of the tensor.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Total number of elements stored in the tensor.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    /// Returns `true` when the tensor stores no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Immutable view over the underlying row-major storage.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable view over the underlying row-major storage.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Immutable view over a single row.
    pub fn row(&self, index: usize) -> PureResult<&[f32]> {
        if index >= self.rows {
            return Err(TensorError::InvalidValue { label: "row_index" });
        }
        let offset = index * self.cols;
        Ok(&self.data[offset..offset + self.cols])
    }

    /// Mutable view over a single row.
    pub fn row_mut(&mut self, index: usize) -> PureResult<&mut [f32]> {
        if index >= self.rows {
            return Err(TensorError::InvalidValue { label: "row_index" });
        }
        let offset = index * self.cols;
        Ok(&mut self.data[offset..offset + self.cols])
    }

    /// Matrix product `self * other`.
    ///
    /// Large products fan out row-by-row across Rayon workers; each output
    /// cell is still accumulated sequentially so results never depend on the
    /// worker count.
    pub fn matmul(&self, other: &Tensor) -> PureResult<Tensor> {
        if self.cols != other.rows {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let rows = self.rows;
        let inner = self.cols;
        let cols = other.cols;
        let lhs = self.data.as_slice();
        let rhs = other.data.as_slice();
        let mut out = vec![0.0f32; rows * cols];

        let kernel = |r: usize, dst_row: &mut [f32]| {
            let lhs_row = &lhs[r * inner..(r + 1) * inner];
            for (k, &a) in lhs_row.iter().enumerate() {
                let rhs_row = &rhs[k * cols..(k + 1) * cols];
                for (d, &b) in dst_row.iter_mut().zip(rhs_row) {
                    *d += a * b;
                }
            }
        };

        let parallel =
            rows * inner * cols >= PARALLEL_MATMUL_VOLUME && !determinism::lock_reduction_order();
        if parallel {
            out.par_chunks_mut(cols)
                .enumerate()
                .for_each(|(r, dst_row)| kernel(r, dst_row));
        } else {
            for (r, dst_row) in out.chunks_mut(cols).enumerate() {
                kernel(r, dst_row);
            }
        }

        Tensor::new_checked(rows, cols, out)
    }

    /// Returns the transpose of the tensor.
    pub fn transpose(&self) -> Tensor {
        let mut data = vec![0.0f32; self.len()];
        for r in 0..self.rows {
            for c in 0..self.cols {
                data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        Tensor {
            rows: self.cols,
            cols: self.rows,
            data,
        }
    }

    /// Element-wise sum of two tensors of identical shape.
    pub fn add(&self, other: &Tensor) -> PureResult<Tensor> {
        if self.shape() != other.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let mut data = Vec::with_capacity(self.len());
        for (a, b) in self.data.iter().zip(other.data.iter()) {
            data.push(a + b);
        }
        Tensor::new_checked(self.rows, self.cols, data)
    }

    /// Element-wise difference of two tensors of identical shape.
    pub fn sub(&self, other: &Tensor) -> PureResult<Tensor> {
        if self.shape() != other.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let mut data = Vec::with_capacity(self.len());
        for (a, b) in self.data.iter().zip(other.data.iter()) {
            data.push(a - b);
        }
        Tensor::new_checked(self.rows, self.cols, data)
    }

    /// Returns a new tensor where every element is scaled by `value`.
    pub fn scale(&self, value: f32) -> PureResult<Tensor> {
        let mut data = Vec::with_capacity(self.len());
        for &a in self.data.iter() {
            data.push(a * value);
        }
        Tensor::new_checked(self.rows, self.cols, data)
    }

    /// Element-wise product (Hadamard) between two tensors of identical shape.
    pub fn hadamard(&self, other: &Tensor) -> PureResult<Tensor> {
        if self.shape() != other.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let mut data = Vec::with_capacity(self.len());
        for (a, b) in self.data.iter().zip(other.data.iter()) {
            data.push(a * b);
        }
        Tensor::new_checked(self.rows, self.cols, data)
    }

    /// Add a scaled tensor to this tensor (`self += scale * other`).
    pub fn add_scaled(&mut self, other: &Tensor, scale: f32) -> PureResult<()> {
        if self.shape() != other.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += scale * b;
        }
        Ok(())
    }

    /// Add the provided row vector to every row (`self[row] += bias`).
    pub fn add_row_inplace(&mut self, bias: &[f32]) -> PureResult<()> {
        if bias.len() != self.cols {
            return Err(TensorError::DataLength {
                expected: self.cols,
                got: bias.len(),
            });
        }
        for r in 0..self.rows {
            let offset = r * self.cols;
            for c in 0..self.cols {
                self.data[offset + c] += bias[c];
            }
        }
        Ok(())
    }

    /// Returns the sum over rows for each column.
    pub fn sum_axis0(&self) -> Vec<f32> {
        let mut sums = vec![0.0; self.cols];
        for r in 0..self.rows {
            let offset = r * self.cols;
            for c in 0..self.cols {
                sums[c] += self.data[offset + c];
            }
        }
        sums
    }

    /// Concatenates tensors row-wise producing a new tensor whose row count is
    /// the sum of the inputs while preserving the shared column dimension.
    pub fn cat_rows(tensors: &[Tensor]) -> PureResult<Tensor> {
        if tensors.is_empty() {
            return Err(TensorError::EmptyInput("Tensor::cat_rows"));
        }
        let cols = tensors[0].cols;
        let mut total_rows = 0usize;
        for tensor in tensors {
            if tensor.cols != cols {
                return Err(TensorError::ShapeMismatch {
                    left: tensor.shape(),
                    right: (tensor.rows, cols),
                });
            }
            total_rows += tensor.rows;
        }
        let mut data = Vec::with_capacity(total_rows * cols);
        for tensor in tensors {
            data.extend_from_slice(&tensor.data);
        }
        Tensor::new_checked(total_rows, cols, data)
    }

    /// Concatenates two tensors column-wise. Both operands must share the row
    /// count.
    pub fn concat_cols(&self, other: &Tensor) -> PureResult<Tensor> {
        if self.rows != other.rows {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let cols = self.cols + other.cols;
        let mut data = Vec::with_capacity(self.rows * cols);
        for r in 0..self.rows {
            let left = r * self.cols;
            let right = r * other.cols;
            data.extend_from_slice(&self.data[left..left + self.cols]);
            data.extend_from_slice(&other.data[right..right + other.cols]);
        }
        Tensor::new_checked(self.rows, cols, data)
    }

    /// Copies the half-open column range `[start, end)` into a new tensor.
    pub fn slice_cols(&self, start: usize, end: usize) -> PureResult<Tensor> {
        if start >= end || end > self.cols {
            return Err(TensorError::InvalidValue {
                label: "column_range",
            });
        }
        let width = end - start;
        let mut data = Vec::with_capacity(self.rows * width);
        for r in 0..self.rows {
            let offset = r * self.cols;
            data.extend_from_slice(&self.data[offset + start..offset + end]);
        }
        Tensor::new_checked(self.rows, width, data)
    }

    /// Computes the squared L2 norm of the tensor.
    pub fn squared_l2_norm(&self) -> f32 {
        self.data.iter().map(|v| v * v).sum()
    }
}
