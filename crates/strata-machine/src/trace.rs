// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of StrataTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Instruction recording for inspecting what a controller asks of its memory.

use crate::structure::StructInstruction;
use strata_tensor::{PureResult, Tensor, TensorError};

/// Records the instruction stream of batch lane zero, step by step.
///
/// The log has a fixed capacity; once full, further `record` calls are
/// ignored so a runaway session cannot grow it unboundedly.
pub struct InstructionLog {
    capacity: usize,
    read_size: usize,
    recorded: usize,
    pop: Vec<f32>,
    push: Vec<f32>,
    values: Vec<f32>,
}

impl InstructionLog {
    /// Creates an empty log for `capacity` steps of `read_size`-wide values.
    pub fn new(capacity: usize, read_size: usize) -> Self {
        Self {
            capacity,
            read_size,
            recorded: 0,
            pop: Vec::with_capacity(capacity),
            push: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity * read_size),
        }
    }

    /// Number of steps recorded so far.
    pub fn recorded(&self) -> usize {
        self.recorded
    }

    /// Maximum number of steps the log accepts.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the log has reached its capacity.
    pub fn is_full(&self) -> bool {
        self.recorded >= self.capacity
    }

    /// Appends lane zero of the instruction. Once the log is full the call
    /// is a no-op.
    pub fn record(&mut self, instruction: &StructInstruction) -> PureResult<()> {
        if self.is_full() {
            return Ok(());
        }
        if instruction.value.shape().1 != self.read_size {
            return Err(TensorError::ShapeMismatch {
                left: instruction.value.shape(),
                right: (instruction.value.shape().0, self.read_size),
            });
        }
        self.pop.push(instruction.pop.row(0)?[0]);
        self.push.push(instruction.push.row(0)?[0]);
        self.values.extend_from_slice(instruction.value.row(0)?);
        self.recorded += 1;
        Ok(())
    }

    /// Lays the log out as a `(2 + read_size) x capacity` matrix: pop
    /// strengths on row zero, push strengths on row one, then one row per
    /// value component. Columns beyond the recorded steps stay zero.
    pub fn into_matrix(self) -> PureResult<Tensor> {
        let mut matrix = Tensor::zeros(2 + self.read_size, self.capacity)?;
        for step in 0..self.recorded {
            matrix.row_mut(0)?[step] = self.pop[step];
            matrix.row_mut(1)?[step] = self.push[step];
            for component in 0..self.read_size {
                matrix.row_mut(2 + component)?[step] =
                    self.values[step * self.read_size + component];
            }
        }
        Ok(matrix)
    }
}
