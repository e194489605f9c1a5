// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of StrataTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Continuous stack and queue memories.
//!
//! Cells hold a frozen value vector per batch lane together with a scalar
//! strength. Pops and reads walk the cells in discipline order, consuming a
//! strength budget; reads use a unit budget and zero-pad whatever the budget
//! cannot cover. Every operation is piecewise linear in the strengths, so the
//! exact gradient can be recovered by replaying the recorded walks in reverse
//! step order.

use crate::error::{MachineError, MachineResult};
use serde::{Deserialize, Serialize};
use strata_tensor::{PureResult, Tensor, TensorError};

/// Traversal discipline shared by the pop and read walks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Discipline {
    /// Newest cells are consumed first (LIFO).
    Stack,
    /// Oldest cells are consumed first (FIFO).
    Queue,
}

/// Instruction triple emitted by a control network for a single step.
#[derive(Clone, Debug)]
pub struct StructInstruction {
    /// Cell payload, one row per batch lane.
    pub value: Tensor,
    /// Pop strength column, one row per batch lane.
    pub pop: Tensor,
    /// Push strength column, one row per batch lane.
    pub push: Tensor,
}

/// Gradient of the loss with respect to one step's instruction triple.
#[derive(Clone, Debug)]
pub struct InstructionGrad {
    /// Gradient flowing into the pushed cell payload.
    pub value: Tensor,
    /// Gradient flowing into the pop strength.
    pub pop: Tensor,
    /// Gradient flowing into the push strength.
    pub push: Tensor,
}

struct StructCell {
    /// Payload frozen at push time, `batch x read_size`.
    value: Tensor,
    /// Current strength per batch lane.
    strengths: Vec<f32>,
}

struct StepCache {
    cells_before: usize,
    pop_budgets: Vec<f32>,
    /// Strengths before the pop walk, indexed `[cell][lane]`.
    pre_strengths: Vec<Vec<f32>>,
    /// Strengths after pop and push, indexed `[cell][lane]`.
    post_strengths: Vec<Vec<f32>>,
    /// Read weights produced by the unit-budget walk, indexed `[cell][lane]`.
    read_weights: Vec<Vec<f32>>,
}

fn walk_order(discipline: Discipline, cells: usize) -> Vec<usize> {
    match discipline {
        Discipline::Stack => (0..cells).rev().collect(),
        Discipline::Queue => (0..cells).collect(),
    }
}

/// Differentiable memory bank addressed by continuous strengths.
///
/// Fully popped cells stay in place with zero strength so cell indices remain
/// aligned across batch lanes; a zero-strength cell is observably identical
/// to a removed one.
pub struct NeuralStruct {
    read_size: usize,
    discipline: Discipline,
    batch_size: usize,
    cells: Vec<StructCell>,
    caches: Vec<StepCache>,
    /// Carried dL/d(post-pop strength) per cell and lane during a backward sweep.
    grad_strengths: Vec<Vec<f32>>,
    /// Carried dL/d(cell payload) during a backward sweep.
    grad_values: Vec<Tensor>,
    training: bool,
}

impl NeuralStruct {
    /// Creates an empty memory with the given read width.
    pub fn new(read_size: usize, discipline: Discipline) -> MachineResult<Self> {
        if read_size == 0 {
            return Err(MachineError::Tensor(TensorError::InvalidDimensions {
                rows: 1,
                cols: read_size,
            }));
        }
        Ok(Self {
            read_size,
            discipline,
            batch_size: 0,
            cells: Vec::new(),
            caches: Vec::new(),
            grad_strengths: Vec::new(),
            grad_values: Vec::new(),
            training: true,
        })
    }

    /// Width of the vectors stored in each cell.
    pub fn read_size(&self) -> usize {
        self.read_size
    }

    /// Traversal discipline used by pops and reads.
    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    /// Batch width adopted at the last [`NeuralStruct::reset`].
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of cells currently held, including zero-strength slots.
    pub fn depth(&self) -> usize {
        self.cells.len()
    }

    /// Enables or disables recording of step caches for backward sweeps.
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    /// Returns whether step caches are being recorded.
    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Clears all cells, caches, and gradient carries, and fixes the batch
    /// width for the next session.
    pub fn reset(&mut self, batch_size: usize) -> MachineResult<()> {
        if batch_size == 0 {
            return Err(MachineError::Tensor(TensorError::InvalidDimensions {
                rows: batch_size,
                cols: self.read_size,
            }));
        }
        self.batch_size = batch_size;
        self.cells.clear();
        self.caches.clear();
        self.grad_strengths.clear();
        self.grad_values.clear();
        Ok(())
    }

    /// Strength of every cell for one batch lane, oldest cell first.
    pub fn lane_strengths(&self, lane: usize) -> MachineResult<Vec<f32>> {
        if lane >= self.batch_size {
            return Err(MachineError::Tensor(TensorError::InvalidValue {
                label: "batch_lane",
            }));
        }
        Ok(self.cells.iter().map(|cell| cell.strengths[lane]).collect())
    }

    /// Sum of all cell strengths for one batch lane.
    pub fn total_strength(&self, lane: usize) -> MachineResult<f32> {
        Ok(self.lane_strengths(lane)?.iter().sum())
    }

    fn guard_strength_column(
        tensor: &Tensor,
        batch: usize,
        label: &'static str,
    ) -> MachineResult<()> {
        if tensor.shape() != (batch, 1) {
            return Err(MachineError::Tensor(TensorError::ShapeMismatch {
                left: tensor.shape(),
                right: (batch, 1),
            }));
        }
        for &value in tensor.data() {
            if value < 0.0 {
                return Err(MachineError::NegativeStrength { label, value });
            }
        }
        Ok(())
    }

    /// Applies one instruction triple: pop `pop` worth of strength, push
    /// `value` with strength `push`, then read one unit worth of strength.
    ///
    /// Returns the read vector, zero-padded wherever the remaining cells
    /// cannot cover the unit budget.
    pub fn update(&mut self, value: &Tensor, pop: &Tensor, push: &Tensor) -> MachineResult<Tensor> {
        if self.batch_size == 0 {
            return Err(MachineError::UninitializedSession);
        }
        let batch = self.batch_size;
        if value.shape() != (batch, self.read_size) {
            return Err(MachineError::Tensor(TensorError::ShapeMismatch {
                left: value.shape(),
                right: (batch, self.read_size),
            }));
        }
        Self::guard_strength_column(pop, batch, "pop")?;
        Self::guard_strength_column(push, batch, "push")?;

        let cells_before = self.cells.len();
        let pop_budgets = pop.data().to_vec();
        let pre_strengths: Vec<Vec<f32>> = self
            .cells
            .iter()
            .map(|cell| cell.strengths.clone())
            .collect();

        let order = walk_order(self.discipline, cells_before);
        for b in 0..batch {
            let mut remaining = pop_budgets[b];
            for &idx in &order {
                if remaining <= 0.0 {
                    break;
                }
                let strength = self.cells[idx].strengths[b];
                let take = if strength <= remaining {
                    strength
                } else {
                    remaining
                };
                self.cells[idx].strengths[b] = (strength - take).max(0.0);
                remaining = (remaining - take).max(0.0);
            }
        }

        self.cells.push(StructCell {
            value: value.clone(),
            strengths: push.data().to_vec(),
        });

        let cells_now = self.cells.len();
        let order = walk_order(self.discipline, cells_now);
        let mut read_weights = vec![vec![0.0f32; batch]; cells_now];
        for b in 0..batch {
            let mut remaining = 1.0f32;
            for &idx in &order {
                if remaining <= 0.0 {
                    break;
                }
                let strength = self.cells[idx].strengths[b];
                let weight = if strength <= remaining {
                    strength
                } else {
                    remaining
                };
                read_weights[idx][b] = weight;
                remaining = (remaining - weight).max(0.0);
            }
        }

        let mut read = Tensor::zeros(batch, self.read_size)?;
        for (idx, cell) in self.cells.iter().enumerate() {
            for b in 0..batch {
                let weight = read_weights[idx][b];
                if weight == 0.0 {
                    continue;
                }
                let value_row = cell.value.row(b)?;
                let read_row = read.row_mut(b)?;
                for (slot, &component) in read_row.iter_mut().zip(value_row.iter()) {
                    *slot += weight * component;
                }
            }
        }

        if self.training {
            let post_strengths: Vec<Vec<f32>> = self
                .cells
                .iter()
                .map(|cell| cell.strengths.clone())
                .collect();
            self.caches.push(StepCache {
                cells_before,
                pop_budgets,
                pre_strengths,
                post_strengths,
                read_weights,
            });
        }

        Ok(read)
    }

    /// Consumes the most recent step cache and routes `read_grad` back onto
    /// that step's instruction triple.
    ///
    /// Must be called once per recorded step in strict reverse order; the
    /// structure carries the strength and payload gradients of still-live
    /// cells across calls. The walks are replayed with the cached strengths so
    /// every branch decision matches the forward pass exactly.
    pub fn backward_step(&mut self, read_grad: &Tensor) -> MachineResult<InstructionGrad> {
        let batch = self.batch_size;
        // Reject bad shapes before the cache stack is consumed; a rejected
        // call must stay retryable.
        if read_grad.shape() != (batch, self.read_size) {
            return Err(MachineError::Tensor(TensorError::ShapeMismatch {
                left: read_grad.shape(),
                right: (batch, self.read_size),
            }));
        }
        let cache = self
            .caches
            .pop()
            .ok_or(MachineError::MissingCache { label: "memory step" })?;

        let cells_after = cache.cells_before + 1;
        if self.grad_strengths.is_empty() && self.grad_values.is_empty() {
            self.grad_strengths = vec![vec![0.0f32; batch]; cells_after];
            self.grad_values = (0..cells_after)
                .map(|_| Tensor::zeros(batch, self.read_size))
                .collect::<PureResult<Vec<_>>>()?;
        }
        if self.grad_strengths.len() != cells_after {
            return Err(MachineError::GradientCount {
                expected: cells_after,
                got: self.grad_strengths.len(),
            });
        }

        // Read backward. A cell consumed whole passes the weight gradient to
        // its strength; the boundary cell's window instead narrows when any
        // earlier cell widens, so its weight gradient routes negatively onto
        // every cell visited before it.
        let order = walk_order(self.discipline, cells_after);
        for b in 0..batch {
            let grad_row = read_grad.row(b)?.to_vec();
            let mut weight_grads = vec![0.0f32; cells_after];
            for idx in 0..cells_after {
                let value_row = self.cells[idx].value.row(b)?;
                let mut dot = 0.0f32;
                for (g, v) in grad_row.iter().zip(value_row.iter()) {
                    dot += g * v;
                }
                weight_grads[idx] = dot;

                let weight = cache.read_weights[idx][b];
                if weight != 0.0 {
                    let target = self.grad_values[idx].row_mut(b)?;
                    for (slot, g) in target.iter_mut().zip(grad_row.iter()) {
                        *slot += weight * g;
                    }
                }
            }

            let mut remaining = 1.0f32;
            let mut visited: Vec<usize> = Vec::new();
            for &idx in &order {
                if remaining <= 0.0 {
                    break;
                }
                let strength = cache.post_strengths[idx][b];
                if strength <= remaining {
                    self.grad_strengths[idx][b] += weight_grads[idx];
                    remaining -= strength;
                    visited.push(idx);
                } else {
                    for &j in &visited {
                        self.grad_strengths[j][b] -= weight_grads[idx];
                    }
                    remaining = 0.0;
                }
            }
        }

        // Pop backward over the cells that existed before the push. Cells
        // flattened to zero absorb no gradient themselves but prop up the
        // boundary cell; the boundary passes its gradient through and flips
        // its sign onto the pop budget. A walk that exhausts every cell has
        // no boundary, so the budget receives nothing.
        let mut pre_grads = vec![vec![0.0f32; batch]; cache.cells_before];
        let mut pop_grads = vec![0.0f32; batch];
        let order = walk_order(self.discipline, cache.cells_before);
        for b in 0..batch {
            let mut remaining = cache.pop_budgets[b];
            let mut consumed: Vec<usize> = Vec::new();
            for &idx in &order {
                let upstream = self.grad_strengths[idx][b];
                if remaining <= 0.0 {
                    pre_grads[idx][b] = upstream;
                } else if cache.pre_strengths[idx][b] <= remaining {
                    remaining -= cache.pre_strengths[idx][b];
                    consumed.push(idx);
                } else {
                    pre_grads[idx][b] = upstream;
                    pop_grads[b] -= upstream;
                    for &j in &consumed {
                        pre_grads[j][b] += upstream;
                    }
                    remaining = 0.0;
                }
            }
        }

        let push_grads: Vec<f32> = self.grad_strengths[cache.cells_before].clone();
        let value_grad = self
            .grad_values
            .pop()
            .ok_or(MachineError::MissingCache { label: "value carry" })?;
        self.grad_strengths = pre_grads;

        Ok(InstructionGrad {
            value: value_grad,
            pop: Tensor::from_vec(batch, 1, pop_grads)?,
            push: Tensor::from_vec(batch, 1, push_grads)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(values: &[f32]) -> Tensor {
        Tensor::from_vec(values.len(), 1, values.to_vec()).unwrap()
    }

    #[test]
    fn push_then_partial_read_scales_value() {
        let mut memory = NeuralStruct::new(1, Discipline::Stack).unwrap();
        memory.reset(1).unwrap();

        let read = memory
            .update(
                &Tensor::from_vec(1, 1, vec![5.0]).unwrap(),
                &column(&[0.0]),
                &column(&[0.5]),
            )
            .unwrap();
        assert!((read.data()[0] - 2.5).abs() < 1e-6);

        let read = memory
            .update(
                &Tensor::from_vec(1, 1, vec![10.0]).unwrap(),
                &column(&[0.5]),
                &column(&[1.0]),
            )
            .unwrap();
        assert!((read.data()[0] - 10.0).abs() < 1e-6);

        // The first cell was flattened to zero but keeps its slot.
        assert_eq!(memory.depth(), 2);
        assert_eq!(memory.lane_strengths(0).unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn stack_reads_newest_first_queue_reads_oldest_first() {
        for (discipline, expected) in [(Discipline::Stack, 2.0f32), (Discipline::Queue, 1.0f32)] {
            let mut memory = NeuralStruct::new(1, discipline).unwrap();
            memory.reset(1).unwrap();
            memory
                .update(
                    &Tensor::from_vec(1, 1, vec![1.0]).unwrap(),
                    &column(&[0.0]),
                    &column(&[1.0]),
                )
                .unwrap();
            let read = memory
                .update(
                    &Tensor::from_vec(1, 1, vec![2.0]).unwrap(),
                    &column(&[0.0]),
                    &column(&[1.0]),
                )
                .unwrap();
            assert!(
                (read.data()[0] - expected).abs() < 1e-6,
                "{discipline:?} read {} expected {expected}",
                read.data()[0]
            );
        }
    }

    #[test]
    fn pop_consumes_exactly_the_requested_strength() {
        let mut memory = NeuralStruct::new(1, Discipline::Stack).unwrap();
        memory.reset(1).unwrap();
        for _ in 0..3 {
            memory
                .update(
                    &Tensor::from_vec(1, 1, vec![1.0]).unwrap(),
                    &column(&[0.0]),
                    &column(&[0.4]),
                )
                .unwrap();
        }

        // Pop 0.65 across a cell boundary: 1.2 - 0.65 must remain.
        let read = memory
            .update(
                &Tensor::from_vec(1, 1, vec![1.0]).unwrap(),
                &column(&[0.65]),
                &column(&[0.0]),
            )
            .unwrap();
        assert!((memory.total_strength(0).unwrap() - 0.55).abs() < 1e-6);
        // Unit values turn the read into the sum of read weights.
        assert!((read.data()[0] - 0.55).abs() < 1e-6);

        // Once total strength exceeds 1.0 the read weights saturate at 1.0.
        let read = memory
            .update(
                &Tensor::from_vec(1, 1, vec![1.0]).unwrap(),
                &column(&[0.0]),
                &column(&[0.9]),
            )
            .unwrap();
        assert!((read.data()[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn full_pop_of_a_fresh_push_restores_the_previous_state() {
        let mut control = NeuralStruct::new(1, Discipline::Stack).unwrap();
        control.reset(1).unwrap();
        let mut churned = NeuralStruct::new(1, Discipline::Stack).unwrap();
        churned.reset(1).unwrap();
        for memory in [&mut control, &mut churned] {
            memory
                .update(
                    &Tensor::from_vec(1, 1, vec![4.0]).unwrap(),
                    &column(&[0.0]),
                    &column(&[0.7]),
                )
                .unwrap();
        }

        // Push 0.6 of [9], then pop exactly that 0.6 on the next step.
        churned
            .update(
                &Tensor::from_vec(1, 1, vec![9.0]).unwrap(),
                &column(&[0.0]),
                &column(&[0.6]),
            )
            .unwrap();
        let observed = churned
            .update(
                &Tensor::from_vec(1, 1, vec![0.0]).unwrap(),
                &column(&[0.6]),
                &column(&[0.0]),
            )
            .unwrap();
        let reference = control
            .update(
                &Tensor::from_vec(1, 1, vec![0.0]).unwrap(),
                &column(&[0.0]),
                &column(&[0.0]),
            )
            .unwrap();

        let drift =
            (churned.total_strength(0).unwrap() - control.total_strength(0).unwrap()).abs();
        assert!(drift < 1e-6);
        assert!((observed.data()[0] - reference.data()[0]).abs() < 1e-6);
    }

    #[test]
    fn zero_strength_push_never_perturbs_the_read() {
        let mut memory = NeuralStruct::new(1, Discipline::Stack).unwrap();
        memory.reset(1).unwrap();
        memory
            .update(
                &Tensor::from_vec(1, 1, vec![3.0]).unwrap(),
                &column(&[0.0]),
                &column(&[0.8]),
            )
            .unwrap();
        let read = memory
            .update(
                &Tensor::from_vec(1, 1, vec![999.0]).unwrap(),
                &column(&[0.0]),
                &column(&[0.0]),
            )
            .unwrap();
        assert!((read.data()[0] - 2.4).abs() < 1e-6);
        assert_eq!(memory.depth(), 2);
    }

    #[test]
    fn pop_beyond_total_strength_empties_every_cell() {
        let mut memory = NeuralStruct::new(1, Discipline::Stack).unwrap();
        memory.reset(1).unwrap();
        for value in [1.0f32, 2.0, 3.0] {
            memory
                .update(
                    &Tensor::from_vec(1, 1, vec![value]).unwrap(),
                    &column(&[0.0]),
                    &column(&[0.4]),
                )
                .unwrap();
        }
        let read = memory
            .update(
                &Tensor::from_vec(1, 1, vec![0.0]).unwrap(),
                &column(&[5.0]),
                &column(&[0.0]),
            )
            .unwrap();
        assert_eq!(read.data()[0], 0.0);
        assert_eq!(memory.total_strength(0).unwrap(), 0.0);
    }

    #[test]
    fn negative_strength_is_rejected() {
        let mut memory = NeuralStruct::new(1, Discipline::Stack).unwrap();
        memory.reset(1).unwrap();
        let result = memory.update(
            &Tensor::from_vec(1, 1, vec![1.0]).unwrap(),
            &column(&[-0.1]),
            &column(&[0.5]),
        );
        assert!(matches!(
            result,
            Err(MachineError::NegativeStrength { label: "pop", .. })
        ));
    }

    #[test]
    fn update_requires_reset() {
        let mut memory = NeuralStruct::new(1, Discipline::Stack).unwrap();
        let result = memory.update(
            &Tensor::from_vec(1, 1, vec![1.0]).unwrap(),
            &column(&[0.0]),
            &column(&[0.5]),
        );
        assert!(matches!(result, Err(MachineError::UninitializedSession)));
    }

    #[test]
    fn backward_without_forward_reports_missing_cache() {
        let mut memory = NeuralStruct::new(1, Discipline::Stack).unwrap();
        memory.reset(1).unwrap();
        let grad = Tensor::from_vec(1, 1, vec![1.0]).unwrap();
        assert!(matches!(
            memory.backward_step(&grad),
            Err(MachineError::MissingCache { .. })
        ));
    }

    #[test]
    fn misshapen_read_grad_leaves_the_cache_intact() {
        let mut memory = NeuralStruct::new(2, Discipline::Stack).unwrap();
        memory.reset(1).unwrap();
        memory
            .update(
                &Tensor::from_vec(1, 2, vec![1.0, -1.0]).unwrap(),
                &column(&[0.0]),
                &column(&[0.5]),
            )
            .unwrap();

        let misshapen = Tensor::from_vec(1, 1, vec![1.0]).unwrap();
        assert!(matches!(
            memory.backward_step(&misshapen),
            Err(MachineError::Tensor(TensorError::ShapeMismatch { .. }))
        ));

        // The recorded step must survive the rejected call.
        let grad = Tensor::from_vec(1, 2, vec![1.0, 0.0]).unwrap();
        let grads = memory.backward_step(&grad).unwrap();
        assert_eq!(grads.value.shape(), (1, 2));
        assert_eq!(grads.pop.shape(), (1, 1));
    }

    #[test]
    fn eval_mode_records_no_caches() {
        let mut memory = NeuralStruct::new(1, Discipline::Stack).unwrap();
        memory.reset(1).unwrap();
        memory.set_training(false);
        memory
            .update(
                &Tensor::from_vec(1, 1, vec![1.0]).unwrap(),
                &column(&[0.0]),
                &column(&[0.5]),
            )
            .unwrap();
        let grad = Tensor::from_vec(1, 1, vec![1.0]).unwrap();
        assert!(matches!(
            memory.backward_step(&grad),
            Err(MachineError::MissingCache { .. })
        ));
    }

    #[test]
    fn batch_lanes_do_not_interact() {
        let mut memory = NeuralStruct::new(1, Discipline::Stack).unwrap();
        memory.reset(2).unwrap();
        memory
            .update(
                &Tensor::from_vec(2, 1, vec![3.0, 7.0]).unwrap(),
                &column(&[0.0, 0.0]),
                &column(&[1.0, 0.25]),
            )
            .unwrap();
        let read = memory
            .update(
                &Tensor::from_vec(2, 1, vec![0.0, 0.0]).unwrap(),
                &column(&[0.6, 0.0]),
                &column(&[0.0, 0.0]),
            )
            .unwrap();
        // Lane 0: 0.4 of 3.0 remains. Lane 1: 0.25 of 7.0 was never popped.
        assert!((read.data()[0] - 1.2).abs() < 1e-6);
        assert!((read.data()[1] - 1.75).abs() < 1e-6);
    }
}
