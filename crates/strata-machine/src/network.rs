// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of StrataTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Control networks that translate an input vector and the previous read into
//! a task output plus a memory instruction triple.
//!
//! Every network shares the same decision head layout: a linear map onto
//! `output_size + read_size + 2` columns, gated as sigmoid output, tanh cell
//! payload, and sigmoid pop/push strengths. Strengths therefore always land
//! in `(0, 1)` and can never trip the memory's negativity guard.

use crate::error::{MachineError, MachineResult};
use crate::structure::{InstructionGrad, StructInstruction};
use std::collections::HashMap;
use strata_nn::{Linear, Module, Parameter};
use strata_tensor::{PureResult, Tensor, TensorError};

/// Output of one control step: the task output and the instruction triple
/// handed to the memory.
#[derive(Clone, Debug)]
pub struct ControlDecision {
    /// Task output row per batch lane, squashed through a sigmoid.
    pub output: Tensor,
    /// Instruction triple for the memory update.
    pub instruction: StructInstruction,
}

/// Network driving a differentiable memory.
///
/// Implementations own their per-step caches and replay them in strict
/// reverse order during the backward sweep, mirroring the memory itself.
pub trait ControlNetwork {
    /// Width of the task input vectors.
    fn input_size(&self) -> usize;

    /// Width of the memory read vectors.
    fn read_size(&self) -> usize;

    /// Width of the produced task outputs.
    fn output_size(&self) -> usize;

    /// Computes one step from the current input and the previous read.
    fn forward(&mut self, input: &Tensor, read: &Tensor) -> MachineResult<ControlDecision>;

    /// Consumes the most recent step cache and returns the gradients with
    /// respect to that step's input and read.
    fn backward(
        &mut self,
        grad_output: &Tensor,
        grad_instruction: &InstructionGrad,
    ) -> MachineResult<(Tensor, Tensor)>;

    /// Clears recurrent state and step caches for a fresh session.
    fn reset_session(&mut self, batch_size: usize) -> MachineResult<()>;

    /// Enables or disables step cache recording.
    fn set_training(&mut self, training: bool);

    /// Visits immutable parameters.
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()>;

    /// Visits mutable parameters.
    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()>;

    /// Captures a copy of every parameter tensor keyed by its canonical name.
    fn state_dict(&self) -> PureResult<HashMap<String, Tensor>> {
        let mut state = HashMap::new();
        self.visit_parameters(&mut |param| {
            state.insert(param.name().to_string(), param.value().clone());
            Ok(())
        })?;
        Ok(state)
    }

    /// Restores parameters from a state dictionary.
    fn load_state_dict(&mut self, state: &HashMap<String, Tensor>) -> PureResult<()> {
        self.visit_parameters_mut(&mut |param| {
            let Some(value) = state.get(param.name()) else {
                return Err(TensorError::MissingParameter {
                    name: param.name().to_string(),
                });
            };
            param.load_value(value)
        })
    }
}

pub(crate) fn sigmoid_tensor(tensor: &Tensor) -> PureResult<Tensor> {
    let (rows, cols) = tensor.shape();
    let mut data = Vec::with_capacity(rows * cols);
    for &value in tensor.data() {
        data.push(1.0 / (1.0 + (-value).exp()));
    }
    Tensor::from_vec(rows, cols, data)
}

pub(crate) fn tanh_tensor(tensor: &Tensor) -> PureResult<Tensor> {
    let (rows, cols) = tensor.shape();
    let mut data = Vec::with_capacity(rows * cols);
    for &value in tensor.data() {
        data.push(value.tanh());
    }
    Tensor::from_vec(rows, cols, data)
}

/// Chain rule through a sigmoid given the activation it produced.
pub(crate) fn sigmoid_grad_from_output(grad: &Tensor, output: &Tensor) -> PureResult<Tensor> {
    if grad.shape() != output.shape() {
        return Err(TensorError::ShapeMismatch {
            left: grad.shape(),
            right: output.shape(),
        });
    }
    let (rows, cols) = grad.shape();
    let mut data = Vec::with_capacity(rows * cols);
    for (g, o) in grad.data().iter().zip(output.data().iter()) {
        data.push(g * o * (1.0 - o));
    }
    Tensor::from_vec(rows, cols, data)
}

/// Chain rule through a tanh given the activation it produced.
pub(crate) fn tanh_grad_from_output(grad: &Tensor, output: &Tensor) -> PureResult<Tensor> {
    if grad.shape() != output.shape() {
        return Err(TensorError::ShapeMismatch {
            left: grad.shape(),
            right: output.shape(),
        });
    }
    let (rows, cols) = grad.shape();
    let mut data = Vec::with_capacity(rows * cols);
    for (g, o) in grad.data().iter().zip(output.data().iter()) {
        data.push(g * (1.0 - o * o));
    }
    Tensor::from_vec(rows, cols, data)
}

/// Shared decision head: one linear map whose columns are gated into
/// `[output | value | pop | push]`.
pub(crate) struct DecisionHead {
    linear: Linear,
    output_size: usize,
    read_size: usize,
}

impl DecisionHead {
    pub(crate) fn new(
        name: &str,
        feature_dim: usize,
        output_size: usize,
        read_size: usize,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        let columns = output_size + read_size + 2;
        let linear = match seed {
            Some(seed) => Linear::with_seed(format!("{name}::head"), feature_dim, columns, seed)?,
            None => Linear::new(format!("{name}::head"), feature_dim, columns)?,
        };
        Ok(Self {
            linear,
            output_size,
            read_size,
        })
    }

    pub(crate) fn forward(&self, features: &Tensor) -> PureResult<ControlDecision> {
        let preact = self.linear.forward(features)?;
        let value_end = self.output_size + self.read_size;
        let output = sigmoid_tensor(&preact.slice_cols(0, self.output_size)?)?;
        let value = tanh_tensor(&preact.slice_cols(self.output_size, value_end)?)?;
        let pop = sigmoid_tensor(&preact.slice_cols(value_end, value_end + 1)?)?;
        let push = sigmoid_tensor(&preact.slice_cols(value_end + 1, value_end + 2)?)?;
        Ok(ControlDecision {
            output,
            instruction: StructInstruction { value, pop, push },
        })
    }

    pub(crate) fn backward(
        &mut self,
        features: &Tensor,
        decision: &ControlDecision,
        grad_output: &Tensor,
        grad_instruction: &InstructionGrad,
    ) -> PureResult<Tensor> {
        let grad_preact = sigmoid_grad_from_output(grad_output, &decision.output)?
            .concat_cols(&tanh_grad_from_output(
                &grad_instruction.value,
                &decision.instruction.value,
            )?)?
            .concat_cols(&sigmoid_grad_from_output(
                &grad_instruction.pop,
                &decision.instruction.pop,
            )?)?
            .concat_cols(&sigmoid_grad_from_output(
                &grad_instruction.push,
                &decision.instruction.push,
            )?)?;
        self.linear.backward(features, &grad_preact)
    }

    pub(crate) fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.linear.visit_parameters(visitor)
    }

    pub(crate) fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.linear.visit_parameters_mut(visitor)
    }
}

pub(crate) fn guard_step_inputs(
    input: &Tensor,
    read: &Tensor,
    input_size: usize,
    read_size: usize,
) -> MachineResult<()> {
    if input.shape().1 != input_size {
        return Err(MachineError::Tensor(TensorError::ShapeMismatch {
            left: input.shape(),
            right: (input.shape().0, input_size),
        }));
    }
    if read.shape() != (input.shape().0, read_size) {
        return Err(MachineError::Tensor(TensorError::ShapeMismatch {
            left: read.shape(),
            right: (input.shape().0, read_size),
        }));
    }
    Ok(())
}

struct LinearStepCache {
    joint: Tensor,
    decision: ControlDecision,
}

/// Memoryless control network: one decision head over `[input | read]`.
pub struct LinearControlNetwork {
    input_size: usize,
    read_size: usize,
    output_size: usize,
    head: DecisionHead,
    caches: Vec<LinearStepCache>,
    training: bool,
}

impl LinearControlNetwork {
    /// Creates a feed-forward control network.
    pub fn new(
        input_size: usize,
        read_size: usize,
        output_size: usize,
        seed: Option<u64>,
    ) -> MachineResult<Self> {
        if input_size == 0 || output_size == 0 || read_size == 0 {
            return Err(MachineError::Tensor(TensorError::InvalidDimensions {
                rows: input_size,
                cols: output_size,
            }));
        }
        let head = DecisionHead::new("control", input_size + read_size, output_size, read_size, seed)?;
        Ok(Self {
            input_size,
            read_size,
            output_size,
            head,
            caches: Vec::new(),
            training: true,
        })
    }
}

impl ControlNetwork for LinearControlNetwork {
    fn input_size(&self) -> usize {
        self.input_size
    }

    fn read_size(&self) -> usize {
        self.read_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }

    fn forward(&mut self, input: &Tensor, read: &Tensor) -> MachineResult<ControlDecision> {
        guard_step_inputs(input, read, self.input_size, self.read_size)?;
        let joint = input.concat_cols(read)?;
        let decision = self.head.forward(&joint)?;
        if self.training {
            self.caches.push(LinearStepCache {
                joint,
                decision: decision.clone(),
            });
        }
        Ok(decision)
    }

    fn backward(
        &mut self,
        grad_output: &Tensor,
        grad_instruction: &InstructionGrad,
    ) -> MachineResult<(Tensor, Tensor)> {
        let cache = self.caches.pop().ok_or(MachineError::MissingCache {
            label: "control step",
        })?;
        let grad_joint =
            self.head
                .backward(&cache.joint, &cache.decision, grad_output, grad_instruction)?;
        let grad_input = grad_joint.slice_cols(0, self.input_size)?;
        let grad_read =
            grad_joint.slice_cols(self.input_size, self.input_size + self.read_size)?;
        Ok((grad_input, grad_read))
    }

    fn reset_session(&mut self, _batch_size: usize) -> MachineResult<()> {
        self.caches.clear();
        Ok(())
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.head.visit_parameters(visitor)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.head.visit_parameters_mut(visitor)
    }
}
