// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of StrataTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Recurrent control networks: a vanilla tanh RNN and an LSTM.
//!
//! Both keep their hidden state across `forward` calls within a session and
//! unwind it step by step during the backward sweep. The hidden (and cell)
//! gradient carries live on the network between `backward` calls, exactly
//! like the strength-gradient carry inside the memory itself.

use crate::error::{MachineError, MachineResult};
use crate::network::{
    guard_step_inputs, sigmoid_grad_from_output, sigmoid_tensor, tanh_grad_from_output,
    tanh_tensor, ControlDecision, ControlNetwork, DecisionHead,
};
use crate::structure::InstructionGrad;
use strata_config::determinism;
use strata_nn::{Linear, Module, Parameter};
use strata_tensor::{PureResult, Tensor, TensorError};

/// Derives a per-parameter seed from an optional base seed. Without a base
/// seed the process-wide determinism config decides whether initialisation is
/// reproducible or entropy-driven.
fn derived_seed(seed: Option<u64>, offset: u64, label: &str) -> Option<u64> {
    match seed {
        Some(base) => Some(base.wrapping_add(offset)),
        None => {
            let config = determinism::config();
            config.enabled.then(|| config.seed_for(label))
        }
    }
}

fn guard_layer_sizes(joint_dim: usize, hidden_size: usize, output_size: usize) -> MachineResult<()> {
    if joint_dim == 0 || hidden_size == 0 || output_size == 0 {
        return Err(MachineError::Tensor(TensorError::InvalidDimensions {
            rows: joint_dim,
            cols: hidden_size.max(output_size),
        }));
    }
    Ok(())
}

struct RnnStepCache {
    joint: Tensor,
    hidden_prev: Tensor,
    hidden: Tensor,
    decision: ControlDecision,
}

/// Single-layer tanh RNN feeding the shared decision head.
///
/// `h_t = tanh(W_in [x_t | r_{t-1}] + b + h_{t-1} W_hh)`
pub struct RnnControlNetwork {
    input_size: usize,
    read_size: usize,
    output_size: usize,
    hidden_size: usize,
    input_map: Linear,
    recurrent: Parameter,
    head: DecisionHead,
    hidden: Option<Tensor>,
    grad_hidden: Option<Tensor>,
    caches: Vec<RnnStepCache>,
    training: bool,
}

impl RnnControlNetwork {
    /// Creates a tanh RNN controller network.
    pub fn new(
        input_size: usize,
        read_size: usize,
        output_size: usize,
        hidden_size: usize,
        seed: Option<u64>,
    ) -> MachineResult<Self> {
        let joint_dim = input_size + read_size;
        guard_layer_sizes(joint_dim, hidden_size, output_size)?;
        if input_size == 0 || read_size == 0 {
            return Err(MachineError::Tensor(TensorError::InvalidDimensions {
                rows: input_size,
                cols: read_size,
            }));
        }
        let input_map = match seed {
            Some(base) => {
                Linear::with_seed("rnn::input", joint_dim, hidden_size, base.wrapping_add(1))?
            }
            None => Linear::new("rnn::input", joint_dim, hidden_size)?,
        };
        let scale = 1.0 / (hidden_size as f32).sqrt();
        let recurrent = Parameter::new(
            "rnn::recurrent",
            Tensor::random_normal(
                hidden_size,
                hidden_size,
                0.0,
                scale,
                derived_seed(seed, 2, "strata-machine/rnn/recurrent"),
            )?,
        );
        let head = DecisionHead::new(
            "rnn",
            hidden_size,
            output_size,
            read_size,
            seed.map(|base| base.wrapping_add(3)),
        )?;
        Ok(Self {
            input_size,
            read_size,
            output_size,
            hidden_size,
            input_map,
            recurrent,
            head,
            hidden: None,
            grad_hidden: None,
            caches: Vec::new(),
            training: true,
        })
    }

    /// Width of the hidden state.
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}

impl ControlNetwork for RnnControlNetwork {
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
        let hidden_prev = self
            .hidden
            .clone()
            .ok_or(MachineError::UninitializedSession)?;
        let joint = input.concat_cols(read)?;
        let mut preact = self.input_map.forward(&joint)?;
        preact.add_scaled(&hidden_prev.matmul(self.recurrent.value())?, 1.0)?;
        let hidden = tanh_tensor(&preact)?;
        let decision = self.head.forward(&hidden)?;
        if self.training {
            self.caches.push(RnnStepCache {
                joint,
                hidden_prev,
                hidden: hidden.clone(),
                decision: decision.clone(),
            });
        }
        self.hidden = Some(hidden);
        Ok(decision)
    }

    fn backward(
        &mut self,
        grad_output: &Tensor,
        grad_instruction: &InstructionGrad,
    ) -> MachineResult<(Tensor, Tensor)> {
        let cache = self.caches.pop().ok_or(MachineError::MissingCache {
            label: "recurrent step",
        })?;
        let mut grad_hidden =
            self.head
                .backward(&cache.hidden, &cache.decision, grad_output, grad_instruction)?;
        if let Some(carry) = self.grad_hidden.take() {
            grad_hidden.add_scaled(&carry, 1.0)?;
        }
        let grad_preact = tanh_grad_from_output(&grad_hidden, &cache.hidden)?;
        self.recurrent
            .accumulate_euclidean(&cache.hidden_prev.transpose().matmul(&grad_preact)?)?;
        self.grad_hidden = Some(grad_preact.matmul(&self.recurrent.value().transpose())?);
        let grad_joint = self.input_map.backward(&cache.joint, &grad_preact)?;
        let grad_input = grad_joint.slice_cols(0, self.input_size)?;
        let grad_read =
            grad_joint.slice_cols(self.input_size, self.input_size + self.read_size)?;
        Ok((grad_input, grad_read))
    }

    fn reset_session(&mut self, batch_size: usize) -> MachineResult<()> {
        if batch_size == 0 {
            return Err(MachineError::Tensor(TensorError::InvalidDimensions {
                rows: batch_size,
                cols: self.hidden_size,
            }));
        }
        self.hidden = Some(Tensor::zeros(batch_size, self.hidden_size)?);
        self.grad_hidden = None;
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
        self.input_map.visit_parameters(visitor)?;
        visitor(&self.recurrent)?;
        self.head.visit_parameters(visitor)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.input_map.visit_parameters_mut(visitor)?;
        visitor(&mut self.recurrent)?;
        self.head.visit_parameters_mut(visitor)
    }
}

struct LstmStepCache {
    joint: Tensor,
    hidden_prev: Tensor,
    cell_prev: Tensor,
    input_gate: Tensor,
    forget_gate: Tensor,
    candidate: Tensor,
    output_gate: Tensor,
    cell_tanh: Tensor,
    hidden: Tensor,
    decision: ControlDecision,
}

/// Single-layer LSTM feeding the shared decision head.
///
/// Gate pre-activations are laid out column-wise as `[i | f | g | o]`, the
/// same convention the preactivation slices and the backward concat rely on.
pub struct LstmControlNetwork {
    input_size: usize,
    read_size: usize,
    output_size: usize,
    hidden_size: usize,
    w_ih: Parameter,
    w_hh: Parameter,
    b_ih: Parameter,
    b_hh: Parameter,
    head: DecisionHead,
    hidden: Option<Tensor>,
    cell: Option<Tensor>,
    grad_hidden: Option<Tensor>,
    grad_cell: Option<Tensor>,
    caches: Vec<LstmStepCache>,
    training: bool,
}

impl LstmControlNetwork {
    /// Creates an LSTM controller network.
    pub fn new(
        input_size: usize,
        read_size: usize,
        output_size: usize,
        hidden_size: usize,
        seed: Option<u64>,
    ) -> MachineResult<Self> {
        let joint_dim = input_size + read_size;
        guard_layer_sizes(joint_dim, hidden_size, output_size)?;
        if input_size == 0 || read_size == 0 {
            return Err(MachineError::Tensor(TensorError::InvalidDimensions {
                rows: input_size,
                cols: read_size,
            }));
        }
        let gate_dim = 4 * hidden_size;
        let w_ih = Parameter::new(
            "lstm::w_ih",
            Tensor::random_normal(
                joint_dim,
                gate_dim,
                0.0,
                1.0 / (joint_dim as f32).sqrt(),
                derived_seed(seed, 1, "strata-machine/lstm/w_ih"),
            )?,
        );
        let w_hh = Parameter::new(
            "lstm::w_hh",
            Tensor::random_normal(
                hidden_size,
                gate_dim,
                0.0,
                1.0 / (hidden_size as f32).sqrt(),
                derived_seed(seed, 2, "strata-machine/lstm/w_hh"),
            )?,
        );
        let b_ih = Parameter::new("lstm::b_ih", Tensor::zeros(1, gate_dim)?);
        let b_hh = Parameter::new("lstm::b_hh", Tensor::zeros(1, gate_dim)?);
        let head = DecisionHead::new(
            "lstm",
            hidden_size,
            output_size,
            read_size,
            seed.map(|base| base.wrapping_add(3)),
        )?;
        Ok(Self {
            input_size,
            read_size,
            output_size,
            hidden_size,
            w_ih,
            w_hh,
            b_ih,
            b_hh,
            head,
            hidden: None,
            cell: None,
            grad_hidden: None,
            grad_cell: None,
            caches: Vec::new(),
            training: true,
        })
    }

    /// Width of the hidden state.
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}

impl ControlNetwork for LstmControlNetwork {
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
        let hidden_prev = self
            .hidden
            .clone()
            .ok_or(MachineError::UninitializedSession)?;
        let cell_prev = self
            .cell
            .clone()
            .ok_or(MachineError::UninitializedSession)?;
        let joint = input.concat_cols(read)?;
        let mut preact = joint.matmul(self.w_ih.value())?;
        preact.add_scaled(&hidden_prev.matmul(self.w_hh.value())?, 1.0)?;
        preact.add_row_inplace(self.b_ih.value().data())?;
        preact.add_row_inplace(self.b_hh.value().data())?;

        let h = self.hidden_size;
        let input_gate = sigmoid_tensor(&preact.slice_cols(0, h)?)?;
        let forget_gate = sigmoid_tensor(&preact.slice_cols(h, 2 * h)?)?;
        let candidate = tanh_tensor(&preact.slice_cols(2 * h, 3 * h)?)?;
        let output_gate = sigmoid_tensor(&preact.slice_cols(3 * h, 4 * h)?)?;

        let cell = forget_gate
            .hadamard(&cell_prev)?
            .add(&input_gate.hadamard(&candidate)?)?;
        let cell_tanh = tanh_tensor(&cell)?;
        let hidden = output_gate.hadamard(&cell_tanh)?;
        let decision = self.head.forward(&hidden)?;

        if self.training {
            self.caches.push(LstmStepCache {
                joint,
                hidden_prev,
                cell_prev,
                input_gate,
                forget_gate,
                candidate,
                output_gate,
                cell_tanh,
                hidden: hidden.clone(),
                decision: decision.clone(),
            });
        }
        self.hidden = Some(hidden);
        self.cell = Some(cell);
        Ok(decision)
    }

    fn backward(
        &mut self,
        grad_output: &Tensor,
        grad_instruction: &InstructionGrad,
    ) -> MachineResult<(Tensor, Tensor)> {
        let cache = self.caches.pop().ok_or(MachineError::MissingCache {
            label: "recurrent step",
        })?;
        let mut grad_hidden =
            self.head
                .backward(&cache.hidden, &cache.decision, grad_output, grad_instruction)?;
        if let Some(carry) = self.grad_hidden.take() {
            grad_hidden.add_scaled(&carry, 1.0)?;
        }

        let grad_output_gate = grad_hidden.hadamard(&cache.cell_tanh)?;
        let gate_o = sigmoid_grad_from_output(&grad_output_gate, &cache.output_gate)?;
        let mut grad_cell = tanh_grad_from_output(
            &grad_hidden.hadamard(&cache.output_gate)?,
            &cache.cell_tanh,
        )?;
        if let Some(carry) = self.grad_cell.take() {
            grad_cell.add_scaled(&carry, 1.0)?;
        }
        let gate_i =
            sigmoid_grad_from_output(&grad_cell.hadamard(&cache.candidate)?, &cache.input_gate)?;
        let gate_g =
            tanh_grad_from_output(&grad_cell.hadamard(&cache.input_gate)?, &cache.candidate)?;
        let gate_f =
            sigmoid_grad_from_output(&grad_cell.hadamard(&cache.cell_prev)?, &cache.forget_gate)?;
        self.grad_cell = Some(grad_cell.hadamard(&cache.forget_gate)?);

        let grad_preact = gate_i
            .concat_cols(&gate_f)?
            .concat_cols(&gate_g)?
            .concat_cols(&gate_o)?;
        self.w_ih
            .accumulate_euclidean(&cache.joint.transpose().matmul(&grad_preact)?)?;
        self.w_hh
            .accumulate_euclidean(&cache.hidden_prev.transpose().matmul(&grad_preact)?)?;
        let bias_grad = Tensor::from_vec(1, 4 * self.hidden_size, grad_preact.sum_axis0())?;
        self.b_ih.accumulate_euclidean(&bias_grad)?;
        self.b_hh.accumulate_euclidean(&bias_grad)?;

        self.grad_hidden = Some(grad_preact.matmul(&self.w_hh.value().transpose())?);
        let grad_joint = grad_preact.matmul(&self.w_ih.value().transpose())?;
        let grad_input = grad_joint.slice_cols(0, self.input_size)?;
        let grad_read =
            grad_joint.slice_cols(self.input_size, self.input_size + self.read_size)?;
        Ok((grad_input, grad_read))
    }

    fn reset_session(&mut self, batch_size: usize) -> MachineResult<()> {
        if batch_size == 0 {
            return Err(MachineError::Tensor(TensorError::InvalidDimensions {
                rows: batch_size,
                cols: self.hidden_size,
            }));
        }
        self.hidden = Some(Tensor::zeros(batch_size, self.hidden_size)?);
        self.cell = Some(Tensor::zeros(batch_size, self.hidden_size)?);
        self.grad_hidden = None;
        self.grad_cell = None;
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
        visitor(&self.w_ih)?;
        visitor(&self.w_hh)?;
        visitor(&self.b_ih)?;
        visitor(&self.b_hh)?;
        self.head.visit_parameters(visitor)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&mut self.w_ih)?;
        visitor(&mut self.w_hh)?;
        visitor(&mut self.b_ih)?;
        visitor(&mut self.b_hh)?;
        self.head.visit_parameters_mut(visitor)
    }
}
