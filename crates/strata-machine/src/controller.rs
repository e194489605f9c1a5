// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of StrataTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! The controller couples a control network to a differentiable memory and
//! drives both through a session of timesteps.
//!
//! A session starts with `init_session`, advances one timestep per `step`
//! call, and surrenders task outputs through `pop_output`. During training
//! the backward sweep walks the recorded steps in reverse, handing each
//! step's read gradient from the network back to the memory and the memory's
//! instruction gradients back to the network.

use crate::error::{MachineError, MachineResult};
use crate::network::ControlNetwork;
use crate::structure::{Discipline, NeuralStruct};
use crate::trace::InstructionLog;
use std::collections::{HashMap, VecDeque};
use strata_nn::Parameter;
use strata_tensor::{PureResult, Tensor, TensorError};

pub struct Controller {
    network: Box<dyn ControlNetwork>,
    structure: NeuralStruct,
    buffer_in: Vec<Tensor>,
    buffer_out: VecDeque<Tensor>,
    read: Option<Tensor>,
    zero_input: Option<Tensor>,
    batch_size: usize,
    steps: usize,
    training: bool,
    log: Option<InstructionLog>,
}

impl Controller {
    /// Couples `network` to a fresh memory of the given discipline. The
    /// memory's cell width is taken from the network's read size.
    pub fn new(network: Box<dyn ControlNetwork>, discipline: Discipline) -> MachineResult<Self> {
        let structure = NeuralStruct::new(network.read_size(), discipline)?;
        Ok(Self {
            network,
            structure,
            buffer_in: Vec::new(),
            buffer_out: VecDeque::new(),
            read: None,
            zero_input: None,
            batch_size: 0,
            steps: 0,
            training: true,
            log: None,
        })
    }

    /// Begins a session: installs the input sequence, clears the memory and
    /// the network state, and seeds the first read with zeros.
    ///
    /// Every input must be a `(batch_size, input_size)` tensor. The sequence
    /// may be shorter than the number of steps eventually taken; steps past
    /// its end feed the network a zero input.
    pub fn init_session(&mut self, batch_size: usize, inputs: Vec<Tensor>) -> MachineResult<()> {
        let expected = (batch_size, self.network.input_size());
        for input in &inputs {
            if input.shape() != expected {
                return Err(MachineError::Tensor(TensorError::ShapeMismatch {
                    left: input.shape(),
                    right: expected,
                }));
            }
        }
        self.structure.reset(batch_size)?;
        self.network.reset_session(batch_size)?;
        self.read = Some(Tensor::zeros(batch_size, self.network.read_size())?);
        self.zero_input = Some(Tensor::zeros(batch_size, self.network.input_size())?);
        self.buffer_in = inputs;
        self.buffer_out.clear();
        self.batch_size = batch_size;
        self.steps = 0;
        self.log = None;
        Ok(())
    }

    /// Advances the session by one timestep.
    ///
    /// The network sees the next buffered input (or zeros once the sequence
    /// is exhausted) together with the previous read. Its instruction is
    /// recorded into the active log before the memory consumes it, and its
    /// task output is queued for `pop_output`.
    pub fn step(&mut self) -> MachineResult<()> {
        let read = self.read.clone().ok_or(MachineError::UninitializedSession)?;
        let input = match self.buffer_in.get(self.steps) {
            Some(input) => input.clone(),
            None => self
                .zero_input
                .clone()
                .ok_or(MachineError::UninitializedSession)?,
        };
        let decision = self.network.forward(&input, &read)?;
        if let Some(log) = self.log.as_mut() {
            log.record(&decision.instruction)?;
        }
        let next_read = self.structure.update(
            &decision.instruction.value,
            &decision.instruction.pop,
            &decision.instruction.push,
        )?;
        self.read = Some(next_read);
        self.buffer_out.push_back(decision.output);
        self.steps += 1;
        Ok(())
    }

    /// Removes and returns the oldest unconsumed task output.
    pub fn pop_output(&mut self) -> Option<Tensor> {
        self.buffer_out.pop_front()
    }

    /// Starts recording instructions; replaces any previous log.
    pub fn start_log(&mut self, capacity: usize) {
        self.log = Some(InstructionLog::new(capacity, self.network.read_size()));
    }

    /// Stops recording and hands the log over, if one was started.
    pub fn take_log(&mut self) -> Option<InstructionLog> {
        self.log.take()
    }

    /// Runs a fresh single-lane evaluation session over `inputs` and returns
    /// the recorded instruction matrix, one column per step.
    pub fn trace(&mut self, inputs: Vec<Tensor>) -> MachineResult<Tensor> {
        if inputs.is_empty() {
            return Err(MachineError::Tensor(TensorError::EmptyInput(
                "Controller::trace",
            )));
        }
        let steps = inputs.len();
        self.set_training(false);
        self.init_session(1, inputs)?;
        self.start_log(steps);
        let mut outcome = Ok(());
        for _ in 0..steps {
            if let Err(error) = self.step() {
                outcome = Err(error);
                break;
            }
        }
        let log = self.take_log();
        outcome?;
        let log = log.ok_or(MachineError::MissingCache {
            label: "instruction log",
        })?;
        Ok(log.into_matrix()?)
    }

    /// Backpropagates through every step of the session, newest first.
    ///
    /// `output_grads[t]` is the loss gradient with respect to the output of
    /// step `t`, so the slice must contain exactly one tensor per step taken.
    /// The read gradient threads backwards between the memory and the
    /// network; gradients with respect to the buffered inputs are discarded.
    pub fn backward(&mut self, output_grads: &[Tensor]) -> MachineResult<()> {
        if self.batch_size == 0 {
            return Err(MachineError::UninitializedSession);
        }
        if !self.training {
            return Err(MachineError::MissingCache {
                label: "training session",
            });
        }
        if output_grads.len() != self.steps {
            return Err(MachineError::GradientCount {
                expected: self.steps,
                got: output_grads.len(),
            });
        }
        let mut read_grad = Tensor::zeros(self.batch_size, self.network.read_size())?;
        for grad_output in output_grads.iter().rev() {
            let instruction_grad = self.structure.backward_step(&read_grad)?;
            let (_, grad_read) = self.network.backward(grad_output, &instruction_grad)?;
            read_grad = grad_read;
        }
        Ok(())
    }

    /// Applies one SGD step to every parameter and clears the accumulators.
    pub fn apply_step(&mut self, learning_rate: f32) -> MachineResult<()> {
        if learning_rate <= 0.0 {
            return Err(MachineError::Tensor(TensorError::NonPositiveLearningRate {
                rate: learning_rate,
            }));
        }
        self.network
            .visit_parameters_mut(&mut |param| param.apply_step(learning_rate))?;
        Ok(())
    }

    /// Drops accumulated gradients without applying them.
    pub fn zero_accumulators(&mut self) -> MachineResult<()> {
        self.network.visit_parameters_mut(&mut |param| {
            param.zero_gradient();
            Ok(())
        })?;
        Ok(())
    }

    /// Visits every network parameter, e.g. for optimiser bookkeeping or
    /// gradient inspection.
    pub fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> MachineResult<()> {
        Ok(self.network.visit_parameters(visitor)?)
    }

    /// Mutable counterpart of [`Controller::visit_parameters`].
    pub fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> MachineResult<()> {
        Ok(self.network.visit_parameters_mut(visitor)?)
    }

    /// Captures every network parameter keyed by its canonical name.
    pub fn state_dict(&self) -> MachineResult<HashMap<String, Tensor>> {
        Ok(self.network.state_dict()?)
    }

    /// Restores network parameters from a state dictionary.
    pub fn load_state_dict(&mut self, state: &HashMap<String, Tensor>) -> MachineResult<()> {
        Ok(self.network.load_state_dict(state)?)
    }

    /// Switches training mode for the controller, its memory, and its network.
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
        self.structure.set_training(training);
        self.network.set_training(training);
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn input_size(&self) -> usize {
        self.network.input_size()
    }

    pub fn read_size(&self) -> usize {
        self.network.read_size()
    }

    pub fn output_size(&self) -> usize {
        self.network.output_size()
    }

    /// Steps taken in the current session.
    pub fn steps_taken(&self) -> usize {
        self.steps
    }

    /// Outputs produced but not yet popped.
    pub fn pending_outputs(&self) -> usize {
        self.buffer_out.len()
    }

    /// Read-only view of the underlying memory.
    pub fn structure(&self) -> &NeuralStruct {
        &self.structure
    }
}
