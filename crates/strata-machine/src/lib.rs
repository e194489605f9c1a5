// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of StrataTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Differentiable stack and queue memories driven by neural controllers.
//!
//! A [`Controller`] couples a [`ControlNetwork`] to a [`NeuralStruct`]: each
//! timestep the network reads the task input plus the previous memory read
//! and emits a task output together with a `(value, pop, push)` instruction
//! the memory executes. Both halves record per-step caches during training
//! and replay them in reverse for exact gradients; no tape or autograd is
//! involved.
//!
//! ```no_run
//! use strata_machine::{ExperimentConfig, Tensor, Trainer};
//! use strata_nn::MeanSquaredError;
//!
//! # fn main() -> strata_machine::MachineResult<()> {
//! let config = ExperimentConfig::reverse_lstm();
//! let mut controller = config.build_controller()?;
//! let trainer = Trainer::from_config(&config)?;
//! let inputs = vec![Tensor::random_uniform(config.batch_size, config.input_size, 0.0, 1.0, Some(1))?];
//! let targets = vec![Tensor::random_uniform(config.batch_size, config.output_size, 0.0, 1.0, Some(2))?];
//! let history = trainer.run(&mut controller, &mut MeanSquaredError::new(), &inputs, &targets)?;
//! # let _ = history;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod network;
pub mod recurrent;
pub mod structure;
pub mod trace;
pub mod trainer;

pub use config::{ExperimentConfig, NetworkKind};
pub use controller::Controller;
pub use error::{MachineError, MachineResult};
pub use network::{ControlDecision, ControlNetwork, LinearControlNetwork};
pub use recurrent::{LstmControlNetwork, RnnControlNetwork};
pub use structure::{Discipline, InstructionGrad, NeuralStruct, StructInstruction};
pub use trace::InstructionLog;
pub use trainer::{EpochStats, Trainer};

pub use strata_tensor::{PureResult, Tensor, TensorError};
