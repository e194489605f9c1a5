// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of StrataTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Experiment configuration: which network drives which memory, and with
//! what training knobs. Configs serialise to JSON so experiments can be
//! checked in and replayed.

use crate::controller::Controller;
use crate::error::MachineResult;
use crate::network::{ControlNetwork, LinearControlNetwork};
use crate::recurrent::{LstmControlNetwork, RnnControlNetwork};
use crate::structure::Discipline;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use strata_tensor::TensorError;

/// Which control network architecture to instantiate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkKind {
    Linear,
    Rnn,
    Lstm,
}

/// Full description of one experiment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Width of the task input vectors.
    pub input_size: usize,
    /// Width of memory cells and reads.
    pub read_size: usize,
    /// Width of the task outputs.
    pub output_size: usize,
    /// Hidden width for the recurrent networks; ignored by `Linear`.
    pub hidden_size: usize,
    /// Memory traversal order.
    pub discipline: Discipline,
    /// Control network architecture.
    pub network: NetworkKind,
    /// SGD learning rate.
    pub learning_rate: f32,
    /// Number of passes over the training data.
    pub epochs: usize,
    /// Batch lanes per session.
    pub batch_size: usize,
    /// Base seed for parameter initialisation; `None` defers to the
    /// process-wide determinism config.
    pub seed: Option<u64>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            input_size: 2,
            read_size: 2,
            output_size: 2,
            hidden_size: 16,
            discipline: Discipline::Stack,
            network: NetworkKind::Lstm,
            learning_rate: 0.01,
            epochs: 100,
            batch_size: 10,
            seed: None,
        }
    }
}

impl ExperimentConfig {
    /// The string-reversal experiment driven by a tanh RNN over a stack.
    pub fn reverse_rnn() -> Self {
        Self {
            network: NetworkKind::Rnn,
            ..Self::default()
        }
    }

    /// The string-reversal experiment driven by an LSTM over a stack.
    pub fn reverse_lstm() -> Self {
        Self {
            network: NetworkKind::Lstm,
            ..Self::default()
        }
    }

    /// Instantiates the configured control network.
    pub fn build_network(&self) -> MachineResult<Box<dyn ControlNetwork>> {
        let network: Box<dyn ControlNetwork> = match self.network {
            NetworkKind::Linear => Box::new(LinearControlNetwork::new(
                self.input_size,
                self.read_size,
                self.output_size,
                self.seed,
            )?),
            NetworkKind::Rnn => Box::new(RnnControlNetwork::new(
                self.input_size,
                self.read_size,
                self.output_size,
                self.hidden_size,
                self.seed,
            )?),
            NetworkKind::Lstm => Box::new(LstmControlNetwork::new(
                self.input_size,
                self.read_size,
                self.output_size,
                self.hidden_size,
                self.seed,
            )?),
        };
        Ok(network)
    }

    /// Wires the configured network to a memory of the configured discipline.
    pub fn build_controller(&self) -> MachineResult<Controller> {
        Controller::new(self.build_network()?, self.discipline)
    }

    /// Reads a config from a JSON file.
    pub fn load_json(path: impl AsRef<Path>) -> MachineResult<Self> {
        let text = fs::read_to_string(path).map_err(|error| TensorError::IoError {
            message: error.to_string(),
        })?;
        let config =
            serde_json::from_str(&text).map_err(|error| TensorError::SerializationError {
                message: error.to_string(),
            })?;
        Ok(config)
    }

    /// Writes the config to a JSON file, pretty-printed.
    pub fn save_json(&self, path: impl AsRef<Path>) -> MachineResult<()> {
        let text =
            serde_json::to_string_pretty(self).map_err(|error| TensorError::SerializationError {
                message: error.to_string(),
            })?;
        fs::write(path, text).map_err(|error| TensorError::IoError {
            message: error.to_string(),
        })?;
        Ok(())
    }
}
