// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of StrataTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Minimal SGD harness for controller experiments.

use crate::config::ExperimentConfig;
use crate::controller::Controller;
use crate::error::{MachineError, MachineResult};
use strata_nn::Loss;
use strata_tensor::{Tensor, TensorError};

/// Loss summary for one epoch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpochStats {
    pub epoch: usize,
    /// Mean per-step loss across the epoch.
    pub loss: f32,
}

/// Trains a controller by full-sequence gradient descent: one backward sweep
/// and one parameter update per epoch.
pub struct Trainer {
    learning_rate: f32,
    epochs: usize,
}

impl Trainer {
    pub fn new(learning_rate: f32, epochs: usize) -> MachineResult<Self> {
        if learning_rate <= 0.0 {
            return Err(MachineError::Tensor(TensorError::NonPositiveLearningRate {
                rate: learning_rate,
            }));
        }
        if epochs == 0 {
            return Err(MachineError::Tensor(TensorError::InvalidValue {
                label: "trainer_epochs",
            }));
        }
        Ok(Self {
            learning_rate,
            epochs,
        })
    }

    pub fn from_config(config: &ExperimentConfig) -> MachineResult<Self> {
        Self::new(config.learning_rate, config.epochs)
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }

    /// One training pass over a sequence: runs a fresh session with one step
    /// per target, accumulates gradients through the whole session, and
    /// applies a single parameter update.
    ///
    /// The batch size is taken from the targets; inputs may be shorter than
    /// the targets, in which case the controller pads with zero inputs.
    pub fn train_sequence<L: Loss>(
        &self,
        controller: &mut Controller,
        loss: &mut L,
        inputs: &[Tensor],
        targets: &[Tensor],
        epoch: usize,
    ) -> MachineResult<EpochStats> {
        if targets.is_empty() {
            return Err(MachineError::Tensor(TensorError::EmptyInput(
                "Trainer::train_sequence",
            )));
        }
        let batch_size = targets[0].shape().0;
        controller.set_training(true);
        controller.init_session(batch_size, inputs.to_vec())?;

        let mut output_grads = Vec::with_capacity(targets.len());
        let mut total = 0.0f32;
        for target in targets {
            controller.step()?;
            let output = controller.pop_output().ok_or(MachineError::MissingCache {
                label: "task output",
            })?;
            total += loss.forward(&output, target)?.data()[0];
            output_grads.push(loss.backward(&output, target)?);
        }
        controller.backward(&output_grads)?;
        controller.apply_step(self.learning_rate)?;

        let stats = EpochStats {
            epoch,
            loss: total / targets.len() as f32,
        };
        tracing::debug!(epoch = stats.epoch, loss = stats.loss, "epoch complete");
        Ok(stats)
    }

    /// Repeats `train_sequence` for the configured number of epochs and
    /// returns the per-epoch loss history.
    pub fn run<L: Loss>(
        &self,
        controller: &mut Controller,
        loss: &mut L,
        inputs: &[Tensor],
        targets: &[Tensor],
    ) -> MachineResult<Vec<EpochStats>> {
        let mut history = Vec::with_capacity(self.epochs);
        for epoch in 0..self.epochs {
            history.push(self.train_sequence(controller, loss, inputs, targets, epoch)?);
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trainer_rejects_degenerate_settings() {
        assert!(matches!(
            Trainer::new(0.0, 10),
            Err(MachineError::Tensor(
                TensorError::NonPositiveLearningRate { .. }
            ))
        ));
        assert!(matches!(
            Trainer::new(0.1, 0),
            Err(MachineError::Tensor(TensorError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn from_config_reads_the_training_knobs() {
        let config = ExperimentConfig::reverse_rnn();
        let trainer = Trainer::from_config(&config).unwrap();
        assert_eq!(trainer.learning_rate(), 0.01);
        assert_eq!(trainer.epochs(), 100);
    }
}
