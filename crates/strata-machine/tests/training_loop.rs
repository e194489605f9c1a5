// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of StrataTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! End-to-end training behaviour: losses improve, gradients reach every
//! parameter, and seeded runs reproduce exactly.

use strata_machine::{ExperimentConfig, MachineError, NetworkKind, Tensor, Trainer};
use strata_nn::{Loss, MeanSquaredError};

fn one_hot_sequence(batch: usize, width: usize, len: usize) -> Vec<Tensor> {
    (0..len)
        .map(|step| {
            Tensor::from_fn(batch, width, |row, col| {
                if col == (row + step) % width {
                    1.0
                } else {
                    0.0
                }
            })
            .unwrap()
        })
        .collect()
}

/// Inputs for the first half of the session, reversed inputs as targets for
/// the second half, zero targets while the controller is still reading.
fn reversal_data(config: &ExperimentConfig, len: usize) -> (Vec<Tensor>, Vec<Tensor>) {
    let inputs = one_hot_sequence(config.batch_size, config.input_size, len);
    let blank = Tensor::zeros(config.batch_size, config.output_size).unwrap();
    let mut targets = vec![blank; len];
    for step in 0..len {
        targets.push(inputs[len - 1 - step].clone());
    }
    (inputs, targets)
}

#[test]
fn linear_network_fits_a_constant_target() {
    let mut config = ExperimentConfig::default();
    config.network = NetworkKind::Linear;
    config.seed = Some(3);
    config.batch_size = 4;
    config.learning_rate = 0.1;
    config.epochs = 60;

    let mut controller = config.build_controller().unwrap();
    let trainer = Trainer::from_config(&config).unwrap();
    let mut loss = MeanSquaredError::new();

    let inputs = one_hot_sequence(config.batch_size, config.input_size, 3);
    let constant = Tensor::from_fn(config.batch_size, config.output_size, |_, _| 0.25).unwrap();
    let targets = vec![constant; 3];

    let history = trainer
        .run(&mut controller, &mut loss, &inputs, &targets)
        .unwrap();
    assert_eq!(history.len(), config.epochs);
    let first = history.first().unwrap().loss;
    let last = history.last().unwrap().loss;
    assert!(last.is_finite());
    assert!(last < first, "loss should improve: {first} -> {last}");
}

#[test]
fn rnn_controller_improves_on_the_reversal_task() {
    let mut config = ExperimentConfig::reverse_rnn();
    config.seed = Some(11);
    config.hidden_size = 8;
    config.batch_size = 4;
    config.epochs = 30;
    config.learning_rate = 0.05;

    let mut controller = config.build_controller().unwrap();
    let trainer = Trainer::from_config(&config).unwrap();
    let mut loss = MeanSquaredError::new();
    let (inputs, targets) = reversal_data(&config, 2);

    let history = trainer
        .run(&mut controller, &mut loss, &inputs, &targets)
        .unwrap();
    assert_eq!(history.len(), config.epochs);
    let first = history.first().unwrap().loss;
    let last = history.last().unwrap().loss;
    assert!(last < first, "loss should improve: {first} -> {last}");
}

#[test]
fn every_parameter_receives_a_gradient() {
    let mut config = ExperimentConfig::reverse_lstm();
    config.seed = Some(13);
    config.hidden_size = 6;
    config.batch_size = 2;

    let mut controller = config.build_controller().unwrap();
    let mut loss = MeanSquaredError::new();
    let (inputs, targets) = reversal_data(&config, 2);

    controller.set_training(true);
    controller
        .init_session(config.batch_size, inputs)
        .unwrap();
    let mut output_grads = Vec::new();
    for target in &targets {
        controller.step().unwrap();
        let output = controller.pop_output().unwrap();
        output_grads.push(loss.backward(&output, target).unwrap());
    }
    controller.backward(&output_grads).unwrap();

    let mut visited = 0;
    controller
        .visit_parameters(&mut |param| {
            assert!(
                param.accumulator_norm_sq() > 0.0,
                "{} received no gradient",
                param.name()
            );
            visited += 1;
            Ok(())
        })
        .unwrap();
    // w_ih, w_hh, b_ih, b_hh plus the head's weight and bias.
    assert_eq!(visited, 6);
}

#[test]
fn seeded_training_runs_are_bitwise_reproducible() {
    let run = || -> Vec<f32> {
        let mut config = ExperimentConfig::reverse_lstm();
        config.seed = Some(29);
        config.hidden_size = 5;
        config.batch_size = 3;
        config.epochs = 8;

        let mut controller = config.build_controller().unwrap();
        let trainer = Trainer::from_config(&config).unwrap();
        let mut loss = MeanSquaredError::new();
        let (inputs, targets) = reversal_data(&config, 2);
        trainer
            .run(&mut controller, &mut loss, &inputs, &targets)
            .unwrap()
            .into_iter()
            .map(|stats| stats.loss)
            .collect()
    };
    assert_eq!(run(), run());
}

#[test]
fn trainer_surfaces_controller_errors() {
    let config = ExperimentConfig::reverse_rnn();
    let mut controller = config.build_controller().unwrap();
    let trainer = Trainer::new(0.05, 2).unwrap();
    let mut loss = MeanSquaredError::new();

    // Targets of the wrong width make the per-step loss fail.
    let inputs = one_hot_sequence(config.batch_size, config.input_size, 1);
    let bad_targets = vec![Tensor::zeros(config.batch_size, config.output_size + 1).unwrap()];
    let outcome = trainer.train_sequence(&mut controller, &mut loss, &inputs, &bad_targets, 0);
    assert!(matches!(outcome, Err(MachineError::Tensor(_))));
}
