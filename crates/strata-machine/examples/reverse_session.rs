// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of StrataTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Trains an LSTM controller over a stack to echo a short symbol sequence in
//! reverse, then prints the instruction trace of the trained controller.
//!
//! The session has two phases: during the first half the controller sees
//! one-hot symbols and is trained to stay silent (zero targets), during the
//! second half it sees zero inputs and must emit the symbols in reverse.

use strata_config::tracing::init_tracing;
use strata_machine::{ExperimentConfig, MachineResult, Tensor, Trainer};
use strata_nn::MeanSquaredError;

fn main() -> MachineResult<()> {
    let _ = init_tracing();

    let mut config = ExperimentConfig::reverse_lstm();
    config.seed = Some(7);
    config.hidden_size = 12;
    config.batch_size = 8;
    config.epochs = 60;

    let sequence_len = 4;
    let mut inputs = Vec::with_capacity(sequence_len);
    for step in 0..sequence_len {
        inputs.push(Tensor::from_fn(
            config.batch_size,
            config.input_size,
            |row, col| {
                let symbol = (row + step) % config.input_size;
                if col == symbol {
                    1.0
                } else {
                    0.0
                }
            },
        )?);
    }
    let mut targets = Vec::with_capacity(2 * sequence_len);
    for _ in 0..sequence_len {
        targets.push(Tensor::zeros(config.batch_size, config.output_size)?);
    }
    for step in 0..sequence_len {
        targets.push(inputs[sequence_len - 1 - step].clone());
    }

    let mut controller = config.build_controller()?;
    let trainer = Trainer::from_config(&config)?;
    let mut loss = MeanSquaredError::new();
    let history = trainer.run(&mut controller, &mut loss, &inputs, &targets)?;
    if let (Some(first), Some(last)) = (history.first(), history.last()) {
        tracing::info!(
            initial_loss = first.loss,
            final_loss = last.loss,
            "training finished"
        );
    }

    let mut replay = Vec::with_capacity(2 * sequence_len);
    for input in &inputs {
        replay.push(Tensor::from_vec(
            1,
            config.input_size,
            input.row(0)?.to_vec(),
        )?);
    }
    for _ in 0..sequence_len {
        replay.push(Tensor::zeros(1, config.input_size)?);
    }
    let matrix = controller.trace(replay)?;

    println!("instruction trace for lane 0 (columns are timesteps)");
    let labels = ["pop ", "push"];
    for row in 0..matrix.shape().0 {
        let label = labels
            .get(row)
            .map(|text| text.to_string())
            .unwrap_or_else(|| format!("v[{}]", row - 2));
        let cells: Vec<String> = matrix
            .row(row)?
            .iter()
            .map(|value| format!("{value:+.3}"))
            .collect();
        println!("{label}  {}", cells.join("  "));
    }
    Ok(())
}
