// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of StrataTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Gradient checks for the continuous stack, driven directly through its
//! update/backward API over a three-step session that exercises every walk
//! regime: a partial pop, a fully consumed cell, a boundary cell, and an
//! exhausted read.

use strata_machine::{Discipline, InstructionGrad, NeuralStruct, Tensor};

// (value, pop, push) per step, one batch lane, one value component.
const STEPS: [(f32, f32, f32); 3] = [(1.0, 0.0, 0.8), (-2.0, 0.3, 0.6), (0.5, 0.45, 0.7)];
// dL/d(read) per step for the scenario loss below.
const READ_GRADS: [f32; 3] = [1.0, -0.7, 0.3];

fn scalar(value: f32) -> Tensor {
    Tensor::from_vec(1, 1, vec![value]).unwrap()
}

fn run_forward(steps: &[(f32, f32, f32)]) -> (NeuralStruct, Vec<f32>) {
    let mut memory = NeuralStruct::new(1, Discipline::Stack).unwrap();
    memory.reset(1).unwrap();
    let mut reads = Vec::new();
    for &(value, pop, push) in steps {
        let read = memory
            .update(&scalar(value), &scalar(pop), &scalar(push))
            .unwrap();
        reads.push(read.data()[0]);
    }
    (memory, reads)
}

fn scenario_loss(steps: &[(f32, f32, f32)]) -> f32 {
    let (_, reads) = run_forward(steps);
    reads
        .iter()
        .zip(READ_GRADS.iter())
        .map(|(read, coefficient)| read * coefficient)
        .sum()
}

fn run_backward(memory: &mut NeuralStruct) -> Vec<InstructionGrad> {
    // Newest step first, matching the order backward_step unwinds them.
    READ_GRADS
        .iter()
        .rev()
        .map(|&grad| memory.backward_step(&scalar(grad)).unwrap())
        .collect()
}

#[test]
fn forward_reads_match_hand_computation() {
    let (_, reads) = run_forward(&STEPS);
    let expected = [0.8, -0.8, 0.2];
    for (read, want) in reads.iter().zip(expected.iter()) {
        assert!((read - want).abs() < 1e-6, "read {read} vs {want}");
    }
}

#[test]
fn analytic_gradients_match_hand_computation() {
    let (mut memory, _) = run_forward(&STEPS);
    let grads = run_backward(&mut memory);

    // grads[0] belongs to the last step, grads[2] to the first.
    let close = |tensor: &Tensor, want: f32| (tensor.data()[0] - want).abs() < 1e-5;

    assert!(close(&grads[0].value, 0.21), "value grad, step 2");
    assert!(close(&grads[0].pop, 0.9), "pop grad, step 2");
    assert!(close(&grads[0].push, -0.15), "push grad, step 2");

    assert!(close(&grads[1].value, -0.375), "value grad, step 1");
    assert!(close(&grads[1].pop, 0.0), "pop grad, step 1");
    assert!(close(&grads[1].push, 1.2), "push grad, step 1");

    assert!(close(&grads[2].value, 0.565), "value grad, step 0");
    assert!(close(&grads[2].pop, 0.0), "pop grad, step 0");
    assert!(close(&grads[2].push, 1.0), "push grad, step 0");
}

#[test]
fn analytic_gradients_match_finite_differences() {
    let (mut memory, _) = run_forward(&STEPS);
    let grads = run_backward(&mut memory);
    let analytic = |step: usize, component: usize| {
        let grad = &grads[STEPS.len() - 1 - step];
        match component {
            0 => grad.value.data()[0],
            1 => grad.pop.data()[0],
            _ => grad.push.data()[0],
        }
    };

    let eps = 1e-3_f32;
    for step in 0..STEPS.len() {
        for component in 0..3 {
            let mut plus = STEPS;
            let mut minus = STEPS;
            let base = match component {
                0 => STEPS[step].0,
                1 => STEPS[step].1,
                _ => STEPS[step].2,
            };
            let apply = |steps: &mut [(f32, f32, f32)], value: f32| match component {
                0 => steps[step].0 = value,
                1 => steps[step].1 = value,
                _ => steps[step].2 = value,
            };
            // Strengths must stay non-negative; fall back to a one-sided
            // difference when the negative shift would be rejected.
            let numeric = if component != 0 && base - eps < 0.0 {
                apply(&mut plus, base + eps);
                (scenario_loss(&plus) - scenario_loss(&STEPS)) / eps
            } else {
                apply(&mut plus, base + eps);
                apply(&mut minus, base - eps);
                (scenario_loss(&plus) - scenario_loss(&minus)) / (2.0 * eps)
            };
            let expected = analytic(step, component);
            assert!(
                (expected - numeric).abs() < 1e-3,
                "step {step} component {component}: analytic {expected} vs numeric {numeric}"
            );
        }
    }
}

#[test]
fn queue_gradients_match_finite_differences() {
    // Same scenario, FIFO order: different walks, same replay machinery.
    let run = |steps: &[(f32, f32, f32)]| -> (NeuralStruct, Vec<f32>) {
        let mut memory = NeuralStruct::new(1, Discipline::Queue).unwrap();
        memory.reset(1).unwrap();
        let mut reads = Vec::new();
        for &(value, pop, push) in steps {
            let read = memory
                .update(&scalar(value), &scalar(pop), &scalar(push))
                .unwrap();
            reads.push(read.data()[0]);
        }
        (memory, reads)
    };
    let loss = |steps: &[(f32, f32, f32)]| -> f32 {
        let (_, reads) = run(steps);
        reads
            .iter()
            .zip(READ_GRADS.iter())
            .map(|(read, coefficient)| read * coefficient)
            .sum()
    };

    let (mut memory, _) = run(&STEPS);
    let grads: Vec<InstructionGrad> = READ_GRADS
        .iter()
        .rev()
        .map(|&grad| memory.backward_step(&scalar(grad)).unwrap())
        .collect();

    let eps = 1e-3_f32;
    for step in 0..STEPS.len() {
        for (component, expected) in [
            (0, grads[STEPS.len() - 1 - step].value.data()[0]),
            (1, grads[STEPS.len() - 1 - step].pop.data()[0]),
            (2, grads[STEPS.len() - 1 - step].push.data()[0]),
        ] {
            let base = match component {
                0 => STEPS[step].0,
                1 => STEPS[step].1,
                _ => STEPS[step].2,
            };
            let apply = |steps: &mut [(f32, f32, f32)], value: f32| match component {
                0 => steps[step].0 = value,
                1 => steps[step].1 = value,
                _ => steps[step].2 = value,
            };
            let mut plus = STEPS;
            let mut minus = STEPS;
            let numeric = if component != 0 && base - eps < 0.0 {
                apply(&mut plus, base + eps);
                (loss(&plus) - loss(&STEPS)) / eps
            } else {
                apply(&mut plus, base + eps);
                apply(&mut minus, base - eps);
                (loss(&plus) - loss(&minus)) / (2.0 * eps)
            };
            assert!(
                (expected - numeric).abs() < 1e-3,
                "step {step} component {component}: analytic {expected} vs numeric {numeric}"
            );
        }
    }
}
