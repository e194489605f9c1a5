// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of StrataTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Process-wide runtime configuration shared by every StrataTorch crate.
//!
//! Determinism is opt-in through `STRATA_DETERMINISTIC`; when enabled every
//! component derives its RNG seed from `STRATA_DETERMINISTIC_SEED` and a
//! stable per-component label, so repeated runs reproduce bit-identical
//! parameter initialisation.

pub mod determinism;
pub mod tracing;

pub use determinism::{
    config, configure, lock_reduction_order, rng_from_label, rng_from_optional, DeterminismConfig,
};
pub use tracing::{init_tracing, InitError};
