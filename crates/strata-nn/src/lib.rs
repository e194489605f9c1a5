//! High-level neural module API built on top of StrataTorch primitives.
//!
//! This crate offers a lightweight `nn.Module` style surface that keeps the
//! stack entirely in Rust: parameters carry their own gradient accumulators
//! and every layer implements an explicit backward pass.

pub mod io;
pub mod layers;
pub mod loss;
pub mod module;

pub use io::{
    load_bincode, load_json, load_state_dict_bincode, load_state_dict_json, save_bincode,
    save_json, save_state_dict_bincode, save_state_dict_json,
};
pub use layers::linear::Linear;
pub use loss::{Loss, MeanSquaredError};
pub use module::{Module, Parameter};

pub use strata_tensor::{PureResult, Tensor, TensorError};
