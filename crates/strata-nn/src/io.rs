// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of StrataTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Persistence helpers for parameter state dictionaries. JSON snapshots stay
//! human-inspectable; bincode keeps checkpoints compact.

use crate::module::Module;
use crate::{PureResult, Tensor, TensorError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredTensor {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ModuleSnapshot {
    parameters: HashMap<String, StoredTensor>,
}

impl ModuleSnapshot {
    fn from_state(state: &HashMap<String, Tensor>) -> ModuleSnapshot {
        let parameters = state
            .iter()
            .map(|(name, tensor)| {
                let stored = StoredTensor {
                    rows: tensor.shape().0,
                    cols: tensor.shape().1,
                    data: tensor.data().to_vec(),
                };
                (name.clone(), stored)
            })
            .collect();
        ModuleSnapshot { parameters }
    }

    fn into_state(self) -> PureResult<HashMap<String, Tensor>> {
        let mut state = HashMap::new();
        for (name, stored) in self.parameters.into_iter() {
            let tensor = Tensor::from_vec(stored.rows, stored.cols, stored.data)?;
            state.insert(name, tensor);
        }
        Ok(state)
    }
}

fn io_error(err: std::io::Error) -> TensorError {
    TensorError::IoError {
        message: err.to_string(),
    }
}

fn serde_error(err: impl ToString) -> TensorError {
    TensorError::SerializationError {
        message: err.to_string(),
    }
}

/// Persists a state dictionary as pretty-printed JSON.
pub fn save_state_dict_json<P: AsRef<Path>>(
    state: &HashMap<String, Tensor>,
    path: P,
) -> PureResult<()> {
    let snapshot = ModuleSnapshot::from_state(state);
    let file = File::create(path.as_ref()).map_err(io_error)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &snapshot).map_err(serde_error)?;
    Ok(())
}

/// Restores a state dictionary persisted by [`save_state_dict_json`].
pub fn load_state_dict_json<P: AsRef<Path>>(path: P) -> PureResult<HashMap<String, Tensor>> {
    let file = File::open(path.as_ref()).map_err(io_error)?;
    let reader = BufReader::new(file);
    let snapshot: ModuleSnapshot = serde_json::from_reader(reader).map_err(serde_error)?;
    snapshot.into_state()
}

/// Persists a state dictionary with bincode.
pub fn save_state_dict_bincode<P: AsRef<Path>>(
    state: &HashMap<String, Tensor>,
    path: P,
) -> PureResult<()> {
    let snapshot = ModuleSnapshot::from_state(state);
    let file = File::create(path.as_ref()).map_err(io_error)?;
    let writer = BufWriter::new(file);
    bincode::serialize_into(writer, &snapshot).map_err(serde_error)?;
    Ok(())
}

/// Restores a state dictionary persisted by [`save_state_dict_bincode`].
pub fn load_state_dict_bincode<P: AsRef<Path>>(path: P) -> PureResult<HashMap<String, Tensor>> {
    let file = File::open(path.as_ref()).map_err(io_error)?;
    let reader = BufReader::new(file);
    let snapshot: ModuleSnapshot = bincode::deserialize_from(reader).map_err(serde_error)?;
    snapshot.into_state()
}

/// Persists every parameter of a module as pretty-printed JSON.
pub fn save_json<M: Module + ?Sized, P: AsRef<Path>>(module: &M, path: P) -> PureResult<()> {
    save_state_dict_json(&module.state_dict()?, path)
}

/// Restores module parameters from a JSON snapshot.
pub fn load_json<M: Module + ?Sized, P: AsRef<Path>>(module: &mut M, path: P) -> PureResult<()> {
    let state = load_state_dict_json(path)?;
    module.load_state_dict(&state)
}

/// Persists every parameter of a module with bincode.
pub fn save_bincode<M: Module + ?Sized, P: AsRef<Path>>(module: &M, path: P) -> PureResult<()> {
    save_state_dict_bincode(&module.state_dict()?, path)
}

/// Restores module parameters from a bincode snapshot.
pub fn load_bincode<M: Module + ?Sized, P: AsRef<Path>>(
    module: &mut M,
    path: P,
) -> PureResult<()> {
    let state = load_state_dict_bincode(path)?;
    module.load_state_dict(&state)
}
