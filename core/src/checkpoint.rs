//! Checkpointing and Serialization.
//!
//! Parameters are saved to a single `safetensors` file, `model.safetensors`, inside a
//! checkpoint directory. Shapes are preserved and every tensor is stored as little-endian
//! `f32`, keyed by its full parameter name.

use crate::backend::Backend;
use crate::error::{InceptionError, Result};
use crate::params::ParamStore;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// File name of the parameter file inside a checkpoint directory.
pub const CHECKPOINT_FILE: &str = "model.safetensors";

/// A tensor copied to the host, as stored in a checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Writes `tensors` to a safetensors file at `path`.
pub fn save_tensors<P: AsRef<Path>>(path: P, tensors: &[(String, StoredTensor)]) -> Result<()> {
    let bytes: Vec<Vec<u8>> = tensors
        .iter()
        .map(|(_, t)| t.data.iter().flat_map(|v| v.to_le_bytes()).collect())
        .collect();

    let mut views = Vec::with_capacity(tensors.len());
    for ((name, tensor), data) in tensors.iter().zip(&bytes) {
        let view = TensorView::new(Dtype::F32, tensor.shape.clone(), data)
            .map_err(|e| InceptionError::Checkpoint(format!("{name}: {e}")))?;
        views.push((name.as_str(), view));
    }

    let metadata: Option<HashMap<String, String>> = None;
    safetensors::serialize_to_file(views, metadata, path.as_ref())
        .map_err(|e| InceptionError::Checkpoint(format!("failed to save checkpoint: {e}")))?;
    Ok(())
}

/// Reads every tensor of a safetensors file.
///
/// # Errors
///
/// `Checkpoint` if the file is not valid safetensors or holds anything but `f32`.
pub fn load_tensors<P: AsRef<Path>>(path: P) -> Result<HashMap<String, StoredTensor>> {
    let file_content = std::fs::read(path)?;
    let safetensors = SafeTensors::deserialize(&file_content)
        .map_err(|e| InceptionError::Checkpoint(format!("failed to deserialize safetensors: {e}")))?;

    let mut tensors = HashMap::new();
    for (name, view) in safetensors.tensors() {
        if view.dtype() != Dtype::F32 {
            return Err(InceptionError::Checkpoint(format!(
                "{name}: expected F32, found {:?}",
                view.dtype()
            )));
        }
        let data: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let shape = view.shape().to_vec();
        if data.len() != shape.iter().product::<usize>() {
            return Err(InceptionError::Checkpoint(format!(
                "{name}: {} values for shape {shape:?}",
                data.len()
            )));
        }
        tensors.insert(name, StoredTensor { shape, data });
    }

    Ok(tensors)
}

/// Saves all parameters of `store` into `dir/model.safetensors`, creating `dir` if needed.
pub fn save_checkpoint<B: Backend, P: AsRef<Path>>(
    dir: P,
    backend: &B,
    store: &ParamStore<B>,
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let path = dir.join(CHECKPOINT_FILE);
    let tensors = store.export(backend)?;
    save_tensors(&path, &tensors)?;
    info!(path = %path.display(), tensors = tensors.len(), "checkpoint saved");
    Ok(path)
}

/// Loads the parameters saved by [`save_checkpoint`] from `dir`.
pub fn load_checkpoint<P: AsRef<Path>>(dir: P) -> Result<HashMap<String, StoredTensor>> {
    let path = dir.as_ref().join(CHECKPOINT_FILE);
    let tensors = load_tensors(&path)?;
    info!(path = %path.display(), tensors = tensors.len(), "checkpoint loaded");
    Ok(tensors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensors_keep_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.safetensors");
        let tensors = vec![
            (
                "conv-weight".to_string(),
                StoredTensor {
                    shape: vec![2, 1, 1, 3],
                    data: vec![1.0, -2.0, 3.5, 0.0, 0.25, 6.0],
                },
            ),
            (
                "conv-bias".to_string(),
                StoredTensor { shape: vec![2], data: vec![0.5, -0.5] },
            ),
        ];
        save_tensors(&path, &tensors).unwrap();

        let loaded = load_tensors(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["conv-weight"], tensors[0].1);
        assert_eq!(loaded["conv-bias"], tensors[1].1);
    }

    #[test]
    fn test_missing_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_checkpoint(dir.path()), Err(InceptionError::Io(_))));

        let path = dir.path().join(CHECKPOINT_FILE);
        std::fs::write(&path, b"not a checkpoint").unwrap();
        assert!(matches!(load_checkpoint(dir.path()), Err(InceptionError::Checkpoint(_))));
    }
}
