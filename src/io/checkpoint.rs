//! Single-file model checkpoints.
//!
//! A checkpoint is a safetensors file holding every parameter under its
//! name in the parameter store, plus a `u8` tensor with a JSON header that
//! describes the architecture and the vocabularies.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::preprocessing::Preprocessor;

pub const HEADER_KEY: &str = "__abltagger_header__";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub format_version: u32,
    pub config: ModelConfig,
    pub preprocessor: Preprocessor,
}

impl Header {
    pub fn new(config: ModelConfig, preprocessor: Preprocessor) -> Self {
        Header {
            format_version: FORMAT_VERSION,
            config,
            preprocessor,
        }
    }
}

fn lock_error<T>(_: T) -> Error {
    Error::Checkpoint("parameter store is poisoned".to_string())
}

pub fn save<P: AsRef<Path>>(path: P, varmap: &VarMap, header: &Header) -> Result<()> {
    let mut tensors: HashMap<String, Tensor> = varmap
        .data()
        .lock()
        .map_err(lock_error)?
        .iter()
        .map(|(name, var)| (name.clone(), var.as_tensor().clone()))
        .collect();
    let bytes = serde_json::to_vec(header)?;
    let len = bytes.len();
    tensors.insert(
        HEADER_KEY.to_string(),
        Tensor::from_vec(bytes, len, &Device::Cpu)?,
    );
    candle_core::safetensors::save(&tensors, path)?;
    Ok(())
}

/// Reads the header and every stored parameter onto `device`.
pub fn load<P: AsRef<Path>>(path: P, device: &Device) -> Result<(Header, HashMap<String, Tensor>)> {
    let mut tensors = candle_core::safetensors::load(path, device)?;
    let header = tensors
        .remove(HEADER_KEY)
        .ok_or_else(|| Error::Checkpoint("no header found".to_string()))?;
    let bytes = header.to_vec1::<u8>()?;
    let header: Header = serde_json::from_slice(&bytes)
        .map_err(|e| Error::Checkpoint(format!("malformed header: {}", e)))?;
    if header.format_version != FORMAT_VERSION {
        return Err(Error::Checkpoint(format!(
            "unsupported format version {}",
            header.format_version
        )));
    }
    Ok((header, tensors))
}

/// Overwrites every parameter of `varmap` with its stored value. The stored
/// names and shapes must match the built model exactly.
pub fn restore(varmap: &VarMap, tensors: &HashMap<String, Tensor>) -> Result<()> {
    let data = varmap.data().lock().map_err(lock_error)?;
    let expected: BTreeSet<&String> = data.keys().collect();
    let found: BTreeSet<&String> = tensors.keys().collect();
    if let Some(name) = expected.difference(&found).next() {
        return Err(Error::Checkpoint(format!("missing tensor `{}`", name)));
    }
    if let Some(name) = found.difference(&expected).next() {
        return Err(Error::Checkpoint(format!("unexpected tensor `{}`", name)));
    }
    for (name, var) in data.iter() {
        let value = &tensors[name];
        if value.shape() != var.shape() {
            return Err(Error::Checkpoint(format!(
                "tensor `{}` has shape {:?}, the model expects {:?}",
                name,
                value.shape(),
                var.shape()
            )));
        }
        var.set(&value.to_dtype(var.dtype())?)?;
    }
    Ok(())
}

/// Replaces the value of one parameter, e.g. with pretrained vectors.
pub fn set_param(varmap: &VarMap, name: &str, value: &Tensor) -> Result<()> {
    let data = varmap.data().lock().map_err(lock_error)?;
    let var = data
        .get(name)
        .ok_or_else(|| Error::Checkpoint(format!("no parameter `{}`", name)))?;
    if value.shape() != var.shape() {
        return Err(Error::Config(format!(
            "`{}` expects shape {:?}, got {:?}",
            name,
            var.shape(),
            value.shape()
        )));
    }
    var.set(value)?;
    Ok(())
}
