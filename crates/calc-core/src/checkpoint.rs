//! Parameter snapshots as safetensors payloads.
//!
//! Every variable of a [`nn::VarStore`] is written as little-endian f32 under
//! its dotted path name. Writes are plain overwrites of the target file.

use memmap2::MmapOptions;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::fs::File;
use std::path::Path;
use tch::{nn, Device, Kind, Tensor};

use crate::error::{ModelError, Result};

pub fn save<P: AsRef<Path>>(vs: &nn::VarStore, path: P) -> Result<()> {
    let mut variables: Vec<(String, Tensor)> = vs.variables().into_iter().collect();
    variables.sort_by(|a, b| a.0.cmp(&b.0));

    let mut buffers = Vec::with_capacity(variables.len());
    for (name, var) in variables {
        let tensor = var
            .detach()
            .to_device(Device::Cpu)
            .to_kind(Kind::Float)
            .contiguous();
        let shape: Vec<usize> = tensor.size().iter().map(|&d| d as usize).collect();
        let values = Vec::<f32>::try_from(tensor.flatten(0, -1))?;
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        buffers.push((name, shape, bytes));
    }

    let views = buffers
        .iter()
        .map(|(name, shape, bytes)| {
            TensorView::new(Dtype::F32, shape.clone(), bytes).map(|view| (name.as_str(), view))
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    safetensors::serialize_to_file(views, &None, path.as_ref())?;
    Ok(())
}

/// Copies every tensor of the file into the variable with the same name.
/// Returns the number of variables that were restored.
pub fn load<P: AsRef<Path>>(vs: &nn::VarStore, path: P) -> Result<usize> {
    let file = File::open(path)?;
    let buffer = unsafe { MmapOptions::new().map(&file)? };
    let tensors = SafeTensors::deserialize(&buffer)?;

    let mut variables = vs.variables();
    let device = vs.device();
    let mut restored = 0;

    for (name, view) in tensors.tensors() {
        let Some(var) = variables.get_mut(&name) else {
            continue;
        };
        let shape: Vec<i64> = view.shape().iter().map(|&x| x as i64).collect();
        let kind = match view.dtype() {
            Dtype::F32 => Kind::Float,
            Dtype::F16 => Kind::Half,
            Dtype::BF16 => Kind::BFloat16,
            other => return Err(ModelError::UnsupportedDtype(format!("{:?}", other))),
        };

        let value = Tensor::from_data_size(view.data(), &shape, kind)
            .to_kind(var.kind())
            .to_device(device);
        tch::no_grad(|| var.f_copy_(&value))?;
        restored += 1;
    }

    Ok(restored)
}

/// Like [`load`], but a missing file is not an error: the variables keep their
/// current values and `Ok(false)` is returned.
pub fn load_if_exists<P: AsRef<Path>>(vs: &nn::VarStore, path: P) -> Result<bool> {
    if !path.as_ref().is_file() {
        return Ok(false);
    }
    load(vs, path)?;
    Ok(true)
}
