use anyhow::{Context, Result};
use std::path::Path;
use tch::{nn, Device};
use tracing::{info, warn};

use calc_core::{checkpoint, EncoderDecoder, ModelConfig};

use crate::decode_problem;

/// A model restored from a checkpoint, ready to answer problems.
pub struct Calculator {
    vs: nn::VarStore,
    model: EncoderDecoder,
}

impl Calculator {
    /// Randomly initialized model.
    pub fn new(config: &ModelConfig, device: Device) -> Result<Self> {
        let vs = nn::VarStore::new(device);
        let model = EncoderDecoder::new(&vs.root(), config)?;
        Ok(Self { vs, model })
    }

    /// Loads `{dir}/{tag}.pt`. A missing file leaves the weights random.
    pub fn load<P: AsRef<Path>>(
        dir: P,
        tag: &str,
        config: &ModelConfig,
        device: Device,
    ) -> Result<Self> {
        let calculator = Self::new(config, device)?;
        let path = dir.as_ref().join(format!("{}.pt", tag));
        if checkpoint::load_if_exists(&calculator.vs, &path)
            .with_context(|| format!("failed to load checkpoint {:?}", path))?
        {
            info!(?path, "loaded checkpoint");
        } else {
            warn!(?path, "checkpoint not found, using random weights");
        }
        Ok(calculator)
    }

    pub fn model(&self) -> &EncoderDecoder {
        &self.model
    }

    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    /// Decoded token string for `text`, e.g. `"123+877="`.
    pub fn solve(&self, text: &str) -> Result<String> {
        self.solve_padded(text, 0)
    }

    /// Like [`Calculator::solve`] with `extra_pad` pad tokens after the problem.
    pub fn solve_padded(&self, text: &str, extra_pad: usize) -> Result<String> {
        decode_problem(&self.model, text, extra_pad)
    }
}
