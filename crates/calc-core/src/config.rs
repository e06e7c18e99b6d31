use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ModelError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Size of the source vocabulary.
    pub src_vocab: i64,
    /// Size of the target vocabulary.
    pub tgt_vocab: i64,
    /// Number of layers in each of the encoder and decoder stacks.
    pub n_layer: i64,
    /// Dimension of the embeddings and of every sublayer output.
    pub d_model: i64,
    /// Hidden dimension of the position-wise feed-forward block.
    pub d_ff: i64,
    /// Number of attention heads.
    pub n_head: i64,
    /// Dropout probability for residual, attention and embedding dropout.
    pub dropout: f64,
    /// Number of rows in the precomputed positional encoding table.
    pub max_len: i64,
    /// Added to the standard deviation in layer normalization.
    pub layer_norm_epsilon: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            src_vocab: 11,
            tgt_vocab: 11,
            n_layer: 6,
            d_model: 512,
            d_ff: 2048,
            n_head: 8,
            dropout: 0.1,
            max_len: 5000,
            layer_norm_epsilon: 1e-6,
        }
    }
}

impl ModelConfig {
    /// Default dimensions with the given vocabularies and stack depth.
    pub fn new(src_vocab: i64, tgt_vocab: i64, n_layer: i64) -> Self {
        Self {
            src_vocab,
            tgt_vocab,
            n_layer,
            ..Default::default()
        }
    }

    /// The two-layer model used for the arithmetic task.
    pub fn calculator(vocab_size: i64) -> Self {
        Self::new(vocab_size, vocab_size, 2)
    }

    pub fn head_size(&self) -> i64 {
        self.d_model / self.n_head
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_head <= 0 || self.d_model % self.n_head != 0 {
            return Err(ModelError::HeadMismatch {
                d_model: self.d_model,
                n_head: self.n_head,
            });
        }
        Ok(())
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_size_divides_model_dim() {
        let config = ModelConfig::default();
        assert_eq!(config.head_size(), 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_indivisible_heads() {
        let config = ModelConfig {
            n_head: 7,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ModelError::HeadMismatch { d_model: 512, n_head: 7 })
        ));
    }

    #[test]
    fn json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = ModelConfig::calculator(26);
        config.save_json(&path).unwrap();
        assert_eq!(ModelConfig::load_json(&path).unwrap(), config);
    }
}
