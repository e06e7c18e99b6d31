use tch::{nn, Device, Tensor};

use crate::init::xavier_uniform;

/// Token lookup table scaled by `sqrt(d_model)`.
#[derive(Debug)]
pub struct Embeddings {
    lut: nn::Embedding,
    d_model: i64,
}

impl Embeddings {
    pub fn new(vs: &nn::Path, vocab: i64, d_model: i64) -> Self {
        let config = nn::EmbeddingConfig {
            ws_init: xavier_uniform(d_model, vocab),
            ..Default::default()
        };
        let lut = nn::embedding(vs / "lut", vocab, d_model, config);
        Self { lut, d_model }
    }

    /// tokens: [batch, seq] (Int64) -> [batch, seq, d_model]
    pub fn forward(&self, tokens: &Tensor) -> Tensor {
        tokens.apply(&self.lut) * (self.d_model as f64).sqrt()
    }

    pub fn d_model(&self) -> i64 {
        self.d_model
    }
}

/// Fixed sinusoidal position signal, `[1, max_len, d_model]`.
///
/// Not a trainable variable: it lives outside the var store and is not part of
/// checkpoints.
#[derive(Debug)]
pub struct PositionalEncoding {
    pe: Tensor,
    dropout: f64,
}

impl PositionalEncoding {
    pub fn new(d_model: i64, dropout: f64, max_len: i64, device: Device) -> Self {
        let width = d_model as usize;
        let mut table = vec![0f32; max_len as usize * width];
        for pos in 0..max_len as usize {
            let row = &mut table[pos * width..(pos + 1) * width];
            for i in (0..width).step_by(2) {
                // sin(pos / 10000^(2i/d_model)) on even dims, cos on odd dims
                let angle = pos as f64 / 10000f64.powf(i as f64 / d_model as f64);
                row[i] = angle.sin() as f32;
                if i + 1 < width {
                    row[i + 1] = angle.cos() as f32;
                }
            }
        }
        let pe = Tensor::from_slice(&table)
            .view([1, max_len, d_model])
            .to(device);

        Self { pe, dropout }
    }

    /// x: [batch, seq, d_model]
    pub fn forward_t(&self, x: &Tensor, train: bool) -> Tensor {
        let seq_len = x.size()[1];
        (x + self.pe.narrow(1, 0, seq_len)).dropout(self.dropout, train)
    }

    pub fn table(&self) -> &Tensor {
        &self.pe
    }
}

/// Embedding followed by positional encoding; one per side of the model.
#[derive(Debug)]
pub struct Embedder {
    tokens: Embeddings,
    position: PositionalEncoding,
}

impl Embedder {
    pub fn new(vs: &nn::Path, vocab: i64, d_model: i64, dropout: f64, max_len: i64) -> Self {
        Self {
            tokens: Embeddings::new(vs, vocab, d_model),
            position: PositionalEncoding::new(d_model, dropout, max_len, vs.device()),
        }
    }

    pub fn forward_t(&self, tokens: &Tensor, train: bool) -> Tensor {
        self.position.forward_t(&self.tokens.forward(tokens), train)
    }

    pub fn d_model(&self) -> i64 {
        self.tokens.d_model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    #[test]
    fn positional_table_matches_formula() {
        let pe = PositionalEncoding::new(8, 0.0, 20, Device::Cpu);
        let table = pe.table();
        assert_eq!(table.size(), vec![1, 20, 8]);

        assert!(table.double_value(&[0, 0, 0]).abs() < 1e-7);
        assert!((table.double_value(&[0, 0, 1]) - 1.0).abs() < 1e-7);

        let pos = 3.0f64;
        let angle = pos / 10000f64.powf(4.0 / 8.0);
        assert!((table.double_value(&[0, 3, 4]) - angle.sin()).abs() < 1e-6);
        assert!((table.double_value(&[0, 3, 5]) - angle.cos()).abs() < 1e-6);
    }

    #[test]
    fn encoding_is_truncated_to_sequence_length() {
        let pe = PositionalEncoding::new(8, 0.0, 50, Device::Cpu);
        let x = Tensor::zeros([2, 6, 8], (Kind::Float, Device::Cpu));
        let y = pe.forward_t(&x, false);
        assert_eq!(y.size(), vec![2, 6, 8]);
        let expected = pe.table().narrow(1, 0, 6);
        assert!((y.get(1) - expected.get(0)).abs().max().double_value(&[]) < 1e-7);
    }

    #[test]
    fn embeddings_are_scaled() {
        let vs = nn::VarStore::new(Device::Cpu);
        let emb = Embeddings::new(&vs.root(), 10, 16);
        let tokens = Tensor::from_slice(&[3i64]).view([1, 1]);
        let out = emb.forward(&tokens);
        let raw = tokens.apply(&emb.lut);
        let ratio = (out / raw).mean(Kind::Float).double_value(&[]);
        assert!((ratio - 4.0).abs() < 1e-5);
    }
}
