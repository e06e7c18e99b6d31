use tch::{nn, Kind, Tensor};

use crate::config::ModelConfig;
use crate::error::Result;
use crate::init;

/// Value written into masked-out scores before the softmax. Finite so that a
/// fully masked row degrades to a uniform distribution instead of NaN.
const MASK_FILL: f64 = -1e9;

/// Scaled dot-product attention.
///
/// `query`, `key`, `value`: `[..., seq, d_k]`; `mask` must broadcast to
/// `[..., seq_q, seq_k]` and is true where attending is allowed.
/// Returns the attended values and the attention probabilities.
pub fn attention(
    query: &Tensor,
    key: &Tensor,
    value: &Tensor,
    mask: Option<&Tensor>,
    dropout: f64,
    train: bool,
) -> (Tensor, Tensor) {
    let d_k = query.size().last().copied().unwrap_or(1);
    let scores = query.matmul(&key.transpose(-2, -1)) / (d_k as f64).sqrt();
    let scores = match mask {
        Some(mask) => scores.masked_fill(&mask.logical_not(), MASK_FILL),
        None => scores,
    };
    let p_attn = scores.softmax(-1, Kind::Float).dropout(dropout, train);
    (p_attn.matmul(value), p_attn)
}

#[derive(Debug)]
pub struct MultiHeadedAttention {
    w_q: nn::Linear,
    w_k: nn::Linear,
    w_v: nn::Linear,
    w_o: nn::Linear,
    n_head: i64,
    d_k: i64,
    dropout: f64,
}

impl MultiHeadedAttention {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Result<Self> {
        config.validate()?;
        let d_model = config.d_model;

        Ok(Self {
            w_q: init::linear(vs / "w_q", d_model, d_model),
            w_k: init::linear(vs / "w_k", d_model, d_model),
            w_v: init::linear(vs / "w_v", d_model, d_model),
            w_o: init::linear(vs / "w_o", d_model, d_model),
            n_head: config.n_head,
            d_k: config.head_size(),
            dropout: config.dropout,
        })
    }

    /// query: [batch, seq_q, d_model], key/value: [batch, seq_k, d_model]
    pub fn forward(
        &self,
        query: &Tensor,
        key: &Tensor,
        value: &Tensor,
        mask: Option<&Tensor>,
        train: bool,
    ) -> Tensor {
        self.forward_with_probs(query, key, value, mask, train).0
    }

    /// Same as [`forward`](Self::forward) but also returns the per-head
    /// attention probabilities, `[batch, n_head, seq_q, seq_k]`.
    pub fn forward_with_probs(
        &self,
        query: &Tensor,
        key: &Tensor,
        value: &Tensor,
        mask: Option<&Tensor>,
        train: bool,
    ) -> (Tensor, Tensor) {
        // Same mask for every head.
        let mask = mask.map(|m| m.unsqueeze(1));
        let nbatches = query.size()[0];

        let split_heads = |x: &Tensor, proj: &nn::Linear| {
            x.apply(proj)
                .view([nbatches, -1, self.n_head, self.d_k])
                .transpose(1, 2)
        };
        let q = split_heads(query, &self.w_q);
        let k = split_heads(key, &self.w_k);
        let v = split_heads(value, &self.w_v);

        let (x, p_attn) = attention(&q, &k, &v, mask.as_ref(), self.dropout, train);

        let x = x
            .transpose(1, 2)
            .contiguous()
            .view([nbatches, -1, self.n_head * self.d_k]);
        (x.apply(&self.w_o), p_attn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::subsequent_mask;
    use tch::Device;

    fn small_config() -> ModelConfig {
        ModelConfig {
            d_model: 32,
            n_head: 4,
            d_ff: 64,
            dropout: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn probabilities_sum_to_one_without_mask() {
        tch::manual_seed(0);
        let q = Tensor::randn([2, 5, 8], (Kind::Float, Device::Cpu));
        let k = Tensor::randn([2, 5, 8], (Kind::Float, Device::Cpu));
        let v = Tensor::randn([2, 5, 8], (Kind::Float, Device::Cpu));
        let (out, p) = attention(&q, &k, &v, None, 0.0, false);
        assert_eq!(out.size(), vec![2, 5, 8]);
        let row_sums = p.sum_dim_intlist(Some(&[-1i64][..]), false, Kind::Float);
        let max_err = (row_sums - 1.0).abs().max().double_value(&[]);
        assert!(max_err < 1e-5);
    }

    #[test]
    fn masked_positions_get_no_weight() {
        tch::manual_seed(1);
        let x = Tensor::randn([1, 4, 8], (Kind::Float, Device::Cpu));
        let mask = subsequent_mask(4, Device::Cpu);
        let (_, p) = attention(&x, &x, &x, Some(&mask), 0.0, false);
        assert!(p.double_value(&[0, 0, 1]) < 1e-6);
        assert!(p.double_value(&[0, 2, 3]) < 1e-6);
        assert!((p.double_value(&[0, 0, 0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn fully_masked_rows_stay_finite() {
        let x = Tensor::randn([1, 3, 8], (Kind::Float, Device::Cpu));
        let mask = Tensor::zeros([1, 3, 3], (Kind::Bool, Device::Cpu));
        let (out, p) = attention(&x, &x, &x, Some(&mask), 0.0, false);
        assert!(!bool::try_from(out.isnan().any()).unwrap());
        assert!((p.double_value(&[0, 1, 2]) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn multi_head_preserves_shape() {
        tch::manual_seed(2);
        let vs = nn::VarStore::new(Device::Cpu);
        let config = small_config();
        let mha = MultiHeadedAttention::new(&(vs.root() / "attn"), &config).unwrap();
        let x = Tensor::randn([3, 7, 32], (Kind::Float, Device::Cpu));
        let (out, p) = mha.forward_with_probs(&x, &x, &x, None, false);
        assert_eq!(out.size(), vec![3, 7, 32]);
        assert_eq!(p.size(), vec![3, 4, 7, 7]);
    }

    #[test]
    fn cross_attention_follows_query_length() {
        let vs = nn::VarStore::new(Device::Cpu);
        let mha = MultiHeadedAttention::new(&vs.root(), &small_config()).unwrap();
        let q = Tensor::randn([2, 3, 32], (Kind::Float, Device::Cpu));
        let memory = Tensor::randn([2, 9, 32], (Kind::Float, Device::Cpu));
        let src_mask = Tensor::ones([2, 1, 9], (Kind::Bool, Device::Cpu));
        let out = mha.forward(&q, &memory, &memory, Some(&src_mask), false);
        assert_eq!(out.size(), vec![2, 3, 32]);
    }

    #[test]
    fn rejects_indivisible_head_count() {
        let vs = nn::VarStore::new(Device::Cpu);
        let config = ModelConfig {
            d_model: 30,
            n_head: 4,
            ..Default::default()
        };
        assert!(MultiHeadedAttention::new(&vs.root(), &config).is_err());
    }
}
