use tch::{Kind, Tensor};

use calc_core::{make_std_mask, EncoderDecoder};

/// Greedy autoregressive decoding.
///
/// Encodes `src` once, then extends a sequence that starts with
/// `start_symbol` by the arg-max token `max_len - 1` times. There is no early
/// stop on the end symbol. Returns `[batch, max_len]` token ids.
pub fn greedy_decode(
    model: &EncoderDecoder,
    src: &Tensor,
    src_mask: &Tensor,
    max_len: i64,
    start_symbol: i64,
    pad: i64,
) -> Tensor {
    let _guard = tch::no_grad_guard();
    let batch = src.size()[0];
    let memory = model.encode(src, src_mask, false);
    let mut ys = Tensor::full([batch, 1], start_symbol, (Kind::Int64, src.device()));
    for _ in 0..max_len.max(1) - 1 {
        let ys_mask = make_std_mask(&ys, pad);
        let out = model.decode(&memory, src_mask, &ys, &ys_mask, false);
        let prob = model.generator.forward(&out.select(1, -1));
        let next_word = prob.argmax(-1, true);
        ys = Tensor::cat(&[ys, next_word], 1);
    }
    ys
}

#[cfg(test)]
mod tests {
    use super::*;
    use calc_core::{padding_mask, ModelConfig};
    use tch::{nn, Device};

    fn model(vs: &nn::VarStore) -> EncoderDecoder {
        let config = ModelConfig {
            src_vocab: 11,
            tgt_vocab: 11,
            n_layer: 1,
            d_model: 16,
            d_ff: 32,
            n_head: 2,
            dropout: 0.1,
            max_len: 64,
            layer_norm_epsilon: 1e-6,
        };
        EncoderDecoder::new(&vs.root(), &config).unwrap()
    }

    #[test]
    fn length_and_start_symbol() {
        tch::manual_seed(0);
        let vs = nn::VarStore::new(Device::Cpu);
        let model = model(&vs);
        let src = Tensor::from_slice(&[1i64, 2, 3, 4, 5]).view([1, 5]);
        let mask = padding_mask(&src, 0);

        let ys = greedy_decode(&model, &src, &mask, 7, 1, 0);
        assert_eq!(ys.size(), vec![1, 7]);
        assert_eq!(ys.int64_value(&[0, 0]), 1);
        assert_eq!(ys.kind(), Kind::Int64);

        let single = greedy_decode(&model, &src, &mask, 1, 1, 0);
        assert_eq!(single.size(), vec![1, 1]);
    }

    #[test]
    fn decoding_is_deterministic() {
        tch::manual_seed(1);
        let vs = nn::VarStore::new(Device::Cpu);
        let model = model(&vs);
        let src = Tensor::from_slice(&[1i64, 7, 7, 3, 0, 0]).view([1, 6]);
        let mask = padding_mask(&src, 0);

        // dropout is configured but must not apply while decoding
        let a = greedy_decode(&model, &src, &mask, 8, 1, 0);
        let b = greedy_decode(&model, &src, &mask, 8, 1, 0);
        assert!(a.equal(&b));
        assert!(!a.requires_grad());
    }
}
