use anyhow::Result;
use tch::Tensor;

use calc_core::{padding_mask, EncoderDecoder};
use tokenizer::{encode_problem, from_tokens, PAD, START};

pub mod calculator;
pub mod evaluate;
pub mod greedy;

pub use calculator::Calculator;
pub use evaluate::{evaluate, evaluate_dataset};
pub use greedy::greedy_decode;

/// Extra decoding steps allowed past the source length.
pub const ANSWER_MARGIN: i64 = 10;

/// Greedy answer to one problem string, returned as the raw decoded symbols
/// (leading start symbol included; see [`tokenizer::answer_text`]).
pub fn decode_problem(model: &EncoderDecoder, text: &str, extra_pad: usize) -> Result<String> {
    let tokens = encode_problem(text, extra_pad)?;
    let src = Tensor::from_slice(&tokens)
        .view([1, -1])
        .to_device(model.device());
    let src_mask = padding_mask(&src, PAD);
    let max_len = tokens.len() as i64 + ANSWER_MARGIN;

    let decoded = greedy_decode(model, &src, &src_mask, max_len, START, PAD);
    let ids = Vec::<i64>::try_from(decoded.view([-1]))?;
    Ok(from_tokens(&ids)?)
}
