use tch::{Device, Kind, Tensor};

/// `[1, size, size]` lower-triangular mask: position `i` may attend to `0..=i`.
pub fn subsequent_mask(size: i64, device: Device) -> Tensor {
    Tensor::ones([size, size], (Kind::Bool, device))
        .tril(0)
        .unsqueeze(0)
}

/// `[batch, 1, len]` mask that is true wherever the token is not padding.
pub fn padding_mask(tokens: &Tensor, pad: i64) -> Tensor {
    tokens.ne(pad).unsqueeze(-2)
}

/// Hides both padding and future positions: `[batch, len, len]`.
pub fn make_std_mask(tgt: &Tensor, pad: i64) -> Tensor {
    let len = tgt.size().last().copied().unwrap_or(0);
    padding_mask(tgt, pad).logical_and(&subsequent_mask(len, tgt.device()))
}
