use tch::nn;

/// Glorot/Xavier uniform bound `sqrt(6 / (fan_in + fan_out))`.
pub fn xavier_uniform(fan_in: i64, fan_out: i64) -> nn::Init {
    let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
    nn::Init::Uniform {
        lo: -bound,
        up: bound,
    }
}

pub fn linear_config(fan_in: i64, fan_out: i64) -> nn::LinearConfig {
    nn::LinearConfig {
        ws_init: xavier_uniform(fan_in, fan_out),
        ..Default::default()
    }
}

pub fn linear(vs: nn::Path, fan_in: i64, fan_out: i64) -> nn::Linear {
    nn::linear(vs, fan_in, fan_out, linear_config(fan_in, fan_out))
}
