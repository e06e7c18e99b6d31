use tch::{nn, Kind, Tensor};

#[derive(Debug)]
pub struct LayerNorm {
    a_2: Tensor,
    b_2: Tensor,
    eps: f64,
}

impl LayerNorm {
    pub fn new(vs: &nn::Path, features: i64, eps: f64) -> Self {
        let a_2 = vs.var("a_2", &[features], nn::Init::Const(1.0));
        let b_2 = vs.var("b_2", &[features], nn::Init::Const(0.0));
        Self { a_2, b_2, eps }
    }

    /// `(x - mean) / (std + eps) * a_2 + b_2` over the last axis.
    pub fn forward(&self, x: &Tensor) -> Tensor {
        let mean = x.mean_dim(Some(&[-1i64][..]), true, Kind::Float);
        let std = x.std_dim(Some(&[-1i64][..]), true, true);
        &self.a_2 * (x - mean) / (std + self.eps) + &self.b_2
    }
}

/// Residual connection around a sublayer, with the norm applied to the
/// sublayer input: `x + dropout(sublayer(norm(x)))`.
#[derive(Debug)]
pub struct SublayerConnection {
    norm: LayerNorm,
    dropout: f64,
}

impl SublayerConnection {
    pub fn new(vs: &nn::Path, size: i64, dropout: f64, eps: f64) -> Self {
        Self {
            norm: LayerNorm::new(&(vs / "norm"), size, eps),
            dropout,
        }
    }

    pub fn forward<F>(&self, x: &Tensor, train: bool, sublayer: F) -> Tensor
    where
        F: FnOnce(&Tensor) -> Tensor,
    {
        x + sublayer(&self.norm.forward(x)).dropout(self.dropout, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    #[test]
    fn normalizes_each_position() {
        tch::manual_seed(3);
        let vs = nn::VarStore::new(Device::Cpu);
        let norm = LayerNorm::new(&vs.root(), 16, 1e-6);
        let x = Tensor::randn([2, 5, 16], (Kind::Float, Device::Cpu)) * 4.0 + 3.0;
        let y = norm.forward(&x);

        let mean = y.mean_dim(Some(&[-1i64][..]), false, Kind::Float);
        let std = y.std_dim(Some(&[-1i64][..]), true, false);
        assert!(mean.abs().max().double_value(&[]) < 1e-4);
        assert!((std - 1.0).abs().max().double_value(&[]) < 1e-3);
    }

    #[test]
    fn residual_adds_sublayer_output_to_input() {
        let vs = nn::VarStore::new(Device::Cpu);
        let sublayer = SublayerConnection::new(&vs.root(), 4, 0.0, 1e-6);
        let x = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0]).view([1, 1, 4]);

        // A zero sublayer leaves the input untouched.
        let y = sublayer.forward(&x, false, |h| h.zeros_like());
        assert!((&y - &x).abs().max().double_value(&[]) < 1e-7);

        // The sublayer sees the normalized input, not the raw one.
        let y = sublayer.forward(&x, false, |h| h.shallow_clone());
        let seen = &y - &x;
        assert!(seen.mean(Kind::Float).double_value(&[]).abs() < 1e-5);
    }
}
