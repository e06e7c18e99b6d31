use anyhow::Result;
use tch::nn::{self, OptimizerConfig};

/// What the training loop needs from an optimizer. Evaluation passes a
/// [`DummyOptimizer`] so the same loop runs without touching parameters.
pub trait Optimizer {
    fn step(&mut self);
    fn zero_grad(&mut self);
    /// Current learning rate of the (single) parameter group.
    fn lr(&self) -> f64;
    fn set_lr(&mut self, lr: f64);
}

pub struct Adam {
    inner: nn::Optimizer,
    lr: f64,
}

impl Adam {
    pub fn new(vs: &nn::VarStore, lr: f64, betas: (f64, f64), eps: f64) -> Result<Self> {
        let config = nn::Adam {
            beta1: betas.0,
            beta2: betas.1,
            eps,
            ..Default::default()
        };
        Ok(Self {
            inner: config.build(vs, lr)?,
            lr,
        })
    }
}

impl Optimizer for Adam {
    fn step(&mut self) {
        self.inner.step();
    }

    fn zero_grad(&mut self) {
        self.inner.zero_grad();
    }

    fn lr(&self) -> f64 {
        self.lr
    }

    fn set_lr(&mut self, lr: f64) {
        self.inner.set_lr(lr);
        self.lr = lr;
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DummyOptimizer;

impl Optimizer for DummyOptimizer {
    fn step(&mut self) {}

    fn zero_grad(&mut self) {}

    fn lr(&self) -> f64 {
        0.0
    }

    fn set_lr(&mut self, _lr: f64) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn adam_moves_parameters_and_dummy_does_not() {
        let vs = nn::VarStore::new(Device::Cpu);
        let w = vs.root().var("w", &[3], nn::Init::Const(1.0));
        let mut adam = Adam::new(&vs, 0.1, (0.9, 0.98), 1e-9).unwrap();

        let loss = (&w * &w).sum(Kind::Float);
        loss.backward();
        let mut dummy = DummyOptimizer;
        dummy.step();
        assert!((w.double_value(&[0]) - 1.0).abs() < 1e-9);

        adam.step();
        adam.zero_grad();
        assert!(w.double_value(&[0]) < 1.0);
    }

    #[test]
    fn learning_rate_is_tracked() {
        let vs = nn::VarStore::new(Device::Cpu);
        let _w = vs.root().var("w", &[1], nn::Init::Const(0.0));
        let mut adam = Adam::new(&vs, 0.5, (0.9, 0.98), 1e-9).unwrap();
        assert_eq!(adam.lr(), 0.5);
        adam.set_lr(0.01);
        assert_eq!(adam.lr(), 0.01);
        assert_eq!(DummyOptimizer.lr(), 0.0);
    }
}
