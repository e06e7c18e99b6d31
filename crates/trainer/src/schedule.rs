use crate::optim::Optimizer;

/// Warmup-then-decay learning rate factor:
/// `factor * model_size^-0.5 * min(step^-0.5, step * warmup^-1.5)`.
///
/// Step 0 is treated as step 1.
pub fn rate(step: usize, model_size: i64, factor: f64, warmup: usize) -> f64 {
    let step = step.max(1) as f64;
    let warmup = warmup as f64;
    factor * (model_size as f64).powf(-0.5) * step.powf(-0.5).min(step * warmup.powf(-1.5))
}

pub trait Scheduler {
    /// Advances one step and writes the new learning rate into the optimizer.
    fn step(&mut self, optimizer: &mut dyn Optimizer);
}

/// Learning rate = `base_lr * lr_lambda(step)`, with `base_lr` taken from the
/// optimizer when the scheduler is created.
pub struct LambdaLr {
    base_lr: f64,
    last_step: usize,
    lr_lambda: Box<dyn Fn(usize) -> f64>,
}

impl LambdaLr {
    pub fn new(optimizer: &mut dyn Optimizer, lr_lambda: Box<dyn Fn(usize) -> f64>) -> Self {
        let base_lr = optimizer.lr();
        optimizer.set_lr(base_lr * lr_lambda(0));
        Self {
            base_lr,
            last_step: 0,
            lr_lambda,
        }
    }

    /// The schedule of [`rate`] for a model of width `model_size`.
    pub fn noam(
        optimizer: &mut dyn Optimizer,
        model_size: i64,
        factor: f64,
        warmup: usize,
    ) -> Self {
        Self::new(
            optimizer,
            Box::new(move |step| rate(step, model_size, factor, warmup)),
        )
    }

    pub fn last_step(&self) -> usize {
        self.last_step
    }
}

impl Scheduler for LambdaLr {
    fn step(&mut self, optimizer: &mut dyn Optimizer) {
        self.last_step += 1;
        optimizer.set_lr(self.base_lr * (self.lr_lambda)(self.last_step));
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DummyScheduler;

impl Scheduler for DummyScheduler {
    fn step(&mut self, _optimizer: &mut dyn Optimizer) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        lr: f64,
    }

    impl Optimizer for Recorder {
        fn step(&mut self) {}
        fn zero_grad(&mut self) {}
        fn lr(&self) -> f64 {
            self.lr
        }
        fn set_lr(&mut self, lr: f64) {
            self.lr = lr;
        }
    }

    #[test]
    fn step_zero_is_clamped() {
        for &(size, factor, warmup) in &[(512, 1.0, 4000), (256, 2.0, 400), (32, 1.0, 1)] {
            assert_eq!(rate(0, size, factor, warmup), rate(1, size, factor, warmup));
        }
    }

    #[test]
    fn warms_up_then_decays() {
        let (size, factor, warmup) = (512, 1.0, 400);
        for step in 1..warmup {
            assert!(rate(step + 1, size, factor, warmup) > rate(step, size, factor, warmup));
        }
        for step in warmup + 1..warmup * 10 {
            assert!(rate(step + 1, size, factor, warmup) < rate(step, size, factor, warmup));
        }
        // inverse square root decay after warmup
        let ratio = rate(1600, size, factor, warmup) / rate(6400, size, factor, warmup);
        assert!((ratio - 2.0).abs() < 1e-9);
    }

    #[test]
    fn peak_is_at_warmup() {
        let peak = rate(4000, 512, 1.0, 4000);
        let expected = 512f64.powf(-0.5) * 4000f64.powf(-0.5);
        assert!((peak - expected).abs() < 1e-12);
    }

    #[test]
    fn lambda_scheduler_scales_base_rate() {
        let mut opt = Recorder { lr: 0.5 };
        let mut sched = LambdaLr::noam(&mut opt, 512, 1.0, 400);
        assert!((opt.lr - 0.5 * rate(0, 512, 1.0, 400)).abs() < 1e-15);

        for _ in 0..10 {
            sched.step(&mut opt);
        }
        assert_eq!(sched.last_step(), 10);
        assert!((opt.lr - 0.5 * rate(10, 512, 1.0, 400)).abs() < 1e-15);
    }

    #[test]
    fn dummy_scheduler_leaves_rate_alone() {
        let mut opt = Recorder { lr: 0.25 };
        DummyScheduler.step(&mut opt);
        assert_eq!(opt.lr, 0.25);
    }
}
