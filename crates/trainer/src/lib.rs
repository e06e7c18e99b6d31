pub mod batch;
pub mod curriculum;
pub mod dataset;
pub mod loss;
pub mod optim;
pub mod schedule;
pub mod train;

pub use batch::{Batch, Target};
pub use loss::{LabelSmoothing, SimpleLossCompute};
pub use optim::{Adam, DummyOptimizer, Optimizer};
pub use schedule::{rate, DummyScheduler, LambdaLr, Scheduler};
pub use train::{run_epoch, train_copy_task, CopyTask, Mode, TrainState, Trainer};

use serde::{Deserialize, Serialize};
use std::ops::Range;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub batch_size: usize,
    /// Base learning rate; the schedule multiplies it every step.
    pub learning_rate: f64,
    pub betas: (f64, f64),
    pub eps: f64,
    pub warmup: usize,
    pub factor: f64,
    pub smoothing: f64,
    pub accum_iter: usize,
    pub checkpoint_dir: String,
    /// Epoch indices of the plain trainer; they also name its checkpoints.
    pub epochs: Range<usize>,
    /// Probability of dropping a pair from the evaluation set.
    pub eval_skip: f64,
    /// Checkpoint loaded before training, `{checkpoint_dir}/{resume_tag}.pt`.
    pub resume_tag: String,
    /// Operand range of the evaluation grid run after training.
    pub eval_range: Range<i64>,
    pub demo_problem: String,
    /// Seeds operand sampling; drawn from entropy when absent.
    pub seed: Option<u64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            batch_size: 80,
            learning_rate: 0.5,
            betas: (0.9, 0.98),
            eps: 1e-9,
            warmup: 400,
            factor: 1.0,
            smoothing: 0.0,
            accum_iter: 1,
            checkpoint_dir: "./models4".to_string(),
            epochs: 359..1000,
            eval_skip: 0.8,
            resume_tag: "999".to_string(),
            eval_range: 1000..1010,
            demo_problem: "10000+1001".to_string(),
            seed: None,
        }
    }
}

/// Counts of the range-widening curriculum. Outer epoch `e` samples operands
/// below `10^e`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CurriculumConfig {
    pub outer_epochs: Range<u32>,
    pub inner_iterations: usize,
    /// Operands sampled per side for each phase.
    pub range_count: usize,
    pub support_eval_skip: f64,
    pub query_eval_skip: f64,
}

impl Default for CurriculumConfig {
    fn default() -> Self {
        Self {
            outer_epochs: 1..10,
            inner_iterations: 99,
            range_count: 200,
            support_eval_skip: 0.8,
            query_eval_skip: 0.2,
        }
    }
}
