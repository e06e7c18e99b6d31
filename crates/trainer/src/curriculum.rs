//! Range-widening curriculum. Outer epoch `e` samples operands below `10^e`
//! and runs two phases on them: a support phase over `0..10^e` and a query
//! phase over `10^(e-1)..10^e`, each with its own train/eval iterations and
//! checkpoints.

use anyhow::{Context, Result};
use log::info;
use rand::Rng;

use crate::dataset::{dataset_range, items_range_generate};
use crate::train::Trainer;
use crate::CurriculumConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Support,
    Query,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Support => "support",
            Phase::Query => "query",
        }
    }
}

fn power_of_ten(exp: u32) -> Result<i64> {
    10i64
        .checked_pow(exp)
        .with_context(|| format!("operand range 10^{} overflows", exp))
}

/// Operand lists of outer epoch `outer`: `count` draws per side from
/// `0..10^outer`.
pub(crate) fn phase_operands<R: Rng>(
    outer: u32,
    count: usize,
    rng: &mut R,
) -> Result<(Vec<i64>, Vec<i64>)> {
    let upper = power_of_ten(outer)?;
    let x_items = items_range_generate(0, upper, Some(count), rng);
    let y_items = items_range_generate(0, upper, Some(count), rng);
    Ok((x_items, y_items))
}

impl Trainer {
    /// Trains through every outer epoch of `curriculum`, then restores the
    /// best checkpoint (see [`Trainer::finish`]).
    pub fn meta_learn(&mut self, curriculum: &CurriculumConfig) -> Result<String> {
        for outer in curriculum.outer_epochs.clone() {
            info!("Start epoch {}", outer);
            self.run_phase(curriculum, outer, Phase::Support)?;
            self.run_phase(curriculum, outer, Phase::Query)?;
        }
        self.finish()
    }

    fn run_phase(&mut self, curriculum: &CurriculumConfig, outer: u32, phase: Phase) -> Result<()> {
        let upper = power_of_ten(outer)?;
        let lower = match phase {
            Phase::Support => 0,
            Phase::Query => power_of_ten(outer.saturating_sub(1))?,
        };
        // The support phase evaluates over the same sampled operands; only
        // the nominal range differs.
        let (eval_start, eval_end, eval_skip) = match phase {
            Phase::Support => (1, 100, curriculum.support_eval_skip),
            Phase::Query => (lower, upper, curriculum.query_eval_skip),
        };

        let (x_items, y_items) = phase_operands(outer, curriculum.range_count, &mut self.rng)?;
        let batch_size = self.config().batch_size;
        let device = self.device();

        for inner in 1..=curriculum.inner_iterations {
            info!("{} epoch {}/{}", phase.name(), outer, inner);
            let data = dataset_range(lower, upper, batch_size)
                .items(x_items.clone(), y_items.clone())
                .batches(self.fork_rng()?, device);
            self.train_epoch(data)?;

            let data = dataset_range(eval_start, eval_end, batch_size)
                .skip(eval_skip)
                .items(x_items.clone(), y_items.clone())
                .batches(self.fork_rng()?, device);
            let loss = self.eval_epoch(data)?;
            info!(
                "{} epoch {}/{}'s evaluation loss {:.6}",
                phase.name(),
                outer,
                inner,
                loss
            );
            self.save_checkpoint(&format!("{}-{}-{}", outer, inner, phase.name()), loss)?;
        }
        Ok(())
    }
}
