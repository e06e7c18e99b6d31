use anyhow::{bail, ensure, Context, Result};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tch::{nn, Device, Tensor};

use calc_core::{checkpoint, EncoderDecoder, ModelConfig};
use tokenizer::PAD;

use crate::batch::Batch;
use crate::dataset::{data_gen, dataset_range};
use crate::loss::{LabelSmoothing, SimpleLossCompute};
use crate::optim::{Adam, DummyOptimizer, Optimizer};
use crate::schedule::{DummyScheduler, LambdaLr, Scheduler};
use crate::TrainerConfig;

const LOG_INTERVAL: usize = 40;

/// Counters of one training run. Owned by the caller and threaded through
/// every [`run_epoch`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrainState {
    /// Batches back-propagated.
    pub step: usize,
    /// Optimizer steps taken.
    pub accum_step: usize,
    pub samples: i64,
    pub tokens: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    TrainLog,
    Eval,
}

impl Mode {
    pub fn is_training(self) -> bool {
        matches!(self, Mode::Train | Mode::TrainLog)
    }
}

/// Runs the model over every batch of `data` and returns the loss per token.
///
/// In training modes each batch is back-propagated, the optimizer steps every
/// `accum_iter` batches (gradients of the batches in between are summed) and
/// the scheduler advances once per batch. In [`Mode::Eval`] no gradients are
/// recorded and nothing is updated.
#[allow(clippy::too_many_arguments)]
pub fn run_epoch<I>(
    data: I,
    model: &EncoderDecoder,
    loss_compute: &SimpleLossCompute,
    optimizer: &mut dyn Optimizer,
    scheduler: &mut dyn Scheduler,
    mode: Mode,
    accum_iter: usize,
    state: &mut TrainState,
) -> Result<f64>
where
    I: IntoIterator<Item = Result<Batch>>,
{
    let training = mode.is_training();
    let _guard = (!training).then(tch::no_grad_guard);
    let accum_iter = accum_iter.max(1);

    let mut start = Instant::now();
    let mut total_loss = 0.0;
    let mut total_tokens = 0i64;
    let mut tokens = 0i64;
    let mut n_accum = 0usize;

    for (i, batch) in data.into_iter().enumerate() {
        let batch = batch?;
        let target = batch.target().context("batch has no target sequence")?;
        let out = model.forward_t(
            batch.src(),
            &target.tgt,
            batch.src_mask(),
            &target.tgt_mask,
            training,
        );
        let (loss, loss_node) = loss_compute.compute(&out, &target.tgt_y, target.ntokens)?;

        if training {
            loss_node.backward();
            state.step += 1;
            state.samples += batch.len();
            state.tokens += target.ntokens;
            if i % accum_iter == 0 {
                optimizer.step();
                optimizer.zero_grad();
                n_accum += 1;
                state.accum_step += 1;
            }
            scheduler.step(optimizer);
        }

        total_loss += loss;
        total_tokens += target.ntokens;
        tokens += target.ntokens;

        if training && i % LOG_INTERVAL == 1 {
            let elapsed = start.elapsed().as_secs_f64().max(f64::EPSILON);
            info!(
                "Epoch Step: {:6} | Accumulation Step: {:3} | Loss: {:6.6} | Tokens / Sec: {:7.1} | Learning Rate: {:6.1e}",
                i,
                n_accum,
                loss / target.ntokens.max(1) as f64,
                tokens as f64 / elapsed,
                optimizer.lr()
            );
            start = Instant::now();
            tokens = 0;
        }
    }

    ensure!(total_tokens > 0, "epoch produced no target tokens");
    Ok(total_loss / total_tokens as f64)
}

/// Addition trainer: model, criterion, optimizer with its rate schedule, and
/// the checkpoints written so far.
pub struct Trainer {
    config: TrainerConfig,
    vs: nn::VarStore,
    model: EncoderDecoder,
    criterion: LabelSmoothing,
    optimizer: Adam,
    scheduler: LambdaLr,
    state: TrainState,
    device: Device,
    pub(crate) rng: StdRng,
    best: Option<(f64, PathBuf)>,
}

impl Trainer {
    /// Builds the model, resumes from `{checkpoint_dir}/{resume_tag}.pt` when
    /// that file exists and writes `config.json` next to the checkpoints.
    pub fn new(model_config: ModelConfig, config: TrainerConfig, device: Device) -> Result<Self> {
        let vs = nn::VarStore::new(device);
        let model = EncoderDecoder::new(&vs.root(), &model_config)?;

        let dir = PathBuf::from(&config.checkpoint_dir);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create checkpoint dir {:?}", dir))?;
        let resume = dir.join(format!("{}.pt", config.resume_tag));
        if checkpoint::load_if_exists(&vs, &resume)? {
            info!("Resumed from {:?}", resume);
        } else {
            warn!("No checkpoint at {:?}, starting from random weights", resume);
        }
        model_config.save_json(dir.join("config.json"))?;

        let criterion = LabelSmoothing::new(model_config.tgt_vocab, PAD, config.smoothing)?;
        let mut optimizer = Adam::new(&vs, config.learning_rate, config.betas, config.eps)?;
        let scheduler =
            LambdaLr::noam(&mut optimizer, model.d_model(), config.factor, config.warmup);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            config,
            vs,
            model,
            criterion,
            optimizer,
            scheduler,
            state: TrainState::default(),
            device,
            rng,
            best: None,
        })
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn model(&self) -> &EncoderDecoder {
        &self.model
    }

    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    pub fn state(&self) -> &TrainState {
        &self.state
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Lowest evaluation loss so far and the checkpoint holding it.
    pub fn best(&self) -> Option<(f64, &Path)> {
        self.best.as_ref().map(|(loss, path)| (*loss, path.as_path()))
    }

    pub fn checkpoint_path(&self, name: &str) -> PathBuf {
        Path::new(&self.config.checkpoint_dir).join(format!("{}.pt", name))
    }

    /// Independent generator for one dataset pass.
    pub(crate) fn fork_rng(&mut self) -> Result<StdRng> {
        Ok(StdRng::from_rng(&mut self.rng)?)
    }

    pub fn train_epoch<I>(&mut self, data: I) -> Result<f64>
    where
        I: IntoIterator<Item = Result<Batch>>,
    {
        let loss_compute = SimpleLossCompute::new(&self.model.generator, &self.criterion);
        run_epoch(
            data,
            &self.model,
            &loss_compute,
            &mut self.optimizer,
            &mut self.scheduler,
            Mode::Train,
            self.config.accum_iter,
            &mut self.state,
        )
    }

    pub fn eval_epoch<I>(&mut self, data: I) -> Result<f64>
    where
        I: IntoIterator<Item = Result<Batch>>,
    {
        let loss_compute = SimpleLossCompute::new(&self.model.generator, &self.criterion);
        run_epoch(
            data,
            &self.model,
            &loss_compute,
            &mut DummyOptimizer,
            &mut DummyScheduler,
            Mode::Eval,
            1,
            &mut self.state,
        )
    }

    /// Saves `{name}.pt` and remembers it when `loss` is the best so far.
    pub fn save_checkpoint(&mut self, name: &str, loss: f64) -> Result<PathBuf> {
        let path = self.checkpoint_path(name);
        checkpoint::save(&self.vs, &path)
            .with_context(|| format!("failed to save checkpoint {:?}", path))?;
        if self.best.as_ref().map_or(true, |(best, _)| loss < *best) {
            self.best = Some((loss, path.clone()));
        }
        Ok(path)
    }

    /// Restores the best checkpoint, copies it to `best.pt` and decodes the
    /// demo problem with it.
    pub fn finish(&mut self) -> Result<String> {
        let Some((loss, best_path)) = self.best.clone() else {
            bail!("no checkpoint was written");
        };
        info!("Best evaluation loss {:.6} at {:?}", loss, best_path);
        checkpoint::load(&self.vs, &best_path)?;
        let best_copy = self.checkpoint_path("best");
        fs::copy(&best_path, &best_copy)
            .with_context(|| format!("failed to copy {:?} to {:?}", best_path, best_copy))?;

        let decoded = inference::decode_problem(&self.model, &self.config.demo_problem, 0)?;
        info!("{} => {}", self.config.demo_problem, decoded);
        Ok(decoded)
    }

    /// Fixed-range training: every epoch trains on all pairs of `1..100`,
    /// evaluates on a sample of them and saves `{epoch}.pt`.
    pub fn train(&mut self) -> Result<String> {
        let batch_size = self.config.batch_size;
        for epoch in self.config.epochs.clone() {
            info!("Epoch {}", epoch);
            let data = dataset_range(1, 100, batch_size).batches(self.fork_rng()?, self.device);
            self.train_epoch(data)?;

            info!("Start evaluation {}", epoch);
            let data = dataset_range(1, 100, batch_size)
                .skip(self.config.eval_skip)
                .batches(self.fork_rng()?, self.device);
            let loss = self.eval_epoch(data)?;
            info!("Epoch {}'s evaluation loss {:.6}", epoch, loss);
            self.save_checkpoint(&epoch.to_string(), loss)?;
        }
        self.finish()
    }
}

/// Copy-task run: the model learns to reproduce random token sequences.
#[derive(Debug, Clone)]
pub struct CopyTask {
    pub model: ModelConfig,
    pub batch_size: i64,
    pub train_batches: usize,
    pub eval_batches: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub warmup: usize,
}

impl Default for CopyTask {
    fn default() -> Self {
        Self {
            model: ModelConfig::new(11, 11, 2),
            batch_size: 80,
            train_batches: 20,
            eval_batches: 5,
            epochs: 20,
            learning_rate: 0.5,
            warmup: 400,
        }
    }
}

#[derive(Debug)]
pub struct CopyTaskReport {
    /// Training loss per token of each epoch.
    pub train_losses: Vec<f64>,
    /// Evaluation loss after each epoch.
    pub eval_losses: Vec<f64>,
    pub state: TrainState,
    /// Greedy decoding of `1..=10`, shape `[1, 10]`.
    pub decoded: Tensor,
}

pub fn train_copy_task(task: &CopyTask, device: Device) -> Result<CopyTaskReport> {
    let vocab = task.model.src_vocab;
    let vs = nn::VarStore::new(device);
    let model = EncoderDecoder::new(&vs.root(), &task.model)?;
    let criterion = LabelSmoothing::new(task.model.tgt_vocab, PAD, 0.0)?;
    let mut optimizer = Adam::new(&vs, task.learning_rate, (0.9, 0.98), 1e-9)?;
    let mut scheduler = LambdaLr::noam(&mut optimizer, model.d_model(), 1.0, task.warmup);
    let loss_compute = SimpleLossCompute::new(&model.generator, &criterion);

    let mut state = TrainState::default();
    let mut train_losses = Vec::with_capacity(task.epochs);
    let mut eval_losses = Vec::with_capacity(task.epochs);
    for epoch in 0..task.epochs {
        let train_loss = run_epoch(
            data_gen(vocab, task.batch_size, task.train_batches, device),
            &model,
            &loss_compute,
            &mut optimizer,
            &mut scheduler,
            Mode::Train,
            1,
            &mut state,
        )?;
        train_losses.push(train_loss);
        let loss = run_epoch(
            data_gen(vocab, task.batch_size, task.eval_batches, device),
            &model,
            &loss_compute,
            &mut DummyOptimizer,
            &mut DummyScheduler,
            Mode::Eval,
            1,
            &mut state,
        )?;
        info!(
            "Copy task epoch {} train loss {:.6}, evaluation loss {:.6}",
            epoch, train_loss, loss
        );
        eval_losses.push(loss);
    }

    let len = 10.min(vocab - 1);
    let src = Tensor::arange_start(1, len + 1, (tch::Kind::Int64, device)).unsqueeze(0);
    let src_mask = calc_core::padding_mask(&src, PAD);
    let decoded = inference::greedy_decode(&model, &src, &src_mask, len, 1, PAD);

    Ok(CopyTaskReport {
        train_losses,
        eval_losses,
        state,
        decoded,
    })
}
