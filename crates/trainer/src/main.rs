use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tch::Device;

use calc_core::ModelConfig;
use inference::{evaluate, Calculator};
use trainer::{train_copy_task, CopyTask, CurriculumConfig, Trainer, TrainerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Train the addition transformer", long_about = None)]
struct Args {
    #[arg(long, default_value = "configs/model_config.yaml")]
    model_config: String,

    #[arg(long, default_value = "configs/training_config.yaml")]
    training_config: String,

    /// Fixed-range training instead of the curriculum
    #[arg(long)]
    plain: bool,

    /// Only run the copy-task demonstration
    #[arg(long)]
    copy_task: bool,
}

fn load_yaml<T: DeserializeOwned>(path: &str) -> Result<Option<T>> {
    if !Path::new(path).exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value =
        serde_yaml::from_str(&content).with_context(|| format!("failed to parse {}", path))?;
    info!("Loaded {}", path);
    Ok(Some(value))
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct TrainingFile {
    trainer: TrainerConfig,
    curriculum: CurriculumConfig,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let device = Device::cuda_if_available();
    info!("Using device: {:?}", device);

    if args.copy_task {
        let report = train_copy_task(&CopyTask::default(), device)?;
        info!("Copy task decoded {:?}", Vec::<i64>::try_from(report.decoded.view([-1]))?);
        return Ok(());
    }

    let mut model_config = load_yaml::<ModelConfig>(&args.model_config)?
        .unwrap_or_else(|| ModelConfig::calculator(tokenizer::VOCAB_SIZE));
    // The alphabet is fixed; both sides always use it.
    model_config.src_vocab = tokenizer::VOCAB_SIZE;
    model_config.tgt_vocab = tokenizer::VOCAB_SIZE;
    let training = load_yaml::<TrainingFile>(&args.training_config)?.unwrap_or_default();

    let mut trainer = Trainer::new(model_config.clone(), training.trainer.clone(), device)?;
    let decoded = if args.plain {
        trainer.train()?
    } else {
        trainer.meta_learn(&training.curriculum)?
    };
    println!("{}", decoded);

    let config = &training.trainer;
    let calculator = Calculator::load(&config.checkpoint_dir, "best", &model_config, device)?;
    for x in config.eval_range.clone() {
        for y in config.eval_range.clone() {
            evaluate(&calculator, x, y)?;
        }
    }

    info!("Training complete!");
    Ok(())
}
