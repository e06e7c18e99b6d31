use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tch::Device;

use calc_core::ModelConfig;
use inference::{evaluate, evaluate_dataset, Calculator};

#[derive(Parser, Debug)]
#[command(author, version, about = "Query a trained addition transformer", long_about = None)]
struct Args {
    /// Directory holding the checkpoints and config.json
    #[arg(short, long, default_value = "./models4")]
    models: PathBuf,

    /// Checkpoint name without the .pt extension
    #[arg(short, long, default_value = "best")]
    tag: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a single problem such as "123+877="
    Solve { problem: String },
    /// Print `{problem}:{target}={decoded}` for one elementary pair
    Eval { x: i64, y: i64 },
    /// Write problem/answer line pairs for every pair in start..end
    Dump {
        #[arg(long)]
        start: i64,
        #[arg(long)]
        end: i64,
        #[arg(short, long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config_path = args.models.join("config.json");
    let config = if config_path.exists() {
        ModelConfig::load_json(&config_path)?
    } else {
        tracing::warn!(?config_path, "no config.json, using the default calculator model");
        ModelConfig::calculator(tokenizer::VOCAB_SIZE)
    };
    let device = Device::cuda_if_available();
    let calculator = Calculator::load(&args.models, &args.tag, &config, device)?;

    match args.command {
        Command::Solve { problem } => {
            let decoded = calculator.solve(&problem)?;
            println!("{}", tokenizer::answer_text(&decoded));
        }
        Command::Eval { x, y } => {
            evaluate(&calculator, x, y)?;
        }
        Command::Dump { start, end, out } => {
            let pairs = evaluate_dataset(&calculator, start, end, &out)?;
            tracing::info!(pairs, ?out, "wrote evaluation dump");
        }
    }
    Ok(())
}
