use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use tokenizer::problems::generate_dataset;

/// Writes the elementary-addition corpus, one `{problem}{answer}` line per
/// operand pair.
#[derive(Parser)]
struct Cli {
    #[arg(short, long, default_value = "./dataset")]
    output_dir: PathBuf,
    #[arg(short, long, default_value = "plus.txt")]
    file_name: String,
    #[arg(long, default_value_t = 0)]
    start: i64,
    #[arg(long, default_value_t = 1000)]
    end: i64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    std::fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("failed to create {:?}", cli.output_dir))?;
    let path = cli.output_dir.join(&cli.file_name);
    let lines = generate_dataset(&path, cli.start..cli.end)?;

    println!("Done. Wrote {} lines to {:?}.", lines, path);
    Ok(())
}
