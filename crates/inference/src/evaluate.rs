use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tokenizer::{elementary_pair, generate_one_pair, Operator};

use crate::calculator::Calculator;

/// Solves the elementary pair `x + y` and prints `{problem}:{target}={decoded}`.
pub fn evaluate(calculator: &Calculator, x: i64, y: i64) -> Result<String> {
    let (text, target) = elementary_pair(x, y)?;
    let decoded = calculator.solve_padded(&text, 2)?;
    let line = format!("{}:{}={}", text, target, decoded);
    println!("{}", line);
    Ok(line)
}

/// Writes two lines per reversed-digit pair in `start..end × start..end`:
/// `{problem}{target}` followed by the decoded tokens. Returns the number of
/// pairs.
pub fn evaluate_dataset<P: AsRef<Path>>(
    calculator: &Calculator,
    start: i64,
    end: i64,
    path: P,
) -> Result<usize> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
    let mut writer = BufWriter::new(file);
    let mut pairs = 0;
    for i in start..end {
        for j in start..end {
            let (text, target) = generate_one_pair(i, j, Operator::Plus);
            let decoded = calculator.solve(&text)?;
            writeln!(writer, "{}{}", text, target)?;
            writeln!(writer, "{}", decoded)?;
            pairs += 1;
        }
    }
    writer.flush()?;
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calc_core::ModelConfig;
    use tch::Device;

    fn calculator() -> Calculator {
        tch::manual_seed(6);
        let config = ModelConfig {
            src_vocab: tokenizer::VOCAB_SIZE,
            tgt_vocab: tokenizer::VOCAB_SIZE,
            n_layer: 1,
            d_model: 16,
            d_ff: 32,
            n_head: 2,
            dropout: 0.0,
            max_len: 64,
            layer_norm_epsilon: 1e-6,
        };
        Calculator::new(&config, Device::Cpu).unwrap()
    }

    #[test]
    fn evaluate_line_format() {
        let line = evaluate(&calculator(), 7, 1005).unwrap();
        assert!(line.starts_with("0007+1005=:100C=^"), "{}", line);
    }

    #[test]
    fn negative_operand_is_an_error() {
        assert!(evaluate(&calculator(), -5, 3).is_err());
    }

    #[test]
    fn dataset_dump_pairs_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eval.txt");
        let pairs = evaluate_dataset(&calculator(), 10, 13, &path).unwrap();
        assert_eq!(pairs, 9);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 18);
        assert_eq!(lines[0], "01+01=02");
        assert!(lines[1].starts_with('^'));
    }
}
