//! Text form of the arithmetic problems the model learns.
//!
//! Two formats exist. [`generate_one_pair`] writes operands and result with
//! their digits reversed (least significant first). [`elementary_pair`] pads
//! both operands to the same width and writes the digit-wise sums without
//! carrying, so a column summing to ten or more becomes a letter.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::Path;

use crate::error::{Result, TokenizerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Plus,
    Minus,
}

impl Operator {
    pub fn symbol(self) -> char {
        match self {
            Operator::Plus => '+',
            Operator::Minus => '-',
        }
    }

    pub fn apply(self, left: i64, right: i64) -> i64 {
        match self {
            Operator::Plus => left + right,
            Operator::Minus => left - right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

fn reversed(value: i64) -> String {
    value.to_string().chars().rev().collect()
}

/// `("{rev left}{op}{rev right}=", "{rev result}")`
pub fn generate_one_pair(left: i64, right: i64, op: Operator) -> (String, String) {
    let target = op.apply(left, right);
    let text = format!("{}{}{}=", reversed(left), op.symbol(), reversed(right));
    (text, reversed(target))
}

/// Zero-pads `text` up to `length` characters on the given side.
pub fn padding_str(text: &str, length: usize, side: Side) -> String {
    let missing = length.saturating_sub(text.len());
    let zeros = "0".repeat(missing);
    match side {
        Side::Left => zeros + text,
        Side::Right => format!("{}{}", text, zeros),
    }
}

/// Column-wise digit sums of two decimal strings, without carry propagation.
///
/// Returns both padded operands and the sum string. A column sum `s` is written
/// as the digit `s` when below ten and as `'A' + (s - 10)` otherwise, so
/// `"5" + "5"` gives `"A"`.
pub fn sum_two_str(left: &str, right: &str) -> Result<(String, String, String)> {
    let length = left.len().max(right.len());
    let text1 = padding_str(left, length, Side::Left);
    let text2 = padding_str(right, length, Side::Left);
    let sums = text1
        .chars()
        .zip(text2.chars())
        .map(|(a, b)| -> Result<char> {
            let digit = |ch: char| ch.to_digit(10).ok_or(TokenizerError::UnknownChar(ch));
            let s = digit(a)? + digit(b)?;
            let base = if s > 9 { b'A' as u32 + s - 10 } else { b'0' as u32 + s };
            Ok(char::from(base as u8))
        })
        .collect::<Result<String>>()?;
    Ok((text1, text2, sums))
}

/// `("{a}+{b}=", sums)` with both operands zero-padded to the same width.
/// Operands must be non-negative.
pub fn elementary_pair(left: i64, right: i64) -> Result<(String, String)> {
    let (text1, text2, target) = sum_two_str(&left.to_string(), &right.to_string())?;
    Ok((format!("{}+{}=", text1, text2), target))
}

/// Writes one `{problem}{answer}` line per elementary pair in `range × range`.
pub fn generate_dataset<P: AsRef<Path>>(path: P, range: Range<i64>) -> Result<usize> {
    let mut writer = BufWriter::new(File::create(path)?);
    let mut lines = 0;
    for i in range.clone() {
        for j in range.clone() {
            let (text, target) = elementary_pair(i, j)?;
            writeln!(writer, "{}{}", text, target)?;
            lines += 1;
        }
    }
    writer.flush()?;
    Ok(lines)
}
