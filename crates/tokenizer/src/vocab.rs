use crate::error::{Result, TokenizerError};

/// Control and operator symbols, in id order: blank/pad, start, end, plus, minus, equals.
pub const OPERATORS: [char; 6] = ['~', '^', '$', '+', '-', '='];

pub const PAD: i64 = 0;
pub const START: i64 = 1;
pub const END: i64 = 2;

const DIGIT_BASE: i64 = OPERATORS.len() as i64;
const LETTER_BASE: i64 = DIGIT_BASE + 10;
const LETTER_COUNT: i64 = ('J' as i64) - ('A' as i64) + 1;

/// Operators, digits `0`-`9` and the carry letters `A`-`J`.
pub const VOCAB_SIZE: i64 = LETTER_BASE + LETTER_COUNT;

pub fn to_token(ch: char) -> Result<i64> {
    if let Some(idx) = OPERATORS.iter().position(|&op| op == ch) {
        return Ok(idx as i64);
    }
    match ch {
        '0'..='9' => Ok(DIGIT_BASE + (ch as i64 - '0' as i64)),
        'A'..='J' => Ok(LETTER_BASE + (ch as i64 - 'A' as i64)),
        _ => Err(TokenizerError::UnknownChar(ch)),
    }
}

pub fn from_token(token: i64) -> Result<char> {
    let ch = match token {
        t if (0..DIGIT_BASE).contains(&t) => OPERATORS[t as usize],
        t if (DIGIT_BASE..LETTER_BASE).contains(&t) => (b'0' + (t - DIGIT_BASE) as u8) as char,
        t if (LETTER_BASE..VOCAB_SIZE).contains(&t) => (b'A' + (t - LETTER_BASE) as u8) as char,
        t => return Err(TokenizerError::UnknownToken(t)),
    };
    Ok(ch)
}

pub fn to_tokens(text: &str) -> Result<Vec<i64>> {
    text.chars().map(to_token).collect()
}

pub fn from_tokens(tokens: &[i64]) -> Result<String> {
    tokens.iter().map(|&t| from_token(t)).collect()
}

/// `[start] + text + [end]`, followed by `extra_pad` pad ids.
pub fn encode_problem(text: &str, extra_pad: usize) -> Result<Vec<i64>> {
    let mut ids = Vec::with_capacity(text.len() + 2 + extra_pad);
    ids.push(START);
    ids.extend(to_tokens(text)?);
    ids.push(END);
    ids.extend(std::iter::repeat(PAD).take(extra_pad));
    Ok(ids)
}

/// Strips the leading start symbol and cuts the decoded text at the first end symbol.
pub fn answer_text(decoded: &str) -> &str {
    let start = OPERATORS[START as usize];
    let end = OPERATORS[END as usize];
    let body = decoded.strip_prefix(start).unwrap_or(decoded);
    match body.find(end) {
        Some(idx) => &body[..idx],
        None => body,
    }
}
