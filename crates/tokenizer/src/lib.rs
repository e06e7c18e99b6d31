pub mod error;
pub mod problems;
pub mod vocab;

pub use error::{Result, TokenizerError};
pub use problems::{elementary_pair, generate_one_pair, sum_two_str, Operator};
pub use vocab::{
    answer_text, encode_problem, from_token, from_tokens, to_token, to_tokens, END, PAD, START,
    VOCAB_SIZE,
};
