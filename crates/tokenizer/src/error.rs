use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Character {0:?} is not part of the arithmetic alphabet")]
    UnknownChar(char),

    #[error("Token id {0} is outside the vocabulary")]
    UnknownToken(i64),
}

pub type Result<T> = std::result::Result<T, TokenizerError>;
