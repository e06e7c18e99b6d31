pub mod attention;
pub mod checkpoint;
pub mod config;
pub mod embedding;
pub mod error;
pub mod init;
pub mod layer_norm;
pub mod mask;
pub mod transformer;

pub use config::ModelConfig;
pub use error::{ModelError, Result};
pub use mask::{make_std_mask, padding_mask, subsequent_mask};
pub use transformer::{make_model, EncoderDecoder, Generator};
