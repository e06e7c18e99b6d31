use tch::{nn, Device, Kind, Tensor};

use crate::attention::MultiHeadedAttention;
use crate::config::ModelConfig;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::init;
use crate::layer_norm::{LayerNorm, SublayerConnection};

/// Position-wise feed-forward block: `w_2(dropout(relu(w_1(x))))`.
#[derive(Debug)]
pub struct PositionwiseFeedForward {
    w_1: nn::Linear,
    w_2: nn::Linear,
    dropout: f64,
}

impl PositionwiseFeedForward {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Self {
        Self {
            w_1: init::linear(vs / "w_1", config.d_model, config.d_ff),
            w_2: init::linear(vs / "w_2", config.d_ff, config.d_model),
            dropout: config.dropout,
        }
    }

    pub fn forward_t(&self, x: &Tensor, train: bool) -> Tensor {
        x.apply(&self.w_1)
            .relu()
            .dropout(self.dropout, train)
            .apply(&self.w_2)
    }
}

fn sublayers(vs: &nn::Path, n: i64, config: &ModelConfig) -> Vec<SublayerConnection> {
    (0..n)
        .map(|i| {
            SublayerConnection::new(
                &(vs / "sublayer" / i),
                config.d_model,
                config.dropout,
                config.layer_norm_epsilon,
            )
        })
        .collect()
}

/// Self-attention then feed-forward, each wrapped in a residual sublayer.
#[derive(Debug)]
pub struct EncoderLayer {
    self_attn: MultiHeadedAttention,
    feed_forward: PositionwiseFeedForward,
    sublayer: Vec<SublayerConnection>,
}

impl EncoderLayer {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Result<Self> {
        Ok(Self {
            self_attn: MultiHeadedAttention::new(&(vs / "self_attn"), config)?,
            feed_forward: PositionwiseFeedForward::new(&(vs / "feed_forward"), config),
            sublayer: sublayers(vs, 2, config),
        })
    }

    pub fn forward_t(&self, x: &Tensor, mask: &Tensor, train: bool) -> Tensor {
        let x = self.sublayer[0].forward(x, train, |h| {
            self.self_attn.forward(h, h, h, Some(mask), train)
        });
        self.sublayer[1].forward(&x, train, |h| self.feed_forward.forward_t(h, train))
    }
}

/// Masked self-attention, cross-attention over the encoder memory, then
/// feed-forward.
#[derive(Debug)]
pub struct DecoderLayer {
    self_attn: MultiHeadedAttention,
    src_attn: MultiHeadedAttention,
    feed_forward: PositionwiseFeedForward,
    sublayer: Vec<SublayerConnection>,
}

impl DecoderLayer {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Result<Self> {
        Ok(Self {
            self_attn: MultiHeadedAttention::new(&(vs / "self_attn"), config)?,
            src_attn: MultiHeadedAttention::new(&(vs / "src_attn"), config)?,
            feed_forward: PositionwiseFeedForward::new(&(vs / "feed_forward"), config),
            sublayer: sublayers(vs, 3, config),
        })
    }

    pub fn forward_t(
        &self,
        x: &Tensor,
        memory: &Tensor,
        src_mask: &Tensor,
        tgt_mask: &Tensor,
        train: bool,
    ) -> Tensor {
        let x = self.sublayer[0].forward(x, train, |h| {
            self.self_attn.forward(h, h, h, Some(tgt_mask), train)
        });
        let x = self.sublayer[1].forward(&x, train, |h| {
            self.src_attn.forward(h, memory, memory, Some(src_mask), train)
        });
        self.sublayer[2].forward(&x, train, |h| self.feed_forward.forward_t(h, train))
    }
}

/// N independently parameterized encoder layers and a final norm.
#[derive(Debug)]
pub struct Encoder {
    layers: Vec<EncoderLayer>,
    norm: LayerNorm,
}

impl Encoder {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Result<Self> {
        let layers = (0..config.n_layer)
            .map(|i| EncoderLayer::new(&(vs / "layers" / i), config))
            .collect::<Result<Vec<_>>>()?;
        let norm = LayerNorm::new(&(vs / "norm"), config.d_model, config.layer_norm_epsilon);
        Ok(Self { layers, norm })
    }

    pub fn forward_t(&self, x: &Tensor, mask: &Tensor, train: bool) -> Tensor {
        let x = self
            .layers
            .iter()
            .fold(x.shallow_clone(), |x, layer| layer.forward_t(&x, mask, train));
        self.norm.forward(&x)
    }
}

#[derive(Debug)]
pub struct Decoder {
    layers: Vec<DecoderLayer>,
    norm: LayerNorm,
}

impl Decoder {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Result<Self> {
        let layers = (0..config.n_layer)
            .map(|i| DecoderLayer::new(&(vs / "layers" / i), config))
            .collect::<Result<Vec<_>>>()?;
        let norm = LayerNorm::new(&(vs / "norm"), config.d_model, config.layer_norm_epsilon);
        Ok(Self { layers, norm })
    }

    pub fn forward_t(
        &self,
        x: &Tensor,
        memory: &Tensor,
        src_mask: &Tensor,
        tgt_mask: &Tensor,
        train: bool,
    ) -> Tensor {
        let x = self.layers.iter().fold(x.shallow_clone(), |x, layer| {
            layer.forward_t(&x, memory, src_mask, tgt_mask, train)
        });
        self.norm.forward(&x)
    }
}

/// Linear projection to the target vocabulary followed by log-softmax.
#[derive(Debug)]
pub struct Generator {
    proj: nn::Linear,
}

impl Generator {
    pub fn new(vs: &nn::Path, d_model: i64, vocab: i64) -> Self {
        Self {
            proj: init::linear(vs / "proj", d_model, vocab),
        }
    }

    pub fn forward(&self, x: &Tensor) -> Tensor {
        x.apply(&self.proj).log_softmax(-1, Kind::Float)
    }
}

/// Encoder-decoder Transformer. Parameters are registered in the var store
/// the model was built from; the model only keeps shallow handles to them.
#[derive(Debug)]
pub struct EncoderDecoder {
    encoder: Encoder,
    decoder: Decoder,
    src_embed: Embedder,
    tgt_embed: Embedder,
    pub generator: Generator,
    pub config: ModelConfig,
    device: Device,
}

impl EncoderDecoder {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Result<Self> {
        config.validate()?;
        let embed = |name: &str, vocab: i64| {
            Embedder::new(
                &(vs / name),
                vocab,
                config.d_model,
                config.dropout,
                config.max_len,
            )
        };

        Ok(Self {
            encoder: Encoder::new(&(vs / "encoder"), config)?,
            decoder: Decoder::new(&(vs / "decoder"), config)?,
            src_embed: embed("src_embed", config.src_vocab),
            tgt_embed: embed("tgt_embed", config.tgt_vocab),
            generator: Generator::new(&(vs / "generator"), config.d_model, config.tgt_vocab),
            config: config.clone(),
            device: vs.device(),
        })
    }

    /// src: [batch, src_len], src_mask: [batch, 1, src_len] -> memory [batch, src_len, d_model]
    pub fn encode(&self, src: &Tensor, src_mask: &Tensor, train: bool) -> Tensor {
        self.encoder
            .forward_t(&self.src_embed.forward_t(src, train), src_mask, train)
    }

    /// Runs the decoder stack over `tgt`. `memory` is not modified, so one
    /// `encode` result can serve every step of autoregressive decoding.
    pub fn decode(
        &self,
        memory: &Tensor,
        src_mask: &Tensor,
        tgt: &Tensor,
        tgt_mask: &Tensor,
        train: bool,
    ) -> Tensor {
        self.decoder.forward_t(
            &self.tgt_embed.forward_t(tgt, train),
            memory,
            src_mask,
            tgt_mask,
            train,
        )
    }

    /// Decoder output for teacher-forced `tgt`; apply [`Generator`] for log-probs.
    pub fn forward_t(
        &self,
        src: &Tensor,
        tgt: &Tensor,
        src_mask: &Tensor,
        tgt_mask: &Tensor,
        train: bool,
    ) -> Tensor {
        let memory = self.encode(src, src_mask, train);
        self.decode(&memory, src_mask, tgt, tgt_mask, train)
    }

    pub fn d_model(&self) -> i64 {
        self.src_embed.d_model()
    }

    pub fn device(&self) -> Device {
        self.device
    }
}

/// Builds a model with the default dimensions (d_model 512, d_ff 2048, 8 heads).
pub fn make_model(
    vs: &nn::Path,
    src_vocab: i64,
    tgt_vocab: i64,
    n_layer: i64,
) -> Result<EncoderDecoder> {
    EncoderDecoder::new(vs, &ModelConfig::new(src_vocab, tgt_vocab, n_layer))
}
