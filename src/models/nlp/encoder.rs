use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;

use crate::config::{CharEncoderKind, ContextualConfig, ModelConfig};
use crate::dataset::Batch;
use crate::models::nlp::{CharCNN, CharRNN, ModelDims, Morphlex};
use crate::models::{dropout, BiLSTM, Embed};

#[derive(Debug, Clone)]
enum CharEncoder {
    Rnn(CharRNN),
    Cnn(CharCNN),
}

impl CharEncoder {
    fn forward(&self, batch: &Batch, train: bool) -> Result<Tensor> {
        let ys = match *self {
            CharEncoder::Rnn(ref m) => m.forward(&batch.chars, train)?,
            CharEncoder::Cnn(ref m) => m.forward(&batch.chars, train)?,
        };
        let dim = ys.dim(1)?;
        ys.reshape((batch.batch_size(), batch.max_len, dim))
    }

    fn out_size(&self) -> usize {
        match *self {
            CharEncoder::Rnn(ref m) => m.out_size(),
            CharEncoder::Cnn(ref m) => m.out_size(),
        }
    }
}

/// Concatenates every enabled embedding stream per token and runs the
/// sentence BiLSTM over the result.
#[derive(Debug, Clone)]
pub struct Encoder {
    words: Option<Embed>,
    pretrained: Option<Embed>,
    chars: Option<CharEncoder>,
    morphlex: Option<Morphlex>,
    contextual: Option<ContextualConfig>,
    bilstm: BiLSTM,
    dropout_rate: f32,
    input_dropout: f32,
}

fn required<'a>(stream: &'a Option<Tensor>, name: &str) -> Result<&'a Tensor> {
    stream
        .as_ref()
        .ok_or_else(|| candle_core::Error::Msg(format!("batch carries no {}", name)))
}

impl Encoder {
    pub fn new(vb: VarBuilder, config: &ModelConfig, dims: &ModelDims) -> Result<Self> {
        let mut in_size = 0;
        let words = match (config.word_embed_size, dims.n_words) {
            (Some(size), Some(n)) => Some(Embed::new(vb.pp("word_embed"), n, size)?),
            (Some(_), None) => candle_core::bail!("word embeddings need a word vocabulary"),
            _ => None,
        };
        let pretrained = match (&config.pretrained, dims.n_pretrained) {
            (Some(c), Some(n)) => {
                let embed = Embed::new(vb.pp("pretrained_embed"), n, c.dim)?;
                Some(if c.freeze { embed.frozen() } else { embed })
            }
            (Some(_), None) => candle_core::bail!("pretrained embeddings need their vocabulary"),
            _ => None,
        };
        let chars = match config.chars {
            Some(ref c) => Some(match c.encoder {
                CharEncoderKind::BiLstm => CharEncoder::Rnn(CharRNN::new(
                    vb.pp("char_rnn"),
                    dims.n_chars,
                    c.embed_size,
                    c.hidden_size,
                    config.encoder.input_dropout,
                )?),
                CharEncoderKind::Cnn { window } => CharEncoder::Cnn(CharCNN::new(
                    vb.pp("char_cnn"),
                    dims.n_chars,
                    c.embed_size,
                    c.hidden_size,
                    window,
                    config.encoder.input_dropout,
                )?),
            }),
            None => None,
        };
        let morphlex = match (&config.morphlex, dims.n_morphlex) {
            (Some(c), Some(n)) => Some(Morphlex::new(
                vb.pp("morphlex"),
                n,
                c.n_hot_size,
                c.projection_size,
            )?),
            (Some(_), None) => candle_core::bail!("morphological features need a lexicon"),
            _ => None,
        };
        in_size += words.as_ref().map_or(0, |e| e.embed_size());
        in_size += pretrained.as_ref().map_or(0, |e| e.embed_size());
        in_size += chars.as_ref().map_or(0, |e| e.out_size());
        in_size += morphlex.as_ref().map_or(0, |e| e.out_size());
        if let Some(ref c) = config.contextual {
            if !c.bypass_encoder {
                in_size += c.dim;
            }
        }
        let bilstm = BiLSTM::new(
            vb.pp("bilstm"),
            config.encoder.num_layers,
            in_size,
            config.encoder.hidden_size,
            config.encoder.dropout,
        )?;
        Ok(Encoder {
            words,
            pretrained,
            chars,
            morphlex,
            contextual: config.contextual.clone(),
            bilstm,
            dropout_rate: config.encoder.dropout,
            input_dropout: config.encoder.input_dropout,
        })
    }

    /// `(B, T, out_size)` token states, zero at padding.
    pub fn forward(&self, batch: &Batch, train: bool) -> Result<Tensor> {
        let mut streams = Vec::with_capacity(5);
        if let Some(ref embed) = self.words {
            streams.push(embed.forward(required(&batch.words, "word ids")?)?);
        }
        if let Some(ref embed) = self.pretrained {
            streams.push(embed.forward(required(&batch.pretrained, "pretrained ids")?)?);
        }
        if let Some(ref chars) = self.chars {
            streams.push(chars.forward(batch, train)?);
        }
        if let Some(ref morphlex) = self.morphlex {
            streams.push(morphlex.forward(required(&batch.morphlex, "lexicon ids")?)?);
        }
        let bypass = match self.contextual {
            Some(ref c) => {
                let vectors = required(&batch.contextual, "contextual vectors")?;
                if c.bypass_encoder {
                    Some(vectors)
                } else {
                    streams.push(vectors.clone());
                    None
                }
            }
            None => None,
        };
        let xs = dropout(&Tensor::cat(&streams, 2)?, self.input_dropout, train)?;
        let hs = self.bilstm.forward(&xs, &batch.mask, train)?.outputs;
        let hs = dropout(&hs, self.dropout_rate, train)?;
        match bypass {
            Some(vectors) => Tensor::cat(&[&hs, vectors], 2),
            None => Ok(hs),
        }
    }

    pub fn out_size(&self) -> usize {
        let bypass = match self.contextual {
            Some(ref c) if c.bypass_encoder => c.dim,
            _ => 0,
        };
        self.bilstm.out_size() + bypass
    }

    pub fn pretrained_table(&self) -> Option<&Embed> {
        self.pretrained.as_ref()
    }

    pub fn morphlex_table(&self) -> Option<&Embed> {
        self.morphlex.as_ref().map(|m| m.table())
    }

    /// Names of the tables that receive no gradient.
    pub fn frozen_params(&self) -> Vec<String> {
        let mut names = vec![];
        if let Some(ref embed) = self.pretrained {
            if !embed.update_enabled {
                names.push(embed.name().to_string());
            }
        }
        if let Some(ref morphlex) = self.morphlex {
            names.push(morphlex.table().name().to_string());
        }
        names
    }
}
