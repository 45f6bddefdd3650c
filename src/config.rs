use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::io::serialize::{self, Format};

/// Named architecture presets, resolved to a full `ModelConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelVariant {
    Small,
    Large,
}

impl FromStr for ModelVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "small" => Ok(ModelVariant::Small),
            "large" => Ok(ModelVariant::Large),
            _ => Err(Error::Config(format!("unknown model variant `{}`", s))),
        }
    }
}

impl ModelVariant {
    pub fn config(self) -> ModelConfig {
        match self {
            ModelVariant::Small => ModelConfig {
                variant: Some(self),
                max_sentence_len: DEFAULT_MAX_SENTENCE_LEN,
                word_embed_size: Some(64),
                pretrained: None,
                morphlex: None,
                chars: Some(CharConfig {
                    embed_size: 20,
                    hidden_size: 64,
                    encoder: CharEncoderKind::BiLstm,
                }),
                contextual: None,
                encoder: EncoderConfig {
                    hidden_size: 128,
                    num_layers: 1,
                    dropout: 0.1,
                    input_dropout: 0.0,
                },
                tagger: Some(TaggerConfig::default()),
                lemmatizer: Some(LemmatizerConfig {
                    char_embed_size: 32,
                    hidden_size: 128,
                    source_hidden_size: 64,
                    tag_embed_size: 32,
                    ..LemmatizerConfig::default()
                }),
            },
            ModelVariant::Large => ModelConfig {
                variant: Some(self),
                max_sentence_len: DEFAULT_MAX_SENTENCE_LEN,
                word_embed_size: Some(128),
                pretrained: None,
                morphlex: None,
                chars: Some(CharConfig {
                    embed_size: 20,
                    hidden_size: 128,
                    encoder: CharEncoderKind::BiLstm,
                }),
                contextual: None,
                encoder: EncoderConfig {
                    hidden_size: 256,
                    num_layers: 2,
                    dropout: 0.1,
                    input_dropout: 0.1,
                },
                tagger: Some(TaggerConfig::default()),
                lemmatizer: Some(LemmatizerConfig::default()),
            },
        }
    }
}

pub const DEFAULT_MAX_SENTENCE_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub variant: Option<ModelVariant>,
    pub max_sentence_len: usize,
    /// Size of embeddings trained over the training token vocabulary.
    pub word_embed_size: Option<usize>,
    pub pretrained: Option<PretrainedConfig>,
    pub morphlex: Option<MorphlexConfig>,
    pub chars: Option<CharConfig>,
    pub contextual: Option<ContextualConfig>,
    pub encoder: EncoderConfig,
    pub tagger: Option<TaggerConfig>,
    pub lemmatizer: Option<LemmatizerConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PretrainedConfig {
    pub dim: usize,
    pub freeze: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphlexConfig {
    pub n_hot_size: usize,
    pub projection_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CharEncoderKind {
    BiLstm,
    /// `window` must be odd.
    Cnn { window: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharConfig {
    pub embed_size: usize,
    /// Per-direction state size for `BiLstm`, number of filters for `Cnn`.
    pub hidden_size: usize,
    pub encoder: CharEncoderKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextualConfig {
    pub dim: usize,
    /// Concatenate the vectors to the BiLSTM output instead of its input.
    pub bypass_encoder: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Per-direction state size.
    pub hidden_size: usize,
    pub num_layers: usize,
    pub dropout: f32,
    pub input_dropout: f32,
}

/// How a tag category is read off a tag string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoarseScheme {
    /// First character, e.g. `nven` -> `n`.
    FirstChar,
    /// Text before the first delimiter, e.g. `NOUN:sg` -> `NOUN`.
    Delimited(char),
}

impl CoarseScheme {
    pub fn coarse<'a>(&self, tag: &'a str) -> &'a str {
        match *self {
            CoarseScheme::FirstChar => match tag.char_indices().nth(1) {
                Some((i, _)) => &tag[..i],
                None => tag,
            },
            CoarseScheme::Delimited(delim) => match tag.find(delim) {
                Some(i) => &tag[..i],
                None => tag,
            },
        }
    }
}

impl Default for CoarseScheme {
    fn default() -> Self {
        CoarseScheme::FirstChar
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagDecoding {
    Greedy,
    Crf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggerConfig {
    pub coarse: CoarseScheme,
    pub coarse_weight: f32,
    pub weight: f32,
    pub decoding: TagDecoding,
    /// Exclude fine tags outside the predicted coarse category at decoding.
    pub constrain_to_coarse: bool,
    pub label_smoothing: f32,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        TaggerConfig {
            coarse: CoarseScheme::FirstChar,
            coarse_weight: 0.5,
            weight: 1.0,
            decoding: TagDecoding::Greedy,
            constrain_to_coarse: false,
            label_smoothing: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LemmaMode {
    /// Character-by-character generation.
    Generate,
    /// One suffix edit rule per token.
    EditRule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LemmatizerConfig {
    pub mode: LemmaMode,
    pub char_embed_size: usize,
    pub hidden_size: usize,
    /// Per-direction state size of the BiLSTM over the token's characters.
    pub source_hidden_size: usize,
    pub tag_embed_size: usize,
    pub attention: bool,
    /// Probability of feeding the gold previous character during training.
    pub teacher_forcing: f32,
    pub max_length: usize,
    pub weight: f32,
    pub dropout: f32,
}

impl Default for LemmatizerConfig {
    fn default() -> Self {
        LemmatizerConfig {
            mode: LemmaMode::Generate,
            char_embed_size: 64,
            hidden_size: 256,
            source_hidden_size: 128,
            tag_embed_size: 64,
            attention: true,
            teacher_forcing: 1.0,
            max_length: 40,
            weight: 1.0,
            dropout: 0.0,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelVariant::Small.config()
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(Error::Config(msg.to_string()));
        if self.max_sentence_len == 0 {
            return fail("`max_sentence_len` must be positive");
        }
        if self.word_embed_size.is_none()
            && self.pretrained.is_none()
            && self.morphlex.is_none()
            && self.chars.is_none()
            && self.contextual.is_none()
        {
            return fail("at least one embedding stream must be enabled");
        }
        let bypassed = self.contextual.as_ref().map_or(false, |c| c.bypass_encoder);
        if bypassed
            && self.word_embed_size.is_none()
            && self.pretrained.is_none()
            && self.morphlex.is_none()
            && self.chars.is_none()
        {
            return fail("contextual vectors that bypass the encoder need another embedding stream");
        }
        if let Some(ref chars) = self.chars {
            if let CharEncoderKind::Cnn { window } = chars.encoder {
                if window % 2 == 0 {
                    return fail("character CNN window must be odd");
                }
            }
        }
        if self.encoder.num_layers == 0 || self.encoder.hidden_size == 0 {
            return fail("encoder needs at least one layer of positive size");
        }
        for p in &[self.encoder.dropout, self.encoder.input_dropout] {
            if !(0.0..1.0).contains(p) {
                return fail("dropout must be in [0, 1)");
            }
        }
        if self.tagger.is_none() && self.lemmatizer.is_none() {
            return fail("at least one of tagger and lemmatizer must be enabled");
        }
        if let Some(ref tagger) = self.tagger {
            if !(0.0..1.0).contains(&tagger.label_smoothing) {
                return fail("label smoothing must be in [0, 1)");
            }
        }
        if let Some(ref lemmatizer) = self.lemmatizer {
            if !(0.0..=1.0).contains(&lemmatizer.teacher_forcing) {
                return fail("teacher forcing ratio must be in [0, 1]");
            }
            if !(0.0..1.0).contains(&lemmatizer.dropout) {
                return fail("dropout must be in [0, 1)");
            }
            if lemmatizer.max_length == 0 {
                return fail("`max_length` of lemmas must be positive");
            }
        }
        Ok(())
    }

    pub fn coarse_scheme(&self) -> CoarseScheme {
        self.tagger
            .as_ref()
            .map(|t| t.coarse)
            .unwrap_or_default()
    }

    pub fn lemma_mode(&self) -> Option<LemmaMode> {
        self.lemmatizer.as_ref().map(|l| l.mode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Sgd,
    Adam,
}

impl FromStr for OptimizerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sgd" => Ok(OptimizerKind::Sgd),
            "adam" => Ok(OptimizerKind::Adam),
            _ => Err(Error::Config(format!("unknown optimizer `{}`", s))),
        }
    }
}

/// Learning-rate schedule, applied once per epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Schedule {
    Constant,
    Multiply { factor: f64 },
    /// Multiply by `factor` once the monitored loss stops improving for `patience` epochs.
    Plateau { factor: f64, patience: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub epochs: u32,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub optimizer: OptimizerKind,
    pub schedule: Schedule,
    pub weight_decay: f64,
    pub gradient_clipping: Option<f64>,
    pub min_word_freq: u32,
    pub seed: Option<u64>,
    pub save_interval: Option<u32>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            epochs: 20,
            batch_size: 32,
            learning_rate: 0.2,
            optimizer: OptimizerKind::Sgd,
            schedule: Schedule::Multiply { factor: 0.95 },
            weight_decay: 0.0,
            gradient_clipping: Some(5.0),
            min_word_freq: 1,
            seed: None,
            save_interval: None,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch size must be positive".to_string()));
        }
        if self.learning_rate <= 0.0 {
            return Err(Error::Config("learning rate must be positive".to_string()));
        }
        Ok(())
    }
}

/// Model and training configuration, stored as `hyperparameters.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub model: ModelConfig,
    pub train: TrainConfig,
}

impl Hyperparameters {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(serialize::read_file(path)?)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        Ok(serialize::write_file(path, self, Format::JsonPretty)?)
    }
}
