use std::sync::{Arc, Mutex};

use candle_core::{DType, Result, Tensor, D};
use candle_nn::ops::softmax;
use candle_nn::VarBuilder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{LemmaMode, LemmatizerConfig};
use crate::dataset::Batch;
use crate::models::{
    additive_mask, dropout, masked_nll_sum, BiLSTM, BiLSTMOutput, Embed, Linear, GRU,
    LARGE_NEGATIVE,
};
use crate::preprocessing::{Preprocessor, Vocab, EOS_ID, PAD_ID, SOS_ID, UNK_ID};

/// A lemma produced for one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LemmaPrediction {
    pub lemma: String,
    /// Generation hit the length bound before producing `EOS`.
    pub truncated: bool,
}

/// Decoder output for one token, before mapping back to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawLemma {
    Chars { ids: Vec<u32>, truncated: bool },
    Rule(u32),
}

impl RawLemma {
    pub fn into_prediction(self, form: &str, preprocessor: &Preprocessor) -> LemmaPrediction {
        match self {
            RawLemma::Chars { ids, truncated } => LemmaPrediction {
                lemma: preprocessor.decode_chars(&ids),
                truncated,
            },
            RawLemma::Rule(id) => LemmaPrediction {
                lemma: preprocessor
                    .decode_rule(id)
                    .and_then(|rule| rule.apply(form))
                    .unwrap_or_else(|| form.to_string()),
                truncated: false,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct LemmaLoss {
    /// Weighted sum over the real tokens of the batch.
    pub loss: Tensor,
    /// Tokens whose lemma is predicted entirely right.
    pub correct: usize,
}

/// Attention-based character decoder conditioned on the token.
#[derive(Debug, Clone)]
struct Generator {
    char_embed: Embed,
    source: BiLSTM,
    init: Linear,
    gru: GRU,
    attention: Option<Linear>,
    out: Linear,
}

struct Source {
    states: Tensor,
    mask: Tensor,
}

impl Generator {
    fn step(
        &self,
        prev: &Tensor,
        h: &Tensor,
        context: &Tensor,
        source: &Source,
    ) -> Result<(Tensor, Tensor)> {
        let mut inputs = vec![self.char_embed.forward(prev)?, context.clone()];
        if let Some(ref attention) = self.attention {
            let query = attention.forward(h)?.unsqueeze(2)?;
            let scores = source.states.matmul(&query)?.squeeze(2)?;
            let weights = softmax(&(scores + &source.mask)?, D::Minus1)?;
            inputs.push(weights.unsqueeze(1)?.matmul(&source.states)?.squeeze(1)?);
        }
        let h = self.gru.step(&Tensor::cat(&inputs, 1)?, h)?;
        let logits = self.out.forward(&h)?;
        Ok((logits, h))
    }
}

#[derive(Debug, Clone)]
enum Head {
    Generate(Generator),
    EditRule(Linear),
}

#[derive(Debug, Clone)]
pub struct LemmaDecoder {
    tag_embed: Embed,
    head: Head,
    special: Tensor,
    config: LemmatizerConfig,
    /// Draws the teacher forcing decisions.
    rng: Arc<Mutex<StdRng>>,
}

impl LemmaDecoder {
    pub fn new(
        vb: VarBuilder,
        in_size: usize,
        n_chars: usize,
        n_tags: usize,
        n_rules: Option<usize>,
        config: &LemmatizerConfig,
    ) -> Result<Self> {
        let tag_embed = Embed::new(vb.pp("tag_embed"), n_tags, config.tag_embed_size)?;
        let head = match config.mode {
            LemmaMode::Generate => {
                let source_size = config.source_hidden_size * 2;
                let context_size = in_size + source_size + config.tag_embed_size;
                let attention = if config.attention {
                    Some(Linear::new(vb.pp("attention"), config.hidden_size, source_size, false)?)
                } else {
                    None
                };
                let gru_in = config.char_embed_size
                    + context_size
                    + if config.attention { source_size } else { 0 };
                Head::Generate(Generator {
                    char_embed: Embed::new(vb.pp("char_embed"), n_chars, config.char_embed_size)?,
                    source: BiLSTM::new(
                        vb.pp("source"),
                        1,
                        config.char_embed_size,
                        config.source_hidden_size,
                        0.0,
                    )?,
                    init: Linear::new(vb.pp("init"), context_size, config.hidden_size, true)?,
                    gru: GRU::new(vb.pp("gru"), gru_in, config.hidden_size)?,
                    attention,
                    out: Linear::new(vb.pp("out"), config.hidden_size, n_chars, true)?,
                })
            }
            LemmaMode::EditRule => match n_rules {
                Some(n) => Head::EditRule(Linear::new(
                    vb.pp("rule"),
                    in_size + config.tag_embed_size,
                    n,
                    true,
                )?),
                None => candle_core::bail!("edit-rule lemmatization needs a rule vocabulary"),
            },
        };
        let special: Vec<f32> = (0..n_chars as u32)
            .map(|i| match i {
                PAD_ID | UNK_ID | SOS_ID => LARGE_NEGATIVE,
                _ => 0.0,
            })
            .collect();
        Ok(LemmaDecoder {
            tag_embed,
            head,
            special: Tensor::from_vec(special, n_chars, vb.device())?,
            config: config.clone(),
            rng: Arc::new(Mutex::new(crate::utils::rand::rng())),
        })
    }

    /// Restarts the teacher forcing draws from `seed`.
    pub fn reseed(&self, seed: u64) {
        if let Ok(mut rng) = self.rng.lock() {
            *rng = StdRng::seed_from_u64(seed);
        }
    }

    /// Token states `(B, T, D)` of the real tokens, `(R, D)`.
    fn token_states(&self, hs: &Tensor, batch: &Batch) -> Result<Tensor> {
        let (b, t, d) = hs.dims3()?;
        hs.reshape((b * t, d))?.index_select(&batch.positions, 0)
    }

    fn encode_source(&self, generator: &Generator, batch: &Batch) -> Result<(BiLSTMOutput, Tensor)> {
        let ids = batch.chars.ids.index_select(&batch.positions, 0)?;
        let mask = batch.chars.mask.index_select(&batch.positions, 0)?;
        let xs = generator.char_embed.forward(&ids)?;
        Ok((generator.source.forward(&xs, &mask, false)?, mask))
    }

    /// Context of every real token and, for generation, its character states.
    fn context(
        &self,
        hs: &Tensor,
        batch: &Batch,
        tags: &Tensor,
        train: bool,
    ) -> Result<(Tensor, Option<Source>)> {
        let mut parts = vec![self.token_states(hs, batch)?];
        let source = match self.head {
            Head::Generate(ref generator) => {
                let (out, mask) = self.encode_source(generator, batch)?;
                parts.push(out.last);
                Some(Source {
                    states: out.outputs,
                    mask: additive_mask(&mask)?,
                })
            }
            Head::EditRule(_) => None,
        };
        parts.push(self.tag_embed.forward(tags)?);
        let context = dropout(&Tensor::cat(&parts, 1)?, self.config.dropout, train)?;
        Ok((context, source))
    }

    /// Loss with teacher forcing: the gold previous character is fed with
    /// probability `teacher_forcing` at every step, the predicted one otherwise.
    /// `tags` are the gold tag ids of the real tokens, `(R,)`.
    pub fn loss(&self, hs: &Tensor, batch: &Batch, tags: &Tensor, train: bool) -> Result<LemmaLoss> {
        let (context, source) = self.context(hs, batch, tags, train)?;
        let n_tokens = context.dim(0)?;
        let device = context.device();
        let weight = self.config.weight as f64;
        match self.head {
            Head::Generate(ref generator) => {
                let source = match source {
                    Some(source) => source,
                    None => candle_core::bail!("character states are missing"),
                };
                let targets = match batch.lemmas {
                    Some(ref lemmas) => lemmas,
                    None => candle_core::bail!("batch carries no gold lemmas"),
                };
                let width = targets.targets.dim(1)?;
                let mut h = generator.init.forward(&context)?.tanh()?;
                let mut prev = Tensor::full(SOS_ID, n_tokens, device)?.contiguous()?;
                let mut loss = Tensor::zeros((), DType::F32, device)?;
                let mut wrong = Tensor::zeros(n_tokens, DType::F32, device)?;
                for t in 0..width {
                    let gold = targets.targets.narrow(1, t, 1)?.squeeze(1)?.contiguous()?;
                    let mask = targets.mask.narrow(1, t, 1)?.squeeze(1)?.contiguous()?;
                    let (logits, next) = generator.step(&prev, &h, &context, &source)?;
                    h = next;
                    loss = (loss + masked_nll_sum(&logits, &gold, &mask, 0.0)?)?;
                    let predicted = logits.argmax(D::Minus1)?;
                    let miss = predicted.ne(&gold)?.to_dtype(DType::F32)?.mul(&mask)?;
                    wrong = (wrong + miss)?;
                    let forced = match self.config.teacher_forcing {
                        p if p >= 1.0 => true,
                        p if p <= 0.0 => false,
                        p => {
                            let mut rng = self.rng.lock().map_err(|_| {
                                candle_core::Error::Msg("rng is poisoned".to_string())
                            })?;
                            rng.gen::<f32>() < p
                        }
                    };
                    prev = if forced { gold } else { predicted.detach() };
                }
                let correct = wrong
                    .to_vec1::<f32>()?
                    .into_iter()
                    .filter(|&w| w == 0.0)
                    .count();
                Ok(LemmaLoss {
                    loss: loss.affine(weight, 0.0)?,
                    correct,
                })
            }
            Head::EditRule(ref classifier) => {
                let rules = match batch.rules {
                    Some(ref rules) => rules.flatten_all()?.index_select(&batch.positions, 0)?,
                    None => candle_core::bail!("batch carries no gold edit rules"),
                };
                let logits = classifier.forward(&context)?;
                let mask = Tensor::ones(n_tokens, DType::F32, device)?;
                let loss = masked_nll_sum(&logits, &rules, &mask, 0.0)?;
                let correct = logits
                    .argmax(D::Minus1)?
                    .eq(&rules)?
                    .to_dtype(DType::F32)?
                    .sum_all()?
                    .to_scalar::<f32>()?;
                Ok(LemmaLoss {
                    loss: loss.affine(weight, 0.0)?,
                    correct: correct.round() as usize,
                })
            }
        }
    }

    /// Greedy decoding of every real token of the batch, in `positions` order.
    /// Generation stops at `EOS` or after `max_length` characters.
    pub fn decode(&self, hs: &Tensor, batch: &Batch, tags: &Tensor) -> Result<Vec<RawLemma>> {
        let (context, source) = self.context(hs, batch, tags, false)?;
        let n_tokens = context.dim(0)?;
        match self.head {
            Head::Generate(ref generator) => {
                let source = match source {
                    Some(source) => source,
                    None => candle_core::bail!("character states are missing"),
                };
                let mut h = generator.init.forward(&context)?.tanh()?;
                let mut prev = Tensor::full(SOS_ID, n_tokens, context.device())?;
                let mut chars: Vec<Vec<u32>> = vec![vec![]; n_tokens];
                let mut finished = vec![false; n_tokens];
                for _ in 0..self.config.max_length {
                    let (logits, next) = generator.step(&prev, &h, &context, &source)?;
                    h = next;
                    let predicted = logits.broadcast_add(&self.special)?.argmax(D::Minus1)?;
                    for (i, id) in predicted.to_vec1::<u32>()?.into_iter().enumerate() {
                        if finished[i] {
                            continue;
                        }
                        if id == EOS_ID {
                            finished[i] = true;
                        } else {
                            chars[i].push(id);
                        }
                    }
                    if finished.iter().all(|&f| f) {
                        break;
                    }
                    prev = predicted;
                }
                Ok(chars
                    .into_iter()
                    .zip(finished)
                    .map(|(ids, done)| RawLemma::Chars {
                        ids,
                        truncated: !done,
                    })
                    .collect())
            }
            Head::EditRule(ref classifier) => {
                let n_rules = classifier.out_size();
                let reserved: Vec<f32> = (0..n_rules)
                    .map(|i| if Vocab::is_reserved(i as u32) { LARGE_NEGATIVE } else { 0.0 })
                    .collect();
                let reserved = Tensor::from_vec(reserved, n_rules, context.device())?;
                let ids = classifier
                    .forward(&context)?
                    .broadcast_add(&reserved)?
                    .argmax(D::Minus1)?
                    .to_vec1::<u32>()?;
                Ok(ids.into_iter().map(RawLemma::Rule).collect())
            }
        }
    }

    pub fn mode(&self) -> LemmaMode {
        self.config.mode
    }
}
