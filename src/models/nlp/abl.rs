use candle_core::{DType, Result, Tensor};
use candle_nn::VarBuilder;

use crate::config::ModelConfig;
use crate::dataset::Batch;
use crate::models::nlp::{Encoder, LemmaDecoder, RawLemma, TagDecoder};
use crate::preprocessing::{Preprocessor, UNK_ID};

/// Vocabulary sizes a model is built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDims {
    pub n_words: Option<usize>,
    pub n_pretrained: Option<usize>,
    pub n_morphlex: Option<usize>,
    pub n_chars: usize,
    pub n_tags: usize,
    pub n_coarse: usize,
    pub n_rules: Option<usize>,
    /// Coarse category index of every tag index.
    pub coarse_of_tags: Vec<u32>,
}

impl ModelDims {
    pub fn from_preprocessor(preprocessor: &Preprocessor) -> Self {
        ModelDims {
            n_words: preprocessor.words().map(|v| v.size()),
            n_pretrained: preprocessor.pretrained().map(|v| v.size()),
            n_morphlex: preprocessor.morphlex().map(|v| v.size()),
            n_chars: preprocessor.chars().size(),
            n_tags: preprocessor.tags().size(),
            n_coarse: preprocessor.coarse_tags().size(),
            n_rules: preprocessor.rules().map(|v| v.size()),
            coarse_of_tags: preprocessor.coarse_of_tags(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LossOutput {
    /// Mean over the real tokens of the batch.
    pub loss: Tensor,
    pub tag_correct: Option<usize>,
    pub lemma_correct: Option<usize>,
    pub tokens: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Prediction {
    pub tags: Option<Vec<Vec<u32>>>,
    pub lemmas: Option<Vec<Vec<RawLemma>>>,
}

/// Joint tagger and lemmatizer over a shared sentence encoder.
#[derive(Debug, Clone)]
pub struct ABLTagger {
    encoder: Encoder,
    tagger: Option<TagDecoder>,
    lemmatizer: Option<LemmaDecoder>,
}

impl ABLTagger {
    pub fn new(vb: VarBuilder, config: &ModelConfig, dims: &ModelDims) -> Result<Self> {
        let encoder = Encoder::new(vb.pp("encoder"), config, dims)?;
        let tagger = match config.tagger {
            Some(ref c) => Some(TagDecoder::new(
                vb.pp("tagger"),
                encoder.out_size(),
                dims.n_tags,
                dims.n_coarse,
                &dims.coarse_of_tags,
                c,
            )?),
            None => None,
        };
        let lemmatizer = match config.lemmatizer {
            Some(ref c) => Some(LemmaDecoder::new(
                vb.pp("lemmatizer"),
                encoder.out_size(),
                dims.n_chars,
                dims.n_tags,
                dims.n_rules,
                c,
            )?),
            None => None,
        };
        Ok(ABLTagger {
            encoder,
            tagger,
            lemmatizer,
        })
    }

    pub fn has_tagger(&self) -> bool {
        self.tagger.is_some()
    }

    pub fn has_lemmatizer(&self) -> bool {
        self.lemmatizer.is_some()
    }

    /// Parameter name of the pretrained word table.
    pub fn pretrained_table_name(&self) -> Option<&str> {
        self.encoder.pretrained_table().map(|e| e.name())
    }

    pub fn morphlex_table_name(&self) -> Option<&str> {
        self.encoder.morphlex_table().map(|e| e.name())
    }

    /// Seeds the random choices the lemmatizer makes during training.
    pub fn reseed(&self, seed: u64) {
        if let Some(ref lemmatizer) = self.lemmatizer {
            lemmatizer.reseed(seed);
        }
    }

    /// Names of parameters that the optimizer must leave untouched.
    pub fn frozen_params(&self) -> Vec<String> {
        self.encoder.frozen_params()
    }

    /// Tag ids of the real tokens, `(R,)`, falling back to `UNK` when absent.
    fn token_tags(&self, batch: &Batch, tags: Option<&Tensor>) -> Result<Tensor> {
        match tags {
            Some(tags) => tags.flatten_all()?.index_select(&batch.positions, 0),
            None => Tensor::full(UNK_ID, batch.num_tokens(), batch.device()),
        }
    }

    pub fn loss(&self, batch: &Batch, train: bool) -> Result<LossOutput> {
        let hs = self.encoder.forward(batch, train)?;
        let tokens = batch.num_tokens();
        let mut loss = Tensor::zeros((), DType::F32, batch.device())?;
        let mut tag_correct = None;
        let mut lemma_correct = None;
        if let Some(ref tagger) = self.tagger {
            let out = tagger.loss(&hs, batch)?;
            loss = (loss + out.loss)?;
            tag_correct = Some(out.correct);
        }
        if let Some(ref lemmatizer) = self.lemmatizer {
            if batch.lemmas.is_some() || batch.rules.is_some() {
                let tags = self.token_tags(batch, batch.tags.as_ref())?;
                let out = lemmatizer.loss(&hs, batch, &tags, train)?;
                loss = (loss + out.loss)?;
                lemma_correct = Some(out.correct);
            }
        }
        Ok(LossOutput {
            loss: loss.affine(1.0 / tokens.max(1) as f64, 0.0)?,
            tag_correct,
            lemma_correct,
            tokens,
        })
    }

    /// Predicts tags, unless `given_tags` `(B, T)` are supplied, and lemmas
    /// conditioned on the given or predicted tags.
    pub fn predict(
        &self,
        batch: &Batch,
        given_tags: Option<&Tensor>,
        lemmatize: bool,
    ) -> Result<Prediction> {
        let hs = self.encoder.forward(batch, false)?;
        let tags = match (given_tags, &self.tagger) {
            (None, Some(tagger)) => Some(tagger.decode(&hs, batch)?),
            _ => None,
        };
        let lemmas = match self.lemmatizer {
            Some(ref lemmatizer) if lemmatize => {
                let tag_ids = match (given_tags, &tags) {
                    (Some(given), _) => self.token_tags(batch, Some(given))?,
                    (None, Some(predicted)) => {
                        let flat: Vec<u32> = predicted.iter().flatten().copied().collect();
                        let n = flat.len();
                        Tensor::from_vec(flat, n, batch.device())?
                    }
                    (None, None) => self.token_tags(batch, None)?,
                };
                let raw = lemmatizer.decode(&hs, batch, &tag_ids)?;
                Some(batch.split_tokens(raw))
            }
            _ => None,
        };
        Ok(Prediction { tags, lemmas })
    }
}
