//! The tagging and lemmatization entry point.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use slog::Logger;

use crate::config::ModelConfig;
use crate::dataset::Batch;
use crate::error::{Error, Result, ValidationError};
use crate::io::checkpoint::{self, Header};
use crate::io::embedding::Embeddings;
use crate::lang::validate_tokens;
use crate::models::nlp::{
    embed_sentences, ABLTagger, ContextualEmbedder, LemmaPrediction, LossOutput, ModelDims,
};
use crate::preprocessing::{Preprocessor, Sample, NUM_RESERVED};

/// Pretrained tables a new model starts from.
#[derive(Debug, Clone, Default)]
pub struct Resources {
    pub pretrained: Option<Embeddings>,
    pub morphlex: Option<Embeddings>,
}

/// One token with its predicted tag and lemma.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub form: String,
    pub tag: Option<String>,
    pub lemma: Option<LemmaPrediction>,
}

pub struct Tagger {
    model: ABLTagger,
    varmap: VarMap,
    config: ModelConfig,
    preprocessor: Preprocessor,
    device: Device,
    contextual: Option<Box<dyn ContextualEmbedder>>,
    logger: Logger,
}

fn build(
    config: &ModelConfig,
    dims: &ModelDims,
    device: &Device,
) -> candle_core::Result<(VarMap, ABLTagger)> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let model = ABLTagger::new(vb, config, dims)?;
    Ok((varmap, model))
}

fn table_tensor(table: &Embeddings, device: &Device) -> Result<Tensor> {
    Ok(Tensor::from_vec(
        table.values().to_vec(),
        (table.len(), table.dim()),
        device,
    )?)
}

impl Tagger {
    /// A freshly initialized model over a fitted preprocessor.
    pub fn new(
        config: ModelConfig,
        preprocessor: Preprocessor,
        resources: &Resources,
        device: &Device,
    ) -> Result<Self> {
        config.validate()?;
        if !preprocessor.is_fixed() {
            return Err(Error::Config(
                "vocabularies must be fixed before building a model".to_string(),
            ));
        }
        if config.tagger.is_some() && preprocessor.tags().size() == NUM_RESERVED {
            return Err(Error::Config(
                "the tagger needs at least one tag in the training data".to_string(),
            ));
        }
        if let (Some(c), Some(table)) = (&config.morphlex, &resources.morphlex) {
            if table.dim() != c.n_hot_size {
                return Err(Error::Config(format!(
                    "lexicon vectors have {} features, the model expects {}",
                    table.dim(),
                    c.n_hot_size
                )));
            }
        }
        if let (Some(c), Some(table)) = (&config.pretrained, &resources.pretrained) {
            if table.dim() != c.dim {
                return Err(Error::Config(format!(
                    "pretrained vectors have dimension {}, the model expects {}",
                    table.dim(),
                    c.dim
                )));
            }
        }
        let dims = ModelDims::from_preprocessor(&preprocessor);
        let (varmap, model) = build(&config, &dims, device)?;
        let tables = [
            (model.pretrained_table_name(), &resources.pretrained, "pretrained embeddings"),
            (model.morphlex_table_name(), &resources.morphlex, "a morphological lexicon"),
        ];
        for (name, table, what) in tables.iter() {
            match (name, table) {
                (Some(name), Some(table)) => {
                    checkpoint::set_param(&varmap, name, &table_tensor(table, device)?)?
                }
                (Some(_), None) => {
                    return Err(Error::Config(format!("the model needs {}", what)));
                }
                _ => {}
            }
        }
        Ok(Tagger {
            model,
            varmap,
            config,
            preprocessor,
            device: device.clone(),
            contextual: None,
            logger: Logger::root(slog::Discard, o!()),
        })
    }

    /// Restores a model saved with `save`.
    pub fn load<P: AsRef<Path>>(path: P, device: &Device) -> Result<Self> {
        let (header, tensors) = checkpoint::load(path, device)?;
        let Header {
            config,
            preprocessor,
            ..
        } = header;
        config
            .validate()
            .map_err(|e| Error::Checkpoint(e.to_string()))?;
        let dims = ModelDims::from_preprocessor(&preprocessor);
        let (varmap, model) = build(&config, &dims, device)
            .map_err(|e| Error::Checkpoint(format!("cannot rebuild the model: {}", e)))?;
        checkpoint::restore(&varmap, &tensors)?;
        Ok(Tagger {
            model,
            varmap,
            config,
            preprocessor,
            device: device.clone(),
            contextual: None,
            logger: Logger::root(slog::Discard, o!()),
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let header = Header::new(self.config.clone(), self.preprocessor.clone());
        checkpoint::save(path.as_ref(), &self.varmap, &header)?;
        debug!(self.logger, "saved model"; "path" => %path.as_ref().display());
        Ok(())
    }

    /// Attaches the provider of contextual vectors the model was built for.
    pub fn with_contextual(mut self, embedder: Box<dyn ContextualEmbedder>) -> Result<Self> {
        match self.config.contextual {
            Some(ref c) if c.dim != embedder.dim() => {
                return Err(Error::Checkpoint(format!(
                    "contextual vectors have dimension {}, the model expects {}",
                    embedder.dim(),
                    c.dim
                )));
            }
            None => {
                return Err(Error::Config(
                    "the model takes no contextual vectors".to_string(),
                ));
            }
            _ => {}
        }
        self.contextual = Some(embedder);
        Ok(self)
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn model(&self) -> &ABLTagger {
        &self.model
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    fn check<S: AsRef<str>>(&self, forms: &[S], tags: Option<&[S]>) -> Result<()> {
        validate_tokens(forms.len(), self.config.max_sentence_len)?;
        if let Some(tags) = tags {
            if tags.len() != forms.len() {
                return Err(ValidationError::TagCountMismatch {
                    tokens: forms.len(),
                    tags: tags.len(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Padded tensors of `samples`, with contextual vectors when the model takes them.
    pub fn batch(&self, samples: &[&Sample]) -> Result<Batch> {
        let mut batch = Batch::from_samples(samples, &self.device)?;
        if let Some(ref c) = self.config.contextual {
            let embedder = self
                .contextual
                .as_ref()
                .ok_or_else(|| Error::Contextual("no contextual embedder attached".to_string()))?;
            let forms: Vec<&[String]> = samples.iter().map(|s| s.forms.as_slice()).collect();
            let vectors = embed_sentences(embedder.as_ref(), &forms)?;
            batch.set_contextual(&vectors, c.dim)?;
        }
        Ok(batch)
    }

    /// Mean loss of a batch of encoded samples.
    pub fn loss(&self, samples: &[&Sample], train: bool) -> Result<LossOutput> {
        let batch = self.batch(samples)?;
        Ok(self.model.loss(&batch, train)?)
    }

    /// Predicts tags and lemmas of encoded samples. Tags carried by the
    /// samples are used as given when `use_given_tags` is set.
    pub fn predict_samples(
        &self,
        samples: &[&Sample],
        use_given_tags: bool,
        lemmatize: bool,
    ) -> Result<Vec<Vec<Annotation>>> {
        let batch = self.batch(samples)?;
        let given = if use_given_tags { batch.tags.as_ref() } else { None };
        let prediction = self.model.predict(&batch, given, lemmatize)?;
        let tags: Vec<Option<Vec<String>>> = match prediction.tags {
            Some(tags) => tags
                .into_iter()
                .map(|ids| {
                    Some(
                        ids.into_iter()
                            .map(|id| {
                                self.preprocessor
                                    .decode_tag(id)
                                    .unwrap_or_default()
                                    .to_string()
                            })
                            .collect(),
                    )
                })
                .collect(),
            None => samples.iter().map(|_| None).collect(),
        };
        let lemmas: Vec<Option<Vec<LemmaPrediction>>> = match prediction.lemmas {
            Some(lemmas) => lemmas
                .into_iter()
                .zip(samples)
                .map(|(raw, sample)| {
                    Some(
                        raw.into_iter()
                            .zip(&sample.forms)
                            .map(|(r, form)| r.into_prediction(form, &self.preprocessor))
                            .collect(),
                    )
                })
                .collect(),
            None => samples.iter().map(|_| None).collect(),
        };
        Ok(samples
            .iter()
            .zip(tags)
            .zip(lemmas)
            .map(|((sample, tags), lemmas)| {
                let mut tags = tags.map(|t| t.into_iter());
                let mut lemmas = lemmas.map(|l| l.into_iter());
                sample
                    .forms
                    .iter()
                    .map(|form| Annotation {
                        form: form.clone(),
                        tag: tags.as_mut().and_then(|t| t.next()),
                        lemma: lemmas.as_mut().and_then(|l| l.next()),
                    })
                    .collect()
            })
            .collect())
    }

    fn run<T, S>(
        &self,
        sentences: &[T],
        tags: Option<&[T]>,
        batch_size: usize,
        lemmatize: bool,
    ) -> Result<Vec<Vec<Annotation>>>
    where
        T: AsRef<[S]>,
        S: AsRef<str>,
    {
        if let Some(tags) = tags {
            if tags.len() != sentences.len() {
                return Err(Error::Config(format!(
                    "got tags for {} sentences, expected {}",
                    tags.len(),
                    sentences.len()
                )));
            }
        }
        // reject malformed input before building any tensor
        for (i, sentence) in sentences.iter().enumerate() {
            self.check(sentence.as_ref(), tags.map(|t| t[i].as_ref()))?;
        }
        let samples: Vec<Sample> = sentences
            .iter()
            .enumerate()
            .map(|(i, s)| {
                self.preprocessor
                    .encode_forms(s.as_ref(), tags.map(|t| t[i].as_ref()))
            })
            .collect();
        debug!(self.logger, "annotating"; "sentences" => samples.len(), "batch_size" => batch_size);
        let refs: Vec<&Sample> = samples.iter().collect();
        let mut outputs = Vec::with_capacity(samples.len());
        for chunk in refs.chunks(batch_size.max(1)) {
            outputs.extend(self.predict_samples(chunk, tags.is_some(), lemmatize)?);
        }
        Ok(outputs)
    }

    fn require_tagger(&self) -> Result<()> {
        if self.model.has_tagger() {
            Ok(())
        } else {
            Err(Error::Config("the model has no tagger".to_string()))
        }
    }

    fn require_lemmatizer(&self) -> Result<()> {
        if self.model.has_lemmatizer() {
            Ok(())
        } else {
            Err(Error::Config("the model has no lemmatizer".to_string()))
        }
    }

    /// One tag per token.
    pub fn tag<S: AsRef<str>>(&self, sentence: &[S]) -> Result<Vec<String>> {
        let mut tags = self.tag_bulk(&[sentence], 1)?;
        Ok(tags.pop().unwrap_or_default())
    }

    /// Tags every sentence, keeping the input order.
    pub fn tag_bulk<T, S>(&self, sentences: &[T], batch_size: usize) -> Result<Vec<Vec<String>>>
    where
        T: AsRef<[S]>,
        S: AsRef<str>,
    {
        self.require_tagger()?;
        Ok(self
            .run(sentences, None, batch_size, false)?
            .into_iter()
            .map(|tokens| tokens.into_iter().filter_map(|a| a.tag).collect())
            .collect())
    }

    /// Lemmas of a sentence whose tags are known.
    pub fn lemmatize<S: AsRef<str>>(
        &self,
        sentence: &[S],
        tags: &[S],
    ) -> Result<Vec<LemmaPrediction>> {
        let mut lemmas = self.lemmatize_bulk(&[sentence], &[tags], 1)?;
        Ok(lemmas.pop().unwrap_or_default())
    }

    pub fn lemmatize_bulk<T, S>(
        &self,
        sentences: &[T],
        tags: &[T],
        batch_size: usize,
    ) -> Result<Vec<Vec<LemmaPrediction>>>
    where
        T: AsRef<[S]>,
        S: AsRef<str>,
    {
        self.require_lemmatizer()?;
        Ok(self
            .run(sentences, Some(tags), batch_size, true)?
            .into_iter()
            .map(|tokens| tokens.into_iter().filter_map(|a| a.lemma).collect())
            .collect())
    }

    /// Tags a sentence, then lemmatizes it with the predicted tags.
    pub fn annotate<S: AsRef<str>>(&self, sentence: &[S]) -> Result<Vec<Annotation>> {
        let mut annotations = self.annotate_bulk(&[sentence], 1)?;
        Ok(annotations.pop().unwrap_or_default())
    }

    pub fn annotate_bulk<T, S>(
        &self,
        sentences: &[T],
        batch_size: usize,
    ) -> Result<Vec<Vec<Annotation>>>
    where
        T: AsRef<[S]>,
        S: AsRef<str>,
    {
        self.run(sentences, None, batch_size, self.model.has_lemmatizer())
    }
}
