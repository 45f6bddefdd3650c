use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, AddAssign};

use crate::api::Tagger;
use crate::error::Result;
use crate::lang::{validate_tokens, Phrasal, Sentence, Tokenized};
use crate::preprocessing::{Preprocess, Preprocessor, Sample, Vocab};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accuracy {
    pub correct: usize,
    pub total: usize,
}

impl Accuracy {
    pub fn new(correct: usize, total: usize) -> Self {
        Accuracy { correct, total }
    }

    pub fn count(&mut self, correct: bool) {
        self.total += 1;
        if correct {
            self.correct += 1;
        }
    }

    /// `None` when nothing was counted.
    pub fn value(&self) -> Option<f32> {
        if self.total > 0 {
            Some(self.correct as f32 / self.total as f32)
        } else {
            None
        }
    }
}

impl Add for Accuracy {
    type Output = Accuracy;

    fn add(self, other: Accuracy) -> Accuracy {
        Accuracy::new(self.correct + other.correct, self.total + other.total)
    }
}

impl AddAssign for Accuracy {
    fn add_assign(&mut self, other: Accuracy) {
        self.correct += other.correct;
        self.total += other.total;
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.value() {
            Some(v) => write!(f, "{:.2}% ({}/{})", v * 100.0, self.correct, self.total),
            None => write!(f, "NaN (0/0)"),
        }
    }
}

/// Accuracy over all tokens, and separately over tokens seen and unseen in training.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitAccuracy {
    pub total: Accuracy,
    pub known: Accuracy,
    pub unknown: Accuracy,
}

impl SplitAccuracy {
    pub fn count(&mut self, known: bool, correct: bool) {
        self.total.count(correct);
        if known {
            self.known.count(correct);
        } else {
            self.unknown.count(correct);
        }
    }
}

impl fmt::Display for SplitAccuracy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "total: {}, known: {}, unknown: {}",
            self.total, self.known, self.unknown
        )
    }
}

/// Which external vocabularies contain a token form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    Both,
    Morphlex,
    Pretrained,
    Neither,
}

/// Vocabularies outside the training data that still cover some unknown tokens.
#[derive(Debug, Clone, Default)]
pub struct ExternalVocabularies {
    pub morphlex: Option<Vocab>,
    pub pretrained: Option<Vocab>,
}

impl ExternalVocabularies {
    pub fn new(morphlex: Option<Vocab>, pretrained: Option<Vocab>) -> Self {
        ExternalVocabularies {
            morphlex,
            pretrained,
        }
    }

    /// The lexicon and pretrained vocabularies a model was built with.
    pub fn from_preprocessor(preprocessor: &Preprocessor) -> Self {
        ExternalVocabularies::new(
            preprocessor.morphlex().cloned(),
            preprocessor.pretrained().cloned(),
        )
    }

    pub fn coverage(&self, form: &str) -> Coverage {
        let contains = |vocab: &Option<Vocab>| vocab.as_ref().map_or(false, |v| v.contains(form));
        match (contains(&self.morphlex), contains(&self.pretrained)) {
            (true, true) => Coverage::Both,
            (true, false) => Coverage::Morphlex,
            (false, true) => Coverage::Pretrained,
            (false, false) => Coverage::Neither,
        }
    }
}

/// Accuracy on tokens unseen in training, split by external coverage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoverageAccuracy {
    pub both: Accuracy,
    pub morphlex: Accuracy,
    pub pretrained: Accuracy,
    pub neither: Accuracy,
}

impl CoverageAccuracy {
    pub fn count(&mut self, coverage: Coverage, correct: bool) {
        match coverage {
            Coverage::Both => self.both.count(correct),
            Coverage::Morphlex => self.morphlex.count(correct),
            Coverage::Pretrained => self.pretrained.count(correct),
            Coverage::Neither => self.neither.count(correct),
        }
    }
}

impl fmt::Display for CoverageAccuracy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "both: {}, morphlex: {}, pretrained: {}, neither: {}",
            self.both, self.morphlex, self.pretrained, self.neither
        )
    }
}

/// Counts of `(gold, predicted)` pairs that disagree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    errors: HashMap<(String, String), usize>,
}

impl Profile {
    pub fn add(&mut self, gold: &str, predicted: &str) {
        if gold != predicted {
            *self
                .errors
                .entry((gold.to_string(), predicted.to_string()))
                .or_insert(0) += 1;
        }
    }

    /// Number of errors counted.
    pub fn total(&self) -> usize {
        self.errors.values().sum()
    }

    /// The `n` most frequent errors as `(gold, predicted, count)`, most frequent first.
    pub fn most_common(&self, n: usize) -> Vec<(&str, &str, usize)> {
        let mut errors: Vec<(&str, &str, usize)> = self
            .errors
            .iter()
            .map(|((gold, predicted), &count)| (gold.as_str(), predicted.as_str(), count))
            .collect();
        errors.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| (a.0, a.1).cmp(&(b.0, b.1))));
        errors.truncate(n);
        errors
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaggingEvaluation {
    pub accuracy: SplitAccuracy,
    pub unknown_coverage: CoverageAccuracy,
    pub profile: Profile,
}

impl TaggingEvaluation {
    pub fn add(&mut self, known: bool, coverage: Coverage, predicted: &str, gold: &str) {
        let correct = predicted == gold;
        self.accuracy.count(known, correct);
        if !known {
            self.unknown_coverage.count(coverage, correct);
        }
        self.profile.add(gold, predicted);
    }
}

#[derive(Debug, Clone, Default)]
pub struct LemmaEvaluation {
    pub accuracy: SplitAccuracy,
    /// Predictions cut at the length bound.
    pub truncated: usize,
    pub profile: Profile,
}

impl LemmaEvaluation {
    pub fn add(&mut self, known: bool, predicted: &str, gold: &str, truncated: bool) {
        self.accuracy.count(known, predicted == gold);
        if truncated {
            self.truncated += 1;
        }
        self.profile.add(gold, predicted);
    }
}

/// Tokens counted by whether their tag and their lemma are right.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Confusion {
    pub both_right: usize,
    pub tag_right: usize,
    pub lemma_right: usize,
    pub both_wrong: usize,
}

impl Confusion {
    pub fn count(&mut self, tag_correct: bool, lemma_correct: bool) {
        match (tag_correct, lemma_correct) {
            (true, true) => self.both_right += 1,
            (true, false) => self.tag_right += 1,
            (false, true) => self.lemma_right += 1,
            (false, false) => self.both_wrong += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.both_right + self.tag_right + self.lemma_right + self.both_wrong
    }
}

impl fmt::Display for Confusion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "\tlemma right\tlemma wrong")?;
        writeln!(f, "tag right\t{}\t{}", self.both_right, self.tag_right)?;
        write!(f, "tag wrong\t{}\t{}", self.lemma_right, self.both_wrong)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EvaluationReport {
    pub tagging: Option<TaggingEvaluation>,
    pub lemmatization: Option<LemmaEvaluation>,
    /// Present when both tags and lemmas were evaluated.
    pub confusion: Option<Confusion>,
}

/// Compares predictions on gold sentences. Lemmas are produced from the
/// predicted tags, as they would be at annotation time.
pub fn evaluate(
    tagger: &Tagger,
    sentences: &[Sentence],
    batch_size: usize,
) -> Result<EvaluationReport> {
    let external = ExternalVocabularies::from_preprocessor(tagger.preprocessor());
    evaluate_with(tagger, sentences, batch_size, &external)
}

/// Like `evaluate`, splitting unknown tokens by the coverage of `external`.
pub fn evaluate_with(
    tagger: &Tagger,
    sentences: &[Sentence],
    batch_size: usize,
    external: &ExternalVocabularies,
) -> Result<EvaluationReport> {
    let max_len = tagger.config().max_sentence_len;
    for sentence in sentences {
        validate_tokens(sentence.len(), max_len)?;
    }
    let preprocessor = tagger.preprocessor();
    let samples: Vec<Sample> = sentences
        .iter()
        .map(|s| preprocessor.transform_each(s.clone()))
        .collect();
    let refs: Vec<&Sample> = samples.iter().collect();
    let with_tags = tagger.model().has_tagger() && sentences.iter().all(|s| s.tags().is_some());
    let with_lemmas =
        tagger.model().has_lemmatizer() && sentences.iter().all(|s| s.lemmas().is_some());

    let mut tagging = TaggingEvaluation::default();
    let mut lemmatization = LemmaEvaluation::default();
    let mut confusion = Confusion::default();
    let mut offset = 0;
    for chunk in refs.chunks(batch_size.max(1)) {
        let outputs = tagger.predict_samples(chunk, false, with_lemmas)?;
        for (annotations, sentence) in outputs.iter().zip(&sentences[offset..]) {
            for (annotation, token) in annotations.iter().zip(sentence.tokens()) {
                let known = preprocessor.is_known(token.form());
                let mut tag_correct = None;
                if let (true, Some(predicted), Some(gold)) =
                    (with_tags, &annotation.tag, token.tag())
                {
                    let coverage = external.coverage(token.form());
                    tagging.add(known, coverage, predicted, gold);
                    tag_correct = Some(predicted == gold);
                }
                if let (true, Some(predicted), Some(gold)) =
                    (with_lemmas, &annotation.lemma, token.lemma())
                {
                    lemmatization.add(known, &predicted.lemma, gold, predicted.truncated);
                    if let Some(tag_correct) = tag_correct {
                        confusion.count(tag_correct, predicted.lemma == gold);
                    }
                }
            }
        }
        offset += chunk.len();
    }
    Ok(EvaluationReport {
        tagging: if with_tags { Some(tagging) } else { None },
        lemmatization: if with_lemmas { Some(lemmatization) } else { None },
        confusion: if with_tags && with_lemmas {
            Some(confusion)
        } else {
            None
        },
    })
}
