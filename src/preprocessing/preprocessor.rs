use serde::{Deserialize, Serialize};

use crate::config::{CoarseScheme, LemmaMode, ModelConfig};
use crate::lang::{Phrasal, Sentence, Tokenized};
use crate::preprocessing::{EditRule, Preprocess, Vocab, VocabBuilder, PAD_ID, UNK_ID};

/// One sentence mapped to vocabulary indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub forms: Vec<String>,
    pub words: Option<Vec<u32>>,
    pub pretrained: Option<Vec<u32>>,
    pub morphlex: Option<Vec<u32>>,
    /// Character ids per token; a token without characters holds a single `PAD_ID`.
    pub chars: Vec<Vec<u32>>,
    pub tags: Option<Vec<u32>>,
    pub coarse_tags: Option<Vec<u32>>,
    /// Character ids of each gold lemma, without `EOS`.
    pub lemmas: Option<Vec<Vec<u32>>>,
    pub rules: Option<Vec<u32>>,
}

impl Sample {
    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
struct Builders {
    words: VocabBuilder,
    chars: VocabBuilder,
    tags: VocabBuilder,
    coarse_tags: VocabBuilder,
    rules: VocabBuilder,
}

/// Holds every vocabulary a model needs and encodes sentences with them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preprocessor {
    words: Option<Vocab>,
    pretrained: Option<Vocab>,
    morphlex: Option<Vocab>,
    chars: Vocab,
    tags: Vocab,
    coarse_tags: Vocab,
    rules: Option<Vocab>,
    coarse_scheme: CoarseScheme,
    min_word_freq: u32,
    #[serde(skip)]
    fitting: Option<Builders>,
}

impl Preprocessor {
    pub fn new(config: &ModelConfig, min_word_freq: u32) -> Self {
        Preprocessor {
            words: config.word_embed_size.map(|_| Vocab::new()),
            pretrained: None,
            morphlex: None,
            chars: Vocab::new(),
            tags: Vocab::new(),
            coarse_tags: Vocab::new(),
            rules: match config.lemma_mode() {
                Some(LemmaMode::EditRule) => Some(Vocab::new()),
                _ => None,
            },
            coarse_scheme: config.coarse_scheme(),
            min_word_freq: min_word_freq.max(1),
            fitting: Some(Builders::default()),
        }
    }

    /// Vocabulary of a pretrained embedding table; it is never refitted.
    pub fn set_pretrained(&mut self, vocab: Vocab) {
        self.pretrained = Some(vocab);
    }

    pub fn set_morphlex(&mut self, vocab: Vocab) {
        self.morphlex = Some(vocab);
    }

    /// Seeds the character vocabulary, e.g. from a list of known characters.
    pub fn add_chars<I: IntoIterator<Item = char>>(&mut self, chars: I) {
        // a fixed vocabulary never changes its indices
        let builders = match self.fitting.as_mut() {
            Some(builders) => builders,
            None => return,
        };
        for c in chars {
            let mut buf = [0u8; 4];
            builders.chars.add(c.encode_utf8(&mut buf));
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.fitting.is_none()
    }

    pub fn words(&self) -> Option<&Vocab> {
        self.words.as_ref()
    }

    pub fn pretrained(&self) -> Option<&Vocab> {
        self.pretrained.as_ref()
    }

    pub fn morphlex(&self) -> Option<&Vocab> {
        self.morphlex.as_ref()
    }

    pub fn chars(&self) -> &Vocab {
        &self.chars
    }

    pub fn tags(&self) -> &Vocab {
        &self.tags
    }

    pub fn coarse_tags(&self) -> &Vocab {
        &self.coarse_tags
    }

    pub fn rules(&self) -> Option<&Vocab> {
        self.rules.as_ref()
    }

    pub fn coarse_scheme(&self) -> CoarseScheme {
        self.coarse_scheme
    }

    /// Coarse category index of every tag index. Reserved tags map to `UNK_ID`.
    pub fn coarse_of_tags(&self) -> Vec<u32> {
        self.tags
            .symbols()
            .iter()
            .enumerate()
            .map(|(i, tag)| {
                if Vocab::is_reserved(i as u32) {
                    UNK_ID
                } else {
                    self.coarse_tags.encode(self.coarse_scheme.coarse(tag))
                }
            })
            .collect()
    }

    /// Whether a token form was seen when the token vocabulary was built.
    pub fn is_known(&self, form: &str) -> bool {
        match (&self.words, &self.pretrained) {
            (Some(words), _) => words.contains(form),
            (None, Some(pretrained)) => pretrained.contains(form),
            (None, None) => false,
        }
    }

    pub fn encode_chars(&self, text: &str) -> Vec<u32> {
        let mut buf = [0u8; 4];
        text.chars()
            .map(|c| self.chars.encode(&*c.encode_utf8(&mut buf)))
            .collect()
    }

    pub fn decode_chars(&self, ids: &[u32]) -> String {
        ids.iter()
            .filter(|&&id| !Vocab::is_reserved(id))
            .filter_map(|&id| self.chars.decode(id))
            .collect()
    }

    pub fn encode_tag(&self, tag: &str) -> (u32, u32) {
        (
            self.tags.encode(tag),
            self.coarse_tags.encode(self.coarse_scheme.coarse(tag)),
        )
    }

    pub fn decode_tag(&self, id: u32) -> Option<&str> {
        self.tags.decode(id)
    }

    pub fn decode_rule(&self, id: u32) -> Option<EditRule> {
        self.rules
            .as_ref()
            .and_then(|rules| rules.decode(id))
            .and_then(|s| s.parse().ok())
    }

    /// Encodes a sentence from its forms and, optionally, given tags.
    pub fn encode_forms<S: AsRef<str>>(&self, forms: &[S], tags: Option<&[S]>) -> Sample {
        let mut sentence = Sentence::from_forms(forms);
        if let Some(tags) = tags {
            for (token, tag) in sentence.tokens_mut().iter_mut().zip(tags) {
                token.set_tag(tag.as_ref());
            }
        }
        self.transform_each(sentence)
    }
}

impl Preprocess<Sentence> for Preprocessor {
    type Output = Sample;

    fn fit_each(&mut self, x: &Sentence) {
        let scheme = self.coarse_scheme;
        let with_rules = self.rules.is_some();
        let builders = match self.fitting.as_mut() {
            Some(builders) => builders,
            None => return,
        };
        for token in x.tokens() {
            let form = token.form();
            builders.words.add(form);
            let mut buf = [0u8; 4];
            for c in form.chars() {
                builders.chars.add(c.encode_utf8(&mut buf));
            }
            if let Some(tag) = token.tag() {
                builders.tags.add(tag);
                builders.coarse_tags.add(scheme.coarse(tag));
            }
            if let Some(lemma) = token.lemma() {
                for c in lemma.chars() {
                    builders.chars.add(c.encode_utf8(&mut buf));
                }
                if with_rules {
                    builders.rules.add(EditRule::derive(form, lemma).to_string());
                }
            }
        }
    }

    fn fix(&mut self) {
        if let Some(builders) = self.fitting.take() {
            if self.words.is_some() {
                self.words = Some(builders.words.build(self.min_word_freq));
            }
            self.chars = builders.chars.build(1);
            self.tags = builders.tags.build(1);
            self.coarse_tags = builders.coarse_tags.build(1);
            if self.rules.is_some() {
                self.rules = Some(builders.rules.build(1));
            }
        }
    }

    fn transform_each(&self, x: Sentence) -> Sample {
        let forms: Vec<String> = x.iter().map(|t| t.form().to_string()).collect();
        let lookup = |vocab: &Option<Vocab>| {
            vocab
                .as_ref()
                .map(|v| forms.iter().map(|f| v.encode(f.as_str())).collect())
        };
        let chars = forms
            .iter()
            .map(|f| {
                let ids = self.encode_chars(f);
                if ids.is_empty() {
                    vec![PAD_ID]
                } else {
                    ids
                }
            })
            .collect();
        let (tags, coarse_tags) = match x.tags() {
            Some(tags) => {
                let (t, c) = tags.iter().map(|tag| self.encode_tag(tag)).unzip();
                (Some(t), Some(c))
            }
            None => (None, None),
        };
        let lemmas = x
            .lemmas()
            .map(|lemmas| lemmas.iter().map(|l| self.encode_chars(l)).collect());
        let rules = match (&self.rules, x.lemmas()) {
            (Some(rules), Some(lemmas)) => Some(
                forms
                    .iter()
                    .zip(lemmas)
                    .map(|(f, l)| rules.encode(EditRule::derive(f, l).to_string().as_str()))
                    .collect(),
            ),
            _ => None,
        };
        Sample {
            words: lookup(&self.words),
            pretrained: lookup(&self.pretrained),
            morphlex: lookup(&self.morphlex),
            chars,
            tags,
            coarse_tags,
            lemmas,
            rules,
            forms,
        }
    }
}
