use std::borrow::Borrow;
use std::collections::HashMap;
use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

pub static PAD: &str = "<pad>";
pub static UNK: &str = "<unk>";
pub static SOS: &str = "<s>";
pub static EOS: &str = "</s>";

pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;
pub const SOS_ID: u32 = 2;
pub const EOS_ID: u32 = 3;
pub const NUM_RESERVED: usize = 4;

const DEFAULT_CAPACITY: usize = 32;

/// A bidirectional symbol/index mapping.
///
/// Indices `0..4` always hold `PAD`, `UNK`, `SOS` and `EOS`. Other symbols
/// follow in the order they were first added, so rebuilding a vocabulary
/// from its serialized symbol list reproduces every index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VocabRepr", into = "VocabRepr")]
pub struct Vocab {
    s2i: HashMap<String, u32>,
    i2s: Vec<String>,
    freq: Vec<u32>,
}

impl Vocab {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut v = Vocab {
            s2i: HashMap::with_capacity(capacity + NUM_RESERVED),
            i2s: Vec::with_capacity(capacity + NUM_RESERVED),
            freq: Vec::with_capacity(capacity + NUM_RESERVED),
        };
        for symbol in &[PAD, UNK, SOS, EOS] {
            v.insert(symbol.to_string(), 0);
        }
        v
    }

    pub fn from_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut v = Vocab::new();
        for symbol in symbols {
            v.add(symbol);
        }
        v
    }

    fn insert(&mut self, symbol: String, freq: u32) -> u32 {
        let id = self.i2s.len() as u32;
        self.s2i.insert(symbol.clone(), id);
        self.i2s.push(symbol);
        self.freq.push(freq);
        id
    }

    /// Adds one occurrence of `symbol` and returns its index.
    pub fn add<S: Into<String>>(&mut self, symbol: S) -> u32 {
        let symbol = symbol.into();
        if let Some(&id) = self.s2i.get(&symbol) {
            if !Self::is_reserved(id) {
                self.freq[id as usize] += 1;
            }
            return id;
        }
        self.insert(symbol, 1)
    }

    /// Index of `symbol`, `UNK_ID` when it is not in the vocabulary.
    pub fn encode<Q: Borrow<str> + ?Sized>(&self, symbol: &Q) -> u32 {
        self.get(symbol).unwrap_or(UNK_ID)
    }

    pub fn get<Q: Borrow<str> + ?Sized>(&self, symbol: &Q) -> Option<u32> {
        self.s2i.get(symbol.borrow()).copied()
    }

    pub fn decode(&self, id: u32) -> Option<&str> {
        self.i2s.get(id as usize).map(|s| s.as_str())
    }

    pub fn contains<Q: Borrow<str> + ?Sized>(&self, symbol: &Q) -> bool {
        self.s2i.contains_key(symbol.borrow())
    }

    pub fn freq(&self, id: u32) -> Option<u32> {
        self.freq.get(id as usize).copied()
    }

    pub fn size(&self) -> usize {
        self.i2s.len()
    }

    pub fn symbols(&self) -> &[String] {
        &self.i2s
    }

    #[inline]
    pub fn is_reserved(id: u32) -> bool {
        (id as usize) < NUM_RESERVED
    }
}

impl Default for Vocab {
    fn default() -> Self {
        Vocab::new()
    }
}

#[derive(Serialize, Deserialize)]
struct VocabRepr {
    symbols: Vec<String>,
    freq: Vec<u32>,
}

impl From<Vocab> for VocabRepr {
    fn from(v: Vocab) -> Self {
        VocabRepr {
            symbols: v.i2s,
            freq: v.freq,
        }
    }
}

impl TryFrom<VocabRepr> for Vocab {
    type Error = String;

    fn try_from(repr: VocabRepr) -> Result<Self, Self::Error> {
        let reserved = [PAD, UNK, SOS, EOS];
        if repr.symbols.len() < NUM_RESERVED
            || repr.symbols[..NUM_RESERVED]
                .iter()
                .zip(reserved.iter())
                .any(|(s, r)| s != r)
        {
            return Err("vocabulary does not start with the reserved symbols".to_string());
        }
        if repr.freq.len() != repr.symbols.len() {
            return Err(format!(
                "vocabulary has {} symbols but {} frequencies",
                repr.symbols.len(),
                repr.freq.len()
            ));
        }
        let mut v = Vocab {
            s2i: HashMap::with_capacity(repr.symbols.len()),
            i2s: Vec::with_capacity(repr.symbols.len()),
            freq: Vec::with_capacity(repr.symbols.len()),
        };
        for (symbol, freq) in repr.symbols.into_iter().zip(repr.freq) {
            if v.s2i.contains_key(&symbol) {
                return Err(format!("duplicate vocabulary symbol `{}`", symbol));
            }
            v.insert(symbol, freq);
        }
        Ok(v)
    }
}

/// Counts symbols before a vocabulary is frozen with a frequency threshold.
#[derive(Debug, Clone, Default)]
pub struct VocabBuilder {
    counts: HashMap<String, u32>,
    order: Vec<String>,
}

impl VocabBuilder {
    pub fn new() -> Self {
        VocabBuilder::default()
    }

    pub fn add<S: AsRef<str>>(&mut self, symbol: S) {
        let symbol = symbol.as_ref();
        match self.counts.get_mut(symbol) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(symbol.to_string(), 1);
                self.order.push(symbol.to_string());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Keeps symbols seen at least `min_freq` times, in first-occurrence order.
    pub fn build(&self, min_freq: u32) -> Vocab {
        let mut v = Vocab::with_capacity(self.order.len());
        for symbol in &self.order {
            let count = self.counts[symbol];
            if count >= min_freq && !v.contains(symbol.as_str()) {
                v.insert(symbol.clone(), count);
            }
        }
        v
    }
}
