use std::collections::HashSet;
use std::fs::File;
use std::io::{self as std_io, BufRead, Write};
use std::path::Path;
use std::str::FromStr;

use rand::Rng;

use crate::preprocessing::{Vocab, NUM_RESERVED};

/// Layout of an embedding file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `word v1 v2 ...`, optionally preceded by a `count dim` header.
    Text,
    /// `word;[v1,v2,...]`, as morphological lexicon dumps are written.
    Bracketed,
}

impl FromStr for Format {
    type Err = std_io::Error;

    fn from_str(s: &str) -> std_io::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Format::Text),
            "bracketed" | "morphlex" => Ok(Format::Bracketed),
            _ => Err(std_io::Error::new(
                std_io::ErrorKind::InvalidInput,
                format!("unknown embedding format `{}`", s),
            )),
        }
    }
}

/// A vocabulary with one vector per entry, reserved entries included.
#[derive(Debug, Clone)]
pub struct Embeddings {
    vocab: Vocab,
    dim: usize,
    values: Vec<f32>,
}

const DEFAULT_CAPACITY: usize = 400000;

impl Embeddings {
    pub fn new(vocab: Vocab, dim: usize, values: Vec<f32>) -> std_io::Result<Self> {
        if values.len() != vocab.size() * dim {
            return Err(std_io::Error::new(
                std_io::ErrorKind::InvalidInput,
                format!(
                    "{} values do not fill {} entries of dimension {}",
                    values.len(),
                    vocab.size(),
                    dim
                ),
            ));
        }
        Ok(Embeddings { vocab, dim, values })
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vocab.size()
    }

    pub fn is_empty(&self) -> bool {
        self.vocab.size() == NUM_RESERVED
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn get(&self, id: u32) -> Option<&[f32]> {
        let start = id as usize * self.dim;
        self.values.get(start..start + self.dim)
    }

    /// Vector of `word`; unknown words get the `UNK` row.
    pub fn lookup(&self, word: &str) -> &[f32] {
        let start = self.vocab.encode(word) as usize * self.dim;
        &self.values[start..start + self.dim]
    }

    /// Fills the `UNK` row with uniform noise in `[-scale, scale)`.
    pub fn randomize_unknown<R: Rng>(&mut self, rng: &mut R, scale: f32) {
        let start = crate::preprocessing::UNK_ID as usize * self.dim;
        for v in &mut self.values[start..start + self.dim] {
            *v = rng.gen_range(-scale..scale);
        }
    }
}

fn reader<P: AsRef<Path>>(file: P) -> std_io::Result<csv::Reader<File>> {
    Ok(csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b' ')
        .quoting(false)
        .flexible(true)
        .from_reader(File::open(file)?))
}

fn invalid(line: u64, message: String) -> std_io::Error {
    std_io::Error::new(
        std_io::ErrorKind::InvalidData,
        format!("line {}: {}", line, message),
    )
}

fn parse_value(field: &str, line: u64) -> std_io::Result<f32> {
    field
        .trim()
        .parse::<f32>()
        .map_err(|e| invalid(line, format!("invalid value `{}`: {}", field, e)))
}

/// `count dim` line at the top of a text embedding file.
fn is_header<'a, I: Iterator<Item = &'a str>>(mut fields: I) -> bool {
    matches!(
        (fields.next(), fields.next(), fields.next()),
        (Some(count), Some(dim), None) if count.parse::<usize>().is_ok() && dim.parse::<usize>().is_ok()
    )
}

/// Splits `word;[v1,v2,...]` at the last `;` that opens the vector, so
/// the word itself may contain `;`.
fn split_bracketed(text: &str) -> Option<(&str, &str)> {
    let at = text.rfind(";[")?;
    Some((&text[..at], &text[at + 1..]))
}

fn parse_bracketed(text: &str, line: u64) -> std_io::Result<(&str, Vec<f32>)> {
    let malformed = || invalid(line, "expected `word;[v1,v2,...]`".to_string());
    let (word, body) = split_bracketed(text).ok_or_else(malformed)?;
    let body = body
        .trim()
        .strip_prefix('[')
        .and_then(|b| b.strip_suffix(']'))
        .ok_or_else(malformed)?;
    let vector = body
        .split(',')
        .filter(|f| !f.trim().is_empty())
        .map(|f| parse_value(f, line))
        .collect::<std_io::Result<_>>()?;
    Ok((word, vector))
}

/// First field of an embedding line: the word it holds a vector for.
fn word_of(text: &str, format: Format) -> Option<&str> {
    match format {
        Format::Text => text.split(' ').next(),
        Format::Bracketed => split_bracketed(text).map(|(word, _)| word),
    }
}

struct TableBuilder {
    vocab: Vocab,
    values: Vec<f32>,
    dim: Option<usize>,
}

impl TableBuilder {
    fn new() -> Self {
        TableBuilder {
            vocab: Vocab::with_capacity(DEFAULT_CAPACITY),
            values: Vec::new(),
            dim: None,
        }
    }

    fn push(&mut self, word: &str, vector: Vec<f32>, line: u64) -> std_io::Result<()> {
        if word.is_empty() {
            return Ok(());
        }
        let values = &mut self.values;
        let d = *self.dim.get_or_insert_with(|| {
            values.resize(NUM_RESERVED * vector.len(), 0.0);
            vector.len()
        });
        if vector.len() != d || d == 0 {
            return Err(invalid(
                line,
                format!("expected {} values, found {}", d, vector.len()),
            ));
        }
        if self.vocab.contains(word) {
            return Ok(());
        }
        self.vocab.add(word);
        self.values.extend(vector);
        Ok(())
    }

    fn build(self) -> std_io::Result<Embeddings> {
        let dim = self.dim.ok_or_else(|| {
            std_io::Error::new(std_io::ErrorKind::InvalidData, "embedding file has no entries")
        })?;
        Embeddings::new(self.vocab, dim, self.values)
    }
}

/// Loads an embedding file. Reserved rows are zero; a word listed twice
/// keeps its first vector.
pub fn load_embeddings<P: AsRef<Path>>(file: P, format: Format) -> std_io::Result<Embeddings> {
    let mut builder = TableBuilder::new();
    match format {
        Format::Text => {
            for (i, result) in reader(file)?.records().enumerate() {
                let record = result?;
                let line = record.position().map(|p| p.line()).unwrap_or(i as u64 + 1);
                let fields: Vec<&str> = record.iter().filter(|f| !f.is_empty()).collect();
                if i == 0 && is_header(fields.iter().copied()) {
                    continue;
                }
                let (word, rest) = match fields.split_first() {
                    Some(split) => split,
                    None => continue,
                };
                let vector = rest
                    .iter()
                    .map(|f| parse_value(f, line))
                    .collect::<std_io::Result<_>>()?;
                builder.push(word, vector, line)?;
            }
        }
        Format::Bracketed => {
            let reader = std_io::BufReader::new(File::open(file)?);
            for (i, result) in reader.lines().enumerate() {
                let text = result?;
                let text = text.trim_end_matches('\r');
                if text.trim().is_empty() {
                    continue;
                }
                let line = i as u64 + 1;
                let (word, vector) = parse_bracketed(text, line)?;
                builder.push(word, vector, line)?;
            }
        }
    }
    builder.build()
}

/// Copies the lines of an embedding file whose word is in `keep` to
/// `output`, unchanged. Returns the number of lines written.
pub fn filter_embeddings<R, W>(
    input: R,
    mut output: W,
    format: Format,
    keep: &HashSet<String>,
) -> std_io::Result<usize>
where
    R: BufRead,
    W: Write,
{
    let mut written = 0;
    for (i, result) in input.lines().enumerate() {
        let text = result?;
        if i == 0 && format == Format::Text && is_header(text.split_whitespace()) {
            continue;
        }
        match word_of(&text, format) {
            Some(word) if keep.contains(word) => {
                writeln!(output, "{}", text)?;
                written += 1;
            }
            _ => {}
        }
    }
    output.flush()?;
    Ok(written)
}
