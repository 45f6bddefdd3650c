//! Labeled sentences, one token per line as `form[\ttag[\tlemma]]`, with
//! sentences separated by blank lines.

use std::fs::File;
use std::io as std_io;
use std::path::Path;

use crate::io as mod_io;
use crate::lang::{Phrasal, Sentence, Token, Tokenized};

static FIELD_DELIMITER: char = '\t';

impl mod_io::FromLine for Token {
    type Err = std_io::Error;

    fn from_line(line: &str) -> Result<Token, Self::Err> {
        let mut cols = line.split(FIELD_DELIMITER);
        let form = match cols.next() {
            Some(form) if !form.is_empty() => form,
            _ => {
                return Err(std_io::Error::new(
                    std_io::ErrorKind::InvalidData,
                    "token line has an empty form",
                ))
            }
        };
        let tag = cols.next();
        let lemma = cols.next();
        if cols.next().is_some() {
            return Err(std_io::Error::new(
                std_io::ErrorKind::InvalidData,
                "token line has more than 3 fields",
            ));
        }
        Ok(Token::new(form, tag, lemma))
    }
}

pub fn read_upto<R, S>(
    reader: &mut R,
    lineno: &mut usize,
    num: usize,
    buf: &mut Vec<S>,
) -> std_io::Result<usize>
where
    R: std_io::BufRead,
    S: Phrasal<Token = Token>,
{
    let mut count = 0;
    let mut line = String::new();
    let mut tokens = vec![];
    while count < num {
        match reader.read_line(&mut line) {
            Ok(0) => {
                if !tokens.is_empty() {
                    buf.push(S::from_tokens(tokens));
                    count += 1;
                }
                break;
            }
            Ok(_) => {
                *lineno += 1;
                let line_trimmed = line.trim_end_matches(&['\r', '\n'][..]);
                if line_trimmed.trim().is_empty() {
                    if !tokens.is_empty() {
                        buf.push(S::from_tokens(tokens));
                        tokens = vec![];
                        count += 1;
                    }
                } else {
                    let token = <Token as mod_io::FromLine>::from_line(line_trimmed)
                        .map_err(|e| mod_io::invalid_data(*lineno, e))?;
                    tokens.push(token);
                }
            }
            Err(ref e) if e.kind() == std_io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
        line.clear();
    }
    Ok(count)
}

pub type Reader<R> = mod_io::Reader<R, Sentence>;

impl<R: std_io::BufRead> mod_io::Read for Reader<R> {
    type Item = Sentence;

    fn read_upto(&mut self, num: usize, buf: &mut Vec<Self::Item>) -> std_io::Result<usize> {
        let (inner, lineno) = self.parts_mut();
        read_upto(inner, lineno, num, buf)
    }
}

/// Reads every sentence of a file.
pub fn read_file<P: AsRef<Path>>(path: P) -> std_io::Result<Vec<Sentence>> {
    use crate::io::{FileOpen, Read};

    let mut reader = Reader::<std_io::BufReader<File>>::open(path)?;
    let mut buf = vec![];
    reader.read(&mut buf)?;
    Ok(buf)
}

#[derive(Debug)]
pub struct Writer<W> {
    inner: W,
}

impl<W: std_io::Write> Writer<W> {
    pub fn new(inner: W) -> Self {
        Writer { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_sentence(&mut self, sentence: &Sentence) -> std_io::Result<()> {
        for token in sentence {
            write!(self.inner, "{}", token.form())?;
            if let Some(tag) = token.tag() {
                write!(self.inner, "{}{}", FIELD_DELIMITER, tag)?;
                if let Some(lemma) = token.lemma() {
                    write!(self.inner, "{}{}", FIELD_DELIMITER, lemma)?;
                }
            }
            writeln!(self.inner)?;
        }
        writeln!(self.inner)
    }
}

impl Writer<std_io::BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> std_io::Result<Self> {
        Ok(Writer::new(std_io::BufWriter::new(File::create(path)?)))
    }
}

impl<W: std_io::Write> mod_io::Write for Writer<W> {
    type Item = Sentence;

    fn write(&mut self, buf: &[Self::Item]) -> std_io::Result<usize> {
        for sentence in buf {
            self.write_sentence(sentence)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std_io::Result<()> {
        self.inner.flush()
    }
}
