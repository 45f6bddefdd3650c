use std::error;
use std::fs::File;
use std::io;
use std::marker::PhantomData;
use std::path::Path;

pub mod checkpoint;
pub mod embedding;
pub mod serialize;
pub mod tsv;

pub trait Read {
    type Item;

    fn read(&mut self, buf: &mut Vec<Self::Item>) -> io::Result<usize> {
        self.read_upto(usize::MAX, buf)
    }

    fn read_upto(&mut self, num: usize, buf: &mut Vec<Self::Item>) -> io::Result<usize>;
}

pub trait Write {
    type Item;

    fn write(&mut self, buf: &[Self::Item]) -> io::Result<usize>;

    fn flush(&mut self) -> io::Result<()>;
}

pub trait FileOpen: Sized {
    fn open<P: AsRef<Path>>(path: P) -> io::Result<Self>;
}

pub trait FromLine: Sized {
    type Err: Into<Box<dyn error::Error + Send + Sync>>;

    fn from_line(line: &str) -> Result<Self, Self::Err>;
}

#[derive(Debug)]
pub struct Reader<R, T> {
    inner: R,
    line: usize,
    _phantom: PhantomData<T>,
}

impl<R: io::Read, T> Reader<R, T> {
    pub fn new(inner: R) -> Self {
        Reader {
            inner,
            line: 0,
            _phantom: PhantomData,
        }
    }

    #[inline]
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Number of lines consumed so far.
    #[inline]
    pub fn line(&self) -> usize {
        self.line
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut R, &mut usize) {
        (&mut self.inner, &mut self.line)
    }
}

pub type BufFileReader<T> = Reader<io::BufReader<File>, T>;

impl<T> FileOpen for Reader<io::BufReader<File>, T> {
    fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self::new(io::BufReader::new(File::open(path)?)))
    }
}

pub(crate) fn invalid_data<E>(line: usize, error: E) -> io::Error
where
    E: Into<Box<dyn error::Error + Send + Sync>>,
{
    let error = error.into();
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("line {}: {}", line, error),
    )
}

/// Non-empty lines of a file, one symbol each.
pub fn read_symbols<P: AsRef<Path>>(path: P) -> io::Result<Vec<String>> {
    use std::io::BufRead;

    let mut symbols = Vec::new();
    for line in io::BufReader::new(File::open(path)?).lines() {
        let line = line?;
        let symbol = line.trim_end_matches('\r');
        if !symbol.is_empty() {
            symbols.push(symbol.to_string());
        }
    }
    Ok(symbols)
}

/// Every character of a file of whitespace-separated characters.
pub fn read_known_chars<P: AsRef<Path>>(path: P) -> io::Result<Vec<char>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text.split_whitespace().flat_map(str::chars).collect())
}
