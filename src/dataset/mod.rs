use std::io::Result as IOResult;
use std::marker::PhantomData;
use std::ops;
use std::path::Path;
use std::slice::Iter;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::io::{BufFileReader, FileOpen, Read};
use crate::lang::Sentence;
use crate::preprocessing::Preprocess;

pub use self::batch::*;

mod batch;

#[derive(Debug, Clone)]
pub struct Dataset<T> {
    items: Vec<T>,
}

impl<T> Dataset<T> {
    pub fn new() -> Self {
        Dataset { items: vec![] }
    }

    pub fn from_items(items: Vec<T>) -> Self {
        Dataset { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> Iter<T> {
        self.items.iter()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// Consecutive batches in dataset order.
    pub fn batch(&self, size: usize) -> Batches<T> {
        Batches {
            items: &self.items,
            order: (0..self.items.len()).collect(),
            size: size.max(1),
            pos: 0,
        }
    }

    /// Batches over a shuffled order. Items themselves are never modified.
    pub fn shuffled_batch<R: Rng + ?Sized>(&self, size: usize, rng: &mut R) -> Batches<T> {
        let mut order: Vec<usize> = (0..self.items.len()).collect();
        order.shuffle(rng);
        Batches {
            items: &self.items,
            order,
            size: size.max(1),
            pos: 0,
        }
    }
}

impl<T> Default for Dataset<T> {
    fn default() -> Self {
        Dataset::new()
    }
}

pub struct Batches<'a, T> {
    items: &'a [T],
    order: Vec<usize>,
    size: usize,
    pos: usize,
}

impl<'a, T> Iterator for Batches<'a, T> {
    type Item = Vec<&'a T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.order.len() {
            return None;
        }
        let end = (self.pos + self.size).min(self.order.len());
        let batch = self.order[self.pos..end]
            .iter()
            .map(|&i| &self.items[i])
            .collect();
        self.pos = end;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.pos + self.size - 1) / self.size;
        (remaining, Some(remaining))
    }
}

impl<T> ops::Index<usize> for Dataset<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &T {
        ops::Index::index(&self.items, index)
    }
}

impl<T> ops::Index<ops::Range<usize>> for Dataset<T> {
    type Output = [T];

    #[inline]
    fn index(&self, index: ops::Range<usize>) -> &[T] {
        ops::Index::index(&self.items, index)
    }
}

impl<T> ops::Index<ops::RangeFull> for Dataset<T> {
    type Output = [T];

    #[inline]
    fn index(&self, _index: ops::RangeFull) -> &[T] {
        &self.items
    }
}

pub trait Load {
    type Item;

    fn load<P: AsRef<Path>>(&mut self, file: P) -> IOResult<Dataset<Self::Item>> {
        self.load_until(file, usize::MAX)
    }

    fn load_until<P: AsRef<Path>>(&mut self, file: P, size: usize)
        -> IOResult<Dataset<Self::Item>>;
}

/// Reads items from files and runs them through a preprocessor, fitting it
/// first unless it has been fixed.
pub struct Loader<R, P> {
    _reader: PhantomData<R>,
    preprocessor: P,
    enable_fit: bool,
}

impl<T, R: Read<Item = T>, P: Preprocess<T>> Loader<R, P> {
    pub fn new(preprocessor: P) -> Self {
        Loader {
            _reader: PhantomData,
            preprocessor,
            enable_fit: true,
        }
    }

    pub fn fix(&mut self) {
        self.enable_fit = false;
    }

    pub fn preprocessor(&self) -> &P {
        &self.preprocessor
    }

    pub fn preprocessor_mut(&mut self) -> &mut P {
        &mut self.preprocessor
    }

    pub fn into_preprocessor(self) -> P {
        self.preprocessor
    }
}

impl<T, P: Preprocess<T>, R: FileOpen + Read<Item = T>> Load for Loader<R, P> {
    type Item = P::Output;

    fn load_until<PATH: AsRef<Path>>(
        &mut self,
        file: PATH,
        size: usize,
    ) -> IOResult<Dataset<Self::Item>> {
        let mut reader = R::open(file)?;
        let mut buf = vec![];
        reader.read_upto(size, &mut buf)?;
        if self.enable_fit {
            self.preprocessor.fit(buf.iter());
            self.preprocessor.fix();
            self.enable_fit = false;
        }
        let items = self.preprocessor.transform(buf.into_iter()).collect();
        Ok(Dataset::from_items(items))
    }
}

pub type TsvLoader<P> = Loader<BufFileReader<Sentence>, P>;
