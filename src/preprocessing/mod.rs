pub use self::edit::*;
pub use self::preprocessor::*;
pub use self::vocab::*;

mod edit;
mod preprocessor;
mod vocab;

#[derive(Debug)]
pub struct Transform<'a, I, P> {
    iter: I,
    caller: &'a P,
}

impl<'a, I, P, T> Iterator for Transform<'a, I, P>
where
    I: Iterator<Item = T>,
    P: Preprocess<T>,
{
    type Item = P::Output;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|x| self.caller.transform_each(x))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

/// Two-phase preprocessing: `fit` collects statistics, `fix` freezes them,
/// `transform` maps items using the frozen state.
pub trait Preprocess<T> {
    type Output;

    fn fit<'a, I: Iterator<Item = &'a T>>(&mut self, xs: I)
    where
        T: 'a,
    {
        for x in xs {
            self.fit_each(x);
        }
    }

    #[allow(unused_variables)]
    fn fit_each(&mut self, x: &T) {}

    fn fix(&mut self) {}

    fn transform<I: Iterator<Item = T>>(&self, xs: I) -> Transform<'_, I, Self>
    where
        Self: Sized,
    {
        Transform {
            iter: xs,
            caller: self,
        }
    }

    fn transform_each(&self, x: T) -> Self::Output;
}
