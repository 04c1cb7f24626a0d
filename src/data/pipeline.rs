// --- Файл: src/data/pipeline.rs ---

//! Lazy data pipelines built from resettable sources.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::filter::Filter;

/// Error type returned by user callbacks (predicates, map functions).
pub type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A filter predicate failed. Displays the predicate's own message.
    #[error("{0}")]
    Predicate(BoxError),

    /// A map function failed.
    #[error("{0}")]
    Callback(BoxError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Pull-based source of examples that can be rewound to its beginning.
pub trait Source: Send {
    type Item;

    /// Produces the next example, `None` when the pass is over.
    fn next(&mut self) -> Option<PipelineResult<Self::Item>>;

    /// Rewinds to the first example.
    fn reset(&mut self);
}

impl<S: Source + ?Sized> Source for Box<S> {
    type Item = S::Item;

    fn next(&mut self) -> Option<PipelineResult<Self::Item>> {
        (**self).next()
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// In-memory sequence source.
pub struct ReadSequence<T> {
    items: Arc<[T]>,
    position: usize,
}

impl<T> ReadSequence<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: items.into(),
            position: 0,
        }
    }
}

impl<T: Clone + Send + Sync> Source for ReadSequence<T> {
    type Item = T;

    fn next(&mut self) -> Option<PipelineResult<T>> {
        let item = self.items.get(self.position)?.clone();
        self.position += 1;
        Some(Ok(item))
    }

    fn reset(&mut self) {
        self.position = 0;
    }
}

/// Applies a fallible function to every example.
pub struct Map<S, F> {
    inner: S,
    f: F,
}

impl<S, F, U> Source for Map<S, F>
where
    S: Source,
    F: FnMut(S::Item) -> Result<U, BoxError> + Send,
{
    type Item = U;

    fn next(&mut self) -> Option<PipelineResult<U>> {
        Some(match self.inner.next()? {
            Ok(item) => (self.f)(item).map_err(PipelineError::Callback),
            Err(e) => Err(e),
        })
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

/// Starts a pipeline over an in-memory sequence.
///
/// ```rust,ignore
/// let mut pipeline = read_sequence(vec![1, 2, 3, 4])
///     .filter(|x| x % 2 == 0)
///     .and_return();
///
/// for example in &mut pipeline {
///     println!("{}", example?);
/// }
/// pipeline.reset();
/// ```
pub fn read_sequence<T>(items: Vec<T>) -> DataPipelineBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    DataPipelineBuilder {
        source: Box::new(ReadSequence::new(items)),
    }
}

/// Builder that chains pipeline stages.
pub struct DataPipelineBuilder<T> {
    source: Box<dyn Source<Item = T>>,
}

impl<T: 'static> DataPipelineBuilder<T> {
    /// Starts a pipeline from a custom source.
    pub fn from_source<S>(source: S) -> Self
    where
        S: Source<Item = T> + 'static,
    {
        Self {
            source: Box::new(source),
        }
    }

    /// Keeps examples for which `predicate` returns `true`.
    pub fn filter<F>(self, mut predicate: F) -> Self
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        self.try_filter(move |item| Ok::<_, BoxError>(predicate(item)))
    }

    /// Like [`filter`](Self::filter), but a failing predicate aborts the
    /// current pass with [`PipelineError::Predicate`].
    pub fn try_filter<F, E>(self, mut predicate: F) -> Self
    where
        F: FnMut(&T) -> Result<bool, E> + Send + 'static,
        E: Into<BoxError>,
    {
        let predicate = move |item: &T| -> Result<bool, BoxError> {
            predicate(item).map_err(Into::into)
        };
        Self {
            source: Box::new(Filter::new(self.source, predicate)),
        }
    }

    pub fn map<U, F>(self, mut f: F) -> DataPipelineBuilder<U>
    where
        U: 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        self.try_map(move |item| Ok::<_, BoxError>(f(item)))
    }

    pub fn try_map<U, F, E>(self, mut f: F) -> DataPipelineBuilder<U>
    where
        U: 'static,
        F: FnMut(T) -> Result<U, E> + Send + 'static,
        E: Into<BoxError>,
    {
        let f = move |item: T| -> Result<U, BoxError> { f(item).map_err(Into::into) };
        DataPipelineBuilder {
            source: Box::new(Map {
                inner: self.source,
                f,
            }),
        }
    }

    /// Finishes the pipeline.
    pub fn and_return(self) -> DataPipeline<T> {
        DataPipeline {
            source: self.source,
            state: PipelineState::Ready,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing was pulled since construction or the last reset.
    Ready,
    Iterating,
    /// The pass ended, either normally or because a stage failed.
    Exhausted,
}

/// A finished pipeline: an iterator of examples that can be reset.
///
/// An error aborts the current pass: it is yielded once and iteration stops
/// until [`reset`](DataPipeline::reset) is called.
pub struct DataPipeline<T> {
    source: Box<dyn Source<Item = T>>,
    state: PipelineState,
}

impl<T> DataPipeline<T> {
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Rewinds every stage so the next pass starts from the first example.
    pub fn reset(&mut self) {
        self.source.reset();
        self.state = PipelineState::Ready;
    }
}

impl<T> Iterator for DataPipeline<T> {
    type Item = PipelineResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == PipelineState::Exhausted {
            return None;
        }
        self.state = PipelineState::Iterating;

        match self.source.next() {
            Some(Ok(item)) => Some(Ok(item)),
            Some(Err(e)) => {
                debug!(error = %e, "pipeline pass aborted");
                self.state = PipelineState::Exhausted;
                Some(Err(e))
            }
            None => {
                self.state = PipelineState::Exhausted;
                None
            }
        }
    }
}
