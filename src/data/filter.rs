// --- Файл: src/data/filter.rs ---

//! Filter stage: keeps examples that satisfy a predicate.

use super::pipeline::{BoxError, PipelineError, PipelineResult, Source};

/// Lazily skips upstream examples rejected by the predicate.
///
/// Holds no state of its own beyond the upstream cursor, so decisions are
/// re-evaluated on every pass.
pub struct Filter<S, F> {
    inner: S,
    predicate: F,
}

impl<S, F> Filter<S, F>
where
    S: Source,
    F: FnMut(&S::Item) -> Result<bool, BoxError> + Send,
{
    pub fn new(inner: S, predicate: F) -> Self {
        Self { inner, predicate }
    }
}

impl<S, F> Source for Filter<S, F>
where
    S: Source,
    F: FnMut(&S::Item) -> Result<bool, BoxError> + Send,
{
    type Item = S::Item;

    fn next(&mut self) -> Option<PipelineResult<S::Item>> {
        loop {
            let item = match self.inner.next()? {
                Ok(item) => item,
                Err(e) => return Some(Err(e)),
            };

            match (self.predicate)(&item) {
                Ok(true) => return Some(Ok(item)),
                Ok(false) => continue,
                Err(e) => return Some(Err(PipelineError::Predicate(e))),
            }
        }
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

#[cfg(test)]
mod tests {
    use crate::data::{read_sequence, PipelineError, PipelineState};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, thiserror::Error)]
    #[error("filter error")]
    struct FilterError;

    #[test]
    fn test_filter_odd_twice() {
        let mut pipeline = read_sequence(vec![1, 2, 3, 4, 5, 6, 7, 8, 9])
            .filter(|d| d % 2 == 1)
            .and_return();

        for _ in 0..2 {
            let values: Vec<i32> = pipeline.by_ref().collect::<Result<_, _>>().unwrap();
            assert_eq!(values, vec![1, 3, 5, 7, 9]);
            pipeline.reset();
        }
    }

    #[test]
    fn test_predicate_error_propagates() {
        let mut pipeline = read_sequence(vec![1, 2, 3, 4])
            .try_filter(|&d| if d == 3 { Err(FilterError) } else { Ok(true) })
            .and_return();

        assert_eq!(pipeline.next().unwrap().unwrap(), 1);
        assert_eq!(pipeline.next().unwrap().unwrap(), 2);

        let err = pipeline.next().unwrap().unwrap_err();
        assert!(matches!(err, PipelineError::Predicate(_)));
        assert_eq!(err.to_string(), "filter error");

        assert!(pipeline.next().is_none());
        assert_eq!(pipeline.state(), PipelineState::Exhausted);
    }

    #[test]
    fn test_element_after_failure_is_never_pulled() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let mut pipeline = read_sequence(vec![1, 2, 3, 4])
            .try_filter(move |&d| {
                counter.fetch_add(1, Ordering::SeqCst);
                if d == 3 {
                    Err(FilterError)
                } else {
                    Ok(true)
                }
            })
            .and_return();

        let results: Vec<_> = pipeline.by_ref().collect();
        assert_eq!(results.len(), 3);
        assert!(results[2].is_err());
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_transient_failure_recovers_after_reset() {
        let failed_once = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&failed_once);
        let mut pipeline = read_sequence(vec![1, 2, 3, 4])
            .try_filter(move |&d| {
                if d == 3 && !flag.swap(true, Ordering::SeqCst) {
                    return Err(FilterError);
                }
                Ok(true)
            })
            .and_return();

        assert!(pipeline.by_ref().any(|r| r.is_err()));

        pipeline.reset();
        let values: Vec<i32> = pipeline.collect::<Result<_, _>>().unwrap();
        assert_eq!(values, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_decisions_are_not_cached() {
        let pass = Arc::new(AtomicUsize::new(0));
        let current = Arc::clone(&pass);
        let mut pipeline = read_sequence(vec![1, 2, 3, 4])
            .filter(move |&d| d as usize % 2 == current.load(Ordering::SeqCst) % 2)
            .and_return();

        let even: Vec<i32> = pipeline.by_ref().collect::<Result<_, _>>().unwrap();
        assert_eq!(even, vec![2, 4]);

        pass.fetch_add(1, Ordering::SeqCst);
        pipeline.reset();
        let odd: Vec<i32> = pipeline.collect::<Result<_, _>>().unwrap();
        assert_eq!(odd, vec![1, 3]);
    }

    #[test]
    fn test_filter_then_map() {
        let pipeline = read_sequence(vec!["a", "bb", "ccc"])
            .filter(|s| s.len() > 1)
            .map(str::len)
            .and_return();
        let lens: Vec<usize> = pipeline.collect::<Result<_, _>>().unwrap();
        assert_eq!(lens, vec![2, 3]);
    }
}
