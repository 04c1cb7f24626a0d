// --- Файл: src/metrics/wer.rs ---

//! Word Error Rate (WER).
//!
//! WER = (S + D + I) / (S + D + H)
//!
//! Выравнивание гипотезы и эталона выполняет внешний [`Aligner`]; метрика
//! накапливает только четыре счетчика.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{merge_peers, Accumulator, Metric, MetricError};

const COUNTERS: &str = "counters";

/// Результат выравнивания одной пары эталон/гипотеза.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentMeasures {
    pub hits: u64,
    pub substitutions: u64,
    pub deletions: u64,
    pub insertions: u64,
}

impl AlignmentMeasures {
    pub fn get(&self, counter: WerCounter) -> u64 {
        match counter {
            WerCounter::Hits => self.hits,
            WerCounter::Substitutions => self.substitutions,
            WerCounter::Deletions => self.deletions,
            WerCounter::Insertions => self.insertions,
        }
    }
}

/// Внешняя процедура выравнивания по словам (edit distance).
pub trait Aligner: Send + Sync {
    fn compute_measures(&self, reference: &str, prediction: &str) -> AlignmentMeasures;
}

impl<F> Aligner for F
where
    F: Fn(&str, &str) -> AlignmentMeasures + Send + Sync,
{
    fn compute_measures(&self, reference: &str, prediction: &str) -> AlignmentMeasures {
        self(reference, prediction)
    }
}

/// Индексы счетчиков в состоянии WER.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WerCounter {
    Hits,
    Substitutions,
    Deletions,
    Insertions,
}

impl WerCounter {
    pub const ALL: [WerCounter; 4] = [
        WerCounter::Hits,
        WerCounter::Substitutions,
        WerCounter::Deletions,
        WerCounter::Insertions,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn key(self) -> &'static str {
        match self {
            WerCounter::Hits => "hits",
            WerCounter::Substitutions => "substitutions",
            WerCounter::Deletions => "deletions",
            WerCounter::Insertions => "insertions",
        }
    }
}

/// Метрика WER поверх внешнего выравнивателя.
pub struct Wer<A> {
    state: Accumulator,
    aligner: Arc<A>,
}

impl<A: Aligner> Wer<A> {
    pub fn new(aligner: A) -> Self {
        Self {
            state: Accumulator::new().with_counter(COUNTERS, WerCounter::ALL.len()),
            aligner: Arc::new(aligner),
        }
    }

    /// Выравнивает `prediction` с `reference` и накапливает счетчики.
    pub fn update(&mut self, prediction: &str, reference: &str) -> Result<(), MetricError> {
        let measures = self.aligner.compute_measures(reference, prediction);

        let mut delta = [0i64; 4];
        for counter in WerCounter::ALL {
            delta[counter.index()] = i64::try_from(measures.get(counter)).map_err(|_| {
                MetricError::InvalidArgument(format!(
                    "{} count {} does not fit into the counter",
                    counter.key(),
                    measures.get(counter)
                ))
            })?;
        }
        self.state.add_counts(COUNTERS, &delta)
    }

    pub fn merge<'a, I>(&mut self, peers: I) -> Result<&mut Self, MetricError>
    where
        I: IntoIterator<Item = &'a Wer<A>>,
        A: 'static,
    {
        merge_peers(&mut *self, peers)?;
        Ok(self)
    }

    /// Накопленные счетчики.
    pub fn measures(&self) -> Result<AlignmentMeasures, MetricError> {
        let counters = self.state.counts(COUNTERS)?;
        let get = |c: WerCounter| counters[c.index()].max(0) as u64;
        Ok(AlignmentMeasures {
            hits: get(WerCounter::Hits),
            substitutions: get(WerCounter::Substitutions),
            deletions: get(WerCounter::Deletions),
            insertions: get(WerCounter::Insertions),
        })
    }
}

impl<A> Clone for Wer<A> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            aligner: Arc::clone(&self.aligner),
        }
    }
}

impl<A> fmt::Debug for Wer<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wer").field("state", &self.state).finish_non_exhaustive()
    }
}

impl<A: Aligner + 'static> Metric for Wer<A> {
    fn name(&self) -> &str {
        "WER"
    }

    /// Без наблюдений возвращает 0. Вставки при пустых эталонах дают
    /// `MetricError::Undefined`.
    fn compute(&self) -> Result<f64, MetricError> {
        let m = self.measures()?;
        let incorrect = m.substitutions + m.deletions + m.insertions;
        let total = m.substitutions + m.deletions + m.hits;

        if total == 0 {
            if incorrect == 0 {
                return Ok(0.0);
            }
            return Err(MetricError::Undefined {
                metric: "WER".to_string(),
                reason: format!("{incorrect} insertions against empty references"),
            });
        }

        Ok(incorrect as f64 / total as f64)
    }

    fn state(&self) -> &Accumulator {
        &self.state
    }

    fn state_mut(&mut self) -> &mut Accumulator {
        &mut self.state
    }

    fn clone_box(&self) -> Box<dyn Metric> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
