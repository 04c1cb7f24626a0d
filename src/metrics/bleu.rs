// --- Файл: src/metrics/bleu.rs ---

//! Корпусные метрики семейства BLEU по сгенерированным строкам.
//!
//! Сам алгоритм (BLEU, ChrF, ChrF++, spBLEU, ...) предоставляет внешний
//! [`SegmentScorer`]. Метрика хранит только вектор статистик сегментов и
//! число эталонов, поэтому ее состояние складывается между воркерами.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, info_span, Span};

use super::{merge_peers, Accumulator, Metric, MetricError};

const COUNTS: &str = "bleu_counts";
const NUM_REFS: &str = "num_refs";

/// Итоговая оценка корпуса.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusScore {
    pub score: f64,
    /// Человекочитаемая подпись конфигурации (токенизация, сглаживание, nrefs).
    pub signature: String,
}

/// Внешний скорер семейства sacrebleu.
pub trait SegmentScorer: Send + Sync {
    type ReferenceInfo;

    fn extract_reference_info(&self, references: &[&str]) -> Self::ReferenceInfo;

    /// Вектор статистик одного сегмента. Длина одинакова для любых входов.
    fn segment_statistics(
        &self,
        hypothesis: &str,
        reference_info: &Self::ReferenceInfo,
    ) -> Vec<i64>;

    fn score_from_stats(&self, stats: &[i64], num_refs: usize) -> CorpusScore;
}

/// Корпусный BLEU (или другая метрика скорера).
pub struct Bleu<S> {
    state: Accumulator,
    scorer: Arc<S>,
    span: Span,
}

impl<S: SegmentScorer> Bleu<S> {
    /// Создает метрику. Длина вектора статистик определяется пробным
    /// вызовом скорера и больше не меняется.
    pub fn new(scorer: S) -> Self {
        let reference_info = scorer.extract_reference_info(&["hel lo"]);
        let size = scorer.segment_statistics("he hel llo", &reference_info).len();

        Self {
            state: Accumulator::new().with_counter(COUNTS, size).with_counter(NUM_REFS, 1),
            scorer: Arc::new(scorer),
            span: info_span!("bleu"),
        }
    }

    /// Задает span, в котором логируется результат `compute`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Длина вектора статистик.
    pub fn stats_len(&self) -> usize {
        self.state.counts(COUNTS).map(|c| c.len()).unwrap_or(0)
    }

    /// Добавляет гипотезу и ее эталоны.
    pub fn update<H, R>(&mut self, hypothesis: H, references: &[R]) -> Result<(), MetricError>
    where
        H: AsRef<str>,
        R: AsRef<str>,
    {
        if references.is_empty() {
            return Err(MetricError::InvalidArgument(
                "at least one reference is required".to_string(),
            ));
        }

        let references: Vec<&str> = references.iter().map(AsRef::as_ref).collect();
        let reference_info = self.scorer.extract_reference_info(&references);
        let stats = self
            .scorer
            .segment_statistics(hypothesis.as_ref(), &reference_info);

        // `counts` идет первым: при неверной длине состояние не меняется.
        self.state.add_counts(COUNTS, &stats)?;
        self.state.add_counts(NUM_REFS, &[references.len() as i64])?;
        Ok(())
    }

    pub fn merge<'a, I>(&mut self, peers: I) -> Result<&mut Self, MetricError>
    where
        I: IntoIterator<Item = &'a Bleu<S>>,
        S: 'static,
    {
        merge_peers(&mut *self, peers)?;
        Ok(self)
    }

    pub fn num_refs(&self) -> Result<i64, MetricError> {
        Ok(self.state.counts(NUM_REFS)?[0])
    }

    /// Полная оценка с подписью. `None`, если наблюдений не было.
    pub fn score(&self) -> Result<Option<CorpusScore>, MetricError> {
        let counts = self.state.counts(COUNTS)?;
        let num_refs = self.num_refs()?;
        if num_refs == 0 && counts.iter().all(|&c| c == 0) {
            return Ok(None);
        }

        let stats = counts.to_vec();
        Ok(Some(self.scorer.score_from_stats(&stats, num_refs.max(0) as usize)))
    }
}

impl<S> Clone for Bleu<S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            scorer: Arc::clone(&self.scorer),
            span: self.span.clone(),
        }
    }
}

impl<S> fmt::Debug for Bleu<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bleu").field("state", &self.state).finish_non_exhaustive()
    }
}

impl<S: SegmentScorer + 'static> Metric for Bleu<S> {
    fn name(&self) -> &str {
        "Bleu"
    }

    /// Без наблюдений возвращает 0, скорер при этом не вызывается.
    fn compute(&self) -> Result<f64, MetricError> {
        match self.score()? {
            Some(score) => {
                info!(
                    parent: &self.span,
                    signature = %score.signature,
                    score = score.score,
                    "{} score: {:.4}",
                    score.signature,
                    score.score
                );
                Ok(score.score)
            }
            None => {
                debug!(parent: &self.span, "no segments observed, score is 0");
                Ok(0.0)
            }
        }
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
