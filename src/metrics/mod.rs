// --- Файл: src/metrics/mod.rs ---

//! Модуль метрик для распределенной оценки моделей.
//!
//! Каждая метрика хранит достаточные статистики в [`Accumulator`], которые
//! можно сливать между воркерами без потери точности:
//! - **Перевод**: [`Bleu`] (любая метрика семейства sacrebleu через [`SegmentScorer`])
//! - **Распознавание речи**: [`Wer`]
//! - **Производительность**: [`EffectiveThroughput`]
//! - **Языковые модели**: [`Perplexity`]
//! - **Глобальные счетчики**: [`Minimum`]
//!
//! Набор именованных метрик собирается в реестр [`Metrics`].
//!
//! # Пример использования
//!
//! ```rust,ignore
//! use rustyeval::metrics::{EffectiveThroughput, Metric, Metrics};
//!
//! let mut metrics = Metrics::new();
//! metrics.insert_metric("wps", EffectiveThroughput::new());
//! metrics.metric_mut::<EffectiveThroughput>("wps").unwrap().update(128)?;
//! let results = metrics.compute("valid/", true)?;
//! metrics.reset();
//! ```

pub mod accumulator;
pub mod bleu;
pub mod perplexity;
pub mod registry;
pub mod running;
pub mod throughput;
pub mod wer;

use std::any::Any;
use thiserror::Error;

use crate::distributed::SyncError;

pub use accumulator::{Accumulator, Buffer, Reduction};
pub use bleu::{Bleu, CorpusScore, SegmentScorer};
pub use perplexity::Perplexity;
pub use registry::{MetricEntry, Metrics, RegistryConfig};
pub use running::Minimum;
pub use throughput::{Clock, EffectiveThroughput, ManualClock, SystemClock};
pub use wer::{AlignmentMeasures, Aligner, Wer, WerCounter};

/// Ошибки при обновлении, слиянии и вычислении метрик.
#[derive(Error, Debug)]
pub enum MetricError {
    #[error("Недопустимый аргумент: {0}")]
    InvalidArgument(String),

    #[error("Поле состояния '{field}' имеет длину {expected}, получено значений: {actual}")]
    ShapeMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("Поле состояния '{0}' не найдено")]
    UnknownField(String),

    #[error("Поле состояния '{field}' хранит {actual}, а запрошено {expected}")]
    FieldKind {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Несовместимое состояние при слиянии: {0}")]
    IncompatibleState(String),

    #[error("Значение метрики {metric} не определено: {reason}")]
    Undefined { metric: String, reason: String },

    #[error("Ошибка синхронизации: {0}")]
    Sync(#[from] SyncError),

    #[error("Ошибка JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Базовый трейт для всех метрик с распределенным состоянием.
///
/// Обновление (`update`) зависит от конкретной метрики и поэтому не входит
/// в трейт. Все остальное состояние живет в единственном [`Accumulator`],
/// что позволяет слою синхронизации работать с `dyn Metric`.
pub trait Metric: Send + Sync + 'static {
    /// Возвращает имя метрики.
    fn name(&self) -> &str;

    /// Вычисляет текущее значение метрики. Не изменяет состояние.
    fn compute(&self) -> Result<f64, MetricError>;

    /// Достаточные статистики метрики.
    fn state(&self) -> &Accumulator;

    fn state_mut(&mut self) -> &mut Accumulator;

    /// Сливает состояния других воркеров в текущее (на месте).
    fn merge_state(&mut self, peers: &[Accumulator]) -> Result<(), MetricError> {
        self.state_mut().merge(peers)
    }

    /// Сбрасывает состояние. Поля с редукцией `Min` не затрагиваются.
    fn reset(&mut self) {
        self.state_mut().reset();
    }

    /// Копия метрики для вычислений на слитом состоянии.
    fn clone_box(&self) -> Box<dyn Metric>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl Clone for Box<dyn Metric> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Сливает типизированные метрики одного вида через их состояния.
pub(crate) fn merge_peers<'a, M, I>(metric: &mut M, peers: I) -> Result<(), MetricError>
where
    M: Metric,
    I: IntoIterator<Item = &'a M>,
{
    let states: Vec<Accumulator> = peers.into_iter().map(|peer| peer.state().clone()).collect();
    metric.merge_state(&states)
}
