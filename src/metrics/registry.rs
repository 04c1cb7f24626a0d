// --- Файл: src/metrics/registry.rs ---

//! Реестр именованных метрик.
//!
//! Хранит метрики и обычные значения под уникальными именами и умеет
//! вычислять, синхронизировать и сбрасывать их все сразу.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{Metric, MetricError};
use crate::distributed::{ProcessGroup, SingleProcess};

/// Настройки реестра.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Префикс имен в результатах `compute_configured`.
    pub prefix: String,
    /// Синхронизировать ли метрики между воркерами.
    pub sync: bool,
    /// Метрики с этим суффиксом живут весь запуск и не сбрасываются.
    pub persistent_suffix: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            sync: false,
            persistent_suffix: "_min".to_string(),
        }
    }
}

impl RegistryConfig {
    pub fn from_json(json: &str) -> Result<Self, MetricError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Значение в реестре: готовое число или накапливающая метрика.
pub enum MetricEntry {
    Value(f64),
    Metric(Box<dyn Metric>),
}

impl fmt::Debug for MetricEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricEntry::Value(v) => f.debug_tuple("Value").field(v).finish(),
            MetricEntry::Metric(m) => f.debug_tuple("Metric").field(&m.name()).finish(),
        }
    }
}

/// Набор метрик с общим слоем синхронизации.
pub struct Metrics {
    entries: BTreeMap<String, MetricEntry>,
    group: Arc<dyn ProcessGroup>,
    config: RegistryConfig,
}

impl Metrics {
    /// Реестр для одного процесса.
    pub fn new() -> Self {
        Self::with_group(Arc::new(SingleProcess))
    }

    pub fn with_group(group: Arc<dyn ProcessGroup>) -> Self {
        Self {
            entries: BTreeMap::new(),
            group,
            config: RegistryConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Регистрирует метрику. Возвращает предыдущую запись с тем же именем.
    pub fn insert_metric<M: Metric>(
        &mut self,
        name: impl Into<String>,
        metric: M,
    ) -> Option<MetricEntry> {
        self.entries.insert(name.into(), MetricEntry::Metric(Box::new(metric)))
    }

    /// Регистрирует обычное значение, которое `compute` возвращает как есть.
    pub fn insert_value(&mut self, name: impl Into<String>, value: f64) -> Option<MetricEntry> {
        self.entries.insert(name.into(), MetricEntry::Value(value))
    }

    pub fn get(&self, name: &str) -> Option<&MetricEntry> {
        self.entries.get(name)
    }

    /// Типизированный доступ к метрике.
    pub fn metric<T: Metric>(&self, name: &str) -> Option<&T> {
        match self.entries.get(name)? {
            MetricEntry::Metric(m) => m.as_any().downcast_ref::<T>(),
            MetricEntry::Value(_) => None,
        }
    }

    pub fn metric_mut<T: Metric>(&mut self, name: &str) -> Option<&mut T> {
        match self.entries.get_mut(name)? {
            MetricEntry::Metric(m) => m.as_any_mut().downcast_mut::<T>(),
            MetricEntry::Value(_) => None,
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<MetricEntry> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Вычисляет все записи.
    ///
    /// При `sync` метрики сливаются со всех воркеров, и значение получает
    /// только координатор; остальные получают `None`. Если воркер один,
    /// синхронизация не выполняется.
    ///
    /// Ошибка вычисления на координаторе не прерывает синхронизацию: барьер
    /// проходится для каждой записи, а первая ошибка возвращается в конце.
    pub fn compute(
        &self,
        prefix: &str,
        sync: bool,
    ) -> Result<BTreeMap<String, Option<f64>>, MetricError> {
        let world_size = self.group.world_size();
        let sync = if sync && world_size <= 1 {
            debug!(world_size, "single participant, computing metrics locally");
            false
        } else {
            sync
        };

        // BTreeMap order keeps barrier calls aligned across participants.
        let mut results = BTreeMap::new();
        let mut first_error = None;
        for (name, entry) in &self.entries {
            let value = match entry {
                MetricEntry::Value(v) => Some(*v),
                MetricEntry::Metric(m) if sync => match self.group.sync_and_compute(&**m) {
                    Ok(value) => value,
                    Err(e) => {
                        // Peers are already waiting on the next barrier.
                        error!(metric = %name, error = %e, "synchronized compute failed");
                        first_error.get_or_insert(e);
                        None
                    }
                },
                MetricEntry::Metric(m) => Some(m.compute()?),
            };
            results.insert(format!("{prefix}{name}"), value);
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        debug!(
            rank = self.group.rank(),
            sync,
            results = %format_results(&results),
            "computed metrics"
        );
        Ok(results)
    }

    /// `compute` с префиксом и режимом синхронизации из конфигурации.
    pub fn compute_configured(&self) -> Result<BTreeMap<String, Option<f64>>, MetricError> {
        self.compute(&self.config.prefix, self.config.sync)
    }

    /// Сбрасывает все метрики, кроме глобальных (суффикс `_min` по умолчанию).
    pub fn reset(&mut self) {
        let suffix = self.config.persistent_suffix.as_str();
        for (name, entry) in &mut self.entries {
            if !suffix.is_empty() && name.ends_with(suffix) {
                continue;
            }
            if let MetricEntry::Metric(m) = entry {
                m.reset();
            }
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Форматирует результаты для вывода: `name: value | ...`.
pub fn format_results(results: &BTreeMap<String, Option<f64>>) -> String {
    results
        .iter()
        .map(|(name, value)| match value {
            Some(v) => format!("{name}: {v:.6}"),
            None => format!("{name}: -"),
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Accumulator, EffectiveThroughput, ManualClock, Minimum, Perplexity};
    use crate::distributed::SyncError;

    /// Слой синхронизации, который нельзя вызывать.
    struct NeverSync;

    impl ProcessGroup for NeverSync {
        fn world_size(&self) -> usize {
            1
        }

        fn rank(&self) -> usize {
            0
        }

        fn gather(&self, _state: Accumulator) -> Result<Option<Vec<Accumulator>>, SyncError> {
            panic!("sync layer must not be used with a single participant");
        }

        fn sync_and_compute(&self, _metric: &dyn Metric) -> Result<Option<f64>, MetricError> {
            panic!("sync layer must not be used with a single participant");
        }
    }

    fn registry() -> Metrics {
        let mut metrics = Metrics::with_group(Arc::new(NeverSync));
        let mut ppl = Perplexity::new();
        ppl.update_nll(0.0, 4).unwrap();
        metrics.insert_metric("ppl", ppl);
        let mut best = Minimum::new();
        best.update(0.25);
        metrics.insert_metric("loss_min", best);
        metrics.insert_value("lr", 0.001);
        metrics
    }

    #[test]
    fn test_compute_local_with_prefix() {
        let results = registry().compute("valid/", false).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results["valid/ppl"], Some(1.0));
        assert_eq!(results["valid/loss_min"], Some(0.25));
        assert_eq!(results["valid/lr"], Some(0.001));
    }

    #[test]
    fn test_sync_downgraded_for_single_participant() {
        let results = registry().compute("", true).unwrap();
        assert_eq!(results["ppl"], Some(1.0));
    }

    #[test]
    fn test_reset_skips_global_minimum() {
        let mut metrics = registry();
        metrics.reset();

        let results = metrics.compute("", false).unwrap();
        assert_eq!(results["ppl"], Some(0.0));
        assert_eq!(results["loss_min"], Some(0.25));
        assert_eq!(results["lr"], Some(0.001));
    }

    #[test]
    fn test_typed_access() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut metrics = Metrics::new();
        metrics.insert_metric("wps", EffectiveThroughput::with_clock(clock.clone()));

        metrics
            .metric_mut::<EffectiveThroughput>("wps")
            .unwrap()
            .update(50)
            .unwrap();
        clock.advance(5.0);

        assert!(metrics.metric::<Perplexity>("wps").is_none());
        assert_eq!(metrics.compute("", false).unwrap()["wps"], Some(10.0));
        assert_eq!(metrics.names().collect::<Vec<_>>(), vec!["wps"]);
    }

    #[test]
    fn test_config() {
        let config =
            RegistryConfig::from_json(r#"{"prefix": "test/", "persistent_suffix": "_best"}"#)
                .unwrap();
        assert!(!config.sync);

        let mut metrics = registry().with_config(config);
        metrics.reset();

        let results = metrics.compute_configured().unwrap();
        assert_eq!(results["test/ppl"], Some(0.0));
        // суффикс `_min` больше не защищен
        assert_eq!(results["test/loss_min"], Some(f64::INFINITY));
    }

    #[test]
    fn test_format_results() {
        let mut results = BTreeMap::new();
        results.insert("a".to_string(), Some(1.5));
        results.insert("b".to_string(), None);
        assert_eq!(format_results(&results), "a: 1.500000 | b: -");
    }
}
