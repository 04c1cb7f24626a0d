// --- Файл: src/metrics/running.rs ---

//! Глобальные счетчики, живущие весь запуск.

use std::any::Any;

use tracing::warn;

use super::{merge_peers, Accumulator, Metric, MetricError};

const VALUE: &str = "value";

/// Глобальный минимум (например, лучший `loss` за весь запуск).
///
/// При слиянии берется минимум по всем воркерам. В реестре такие метрики
/// регистрируются с суффиксом `_min` и не сбрасываются между эпохами.
#[derive(Debug, Clone)]
pub struct Minimum {
    state: Accumulator,
}

impl Minimum {
    /// Создает минимум без наблюдений (`+inf`).
    pub fn new() -> Self {
        Self {
            state: Accumulator::new().with_minimum(VALUE, f64::INFINITY),
        }
    }

    /// Добавляет значение.
    pub fn update(&mut self, value: f64) {
        let stored = self.current().and_then(|current| {
            if value < current {
                self.state.set_values(VALUE, &[value])
            } else {
                Ok(())
            }
        });
        if let Err(e) = stored {
            warn!(error = %e, "failed to store minimum");
        }
    }

    /// Сливает минимумы других воркеров.
    pub fn merge<'a, I>(&mut self, peers: I) -> Result<&mut Self, MetricError>
    where
        I: IntoIterator<Item = &'a Minimum>,
    {
        merge_peers(&mut *self, peers)?;
        Ok(self)
    }

    fn current(&self) -> Result<f64, MetricError> {
        Ok(self.state.values(VALUE)?[0])
    }
}

impl Default for Minimum {
    fn default() -> Self {
        Self::new()
    }
}

impl Metric for Minimum {
    fn name(&self) -> &str {
        "Minimum"
    }

    /// Возвращает `+inf`, если значений еще не было.
    fn compute(&self) -> Result<f64, MetricError> {
        self.current()
    }

    fn state(&self) -> &Accumulator {
        &self.state
    }

    fn state_mut(&mut self) -> &mut Accumulator {
        &mut self.state
    }

    fn reset(&mut self) {
        if let Err(e) = self.state.set_values(VALUE, &[f64::INFINITY]) {
            warn!(error = %e, "failed to reset minimum");
        }
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
