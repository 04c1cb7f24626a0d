// --- Файл: src/metrics/throughput.rs ---

//! Эффективная пропускная способность (элементов в секунду).

use std::any::Any;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use super::{merge_peers, Accumulator, Metric, MetricError};

const NUM_TOTAL: &str = "num_total";
const START_TIME: &str = "start_time";

/// Источник времени в секундах.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> f64;
}

/// Настенные часы: секунды от UNIX epoch, сравнимы между машинами.
///
/// Часы не монотонны: при переводе системного времени назад прошедшее
/// время может стать отрицательным, и `compute` вернет 0 с предупреждением.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Ручные часы для тестов и симуляций.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Сдвигает время вперед на `seconds`.
    pub fn advance(&self, seconds: f64) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += seconds;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Пропускная способность между двумя сбросами.
///
/// В отличие от обычного счетчика throughput, время отсчитывается от
/// последнего `reset`, а не от старта процесса. При слиянии берется самое
/// раннее время старта: в синхронной программе общая скорость ограничена
/// самым долгим воркером.
#[derive(Debug, Clone)]
pub struct EffectiveThroughput {
    state: Accumulator,
    clock: Arc<dyn Clock>,
}

impl EffectiveThroughput {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Создает метрику с заданным источником времени.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let state = Accumulator::new()
            .with_sum(NUM_TOTAL, 1)
            .with_minimum(START_TIME, clock.now());
        Self { state, clock }
    }

    /// Учитывает `num_processed` обработанных элементов.
    ///
    /// Отрицательное значение - ошибка, состояние при этом не меняется.
    pub fn update(&mut self, num_processed: i64) -> Result<&mut Self, MetricError> {
        if num_processed < 0 {
            return Err(MetricError::InvalidArgument(format!(
                "Expected num_processed to be a non-negative number, but received {num_processed}."
            )));
        }
        self.state.add_values(NUM_TOTAL, &[num_processed as f64])?;
        Ok(self)
    }

    /// Сливает состояния: сумма счетчиков, минимум времени старта.
    pub fn merge<'a, I>(&mut self, peers: I) -> Result<&mut Self, MetricError>
    where
        I: IntoIterator<Item = &'a EffectiveThroughput>,
    {
        merge_peers(&mut *self, peers)?;
        Ok(self)
    }

    /// Количество элементов с момента последнего сброса.
    pub fn num_total(&self) -> Result<f64, MetricError> {
        Ok(self.state.values(NUM_TOTAL)?[0])
    }

    /// Время старта в секундах по часам метрики.
    pub fn start_time(&self) -> Result<f64, MetricError> {
        Ok(self.state.values(START_TIME)?[0])
    }
}

impl Default for EffectiveThroughput {
    fn default() -> Self {
        Self::new()
    }
}

impl Metric for EffectiveThroughput {
    fn name(&self) -> &str {
        "EffectiveThroughput"
    }

    /// Возвращает 0, если время с момента старта еще не прошло.
    fn compute(&self) -> Result<f64, MetricError> {
        let elapsed = self.clock.now() - self.start_time()?;
        if elapsed < 0.0 {
            warn!(elapsed, "clock went backwards since the start of measurement");
        }
        if elapsed <= 0.0 {
            return Ok(0.0);
        }
        Ok(self.num_total()? / elapsed)
    }

    fn state(&self) -> &Accumulator {
        &self.state
    }

    fn state_mut(&mut self) -> &mut Accumulator {
        &mut self.state
    }

    /// Обнуляет счетчик и заново засекает время старта.
    fn reset(&mut self) {
        self.state.reset();
        let now = self.clock.now();
        if let Err(e) = self.state.set_values(START_TIME, &[now]) {
            warn!(error = %e, "failed to restamp start time");
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
