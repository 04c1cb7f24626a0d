// --- Файл: src/metrics/perplexity.rs ---

//! Перплексия языковой модели.
//!
//! Perplexity = exp(Σ NLL / N)

use std::any::Any;

use ndarray::ArrayView2;

use super::{merge_peers, Accumulator, Metric, MetricError};

const SUM_NLL: &str = "sum_nll";
const NUM_TOKENS: &str = "num_tokens";

#[derive(Debug, Clone)]
pub struct Perplexity {
    state: Accumulator,
    ignore_index: Option<usize>,
}

impl Perplexity {
    pub fn new() -> Self {
        Self {
            state: Accumulator::new().with_sum(SUM_NLL, 1).with_counter(NUM_TOKENS, 1),
            ignore_index: None,
        }
    }

    /// Токены с этим индексом (обычно pad) не учитываются.
    pub fn with_ignore_index(mut self, index: usize) -> Self {
        self.ignore_index = Some(index);
        self
    }

    /// Добавляет логиты формы [tokens, vocab] и индексы целевых токенов.
    pub fn update(
        &mut self,
        logits: ArrayView2<'_, f32>,
        targets: &[usize],
    ) -> Result<(), MetricError> {
        let (num_rows, vocab) = logits.dim();
        if num_rows != targets.len() {
            return Err(MetricError::InvalidArgument(format!(
                "logits have {num_rows} rows but {} targets were given",
                targets.len()
            )));
        }

        let mut sum_nll = 0.0f64;
        let mut num_tokens = 0i64;
        for (row, &target) in logits.outer_iter().zip(targets) {
            if self.ignore_index == Some(target) {
                continue;
            }
            if target >= vocab {
                return Err(MetricError::InvalidArgument(format!(
                    "target {target} is out of range for vocabulary of size {vocab}"
                )));
            }

            // Стабильный log-softmax.
            let max = row.iter().fold(f64::NEG_INFINITY, |m, &x| m.max(x as f64));
            let log_sum_exp = max + row.iter().map(|&x| (x as f64 - max).exp()).sum::<f64>().ln();
            sum_nll += log_sum_exp - row[target] as f64;
            num_tokens += 1;
        }

        self.update_nll(sum_nll, num_tokens)
    }

    /// Добавляет уже посчитанную суммарную NLL по `num_tokens` токенам.
    pub fn update_nll(&mut self, sum_nll: f64, num_tokens: i64) -> Result<(), MetricError> {
        if num_tokens < 0 || !sum_nll.is_finite() {
            return Err(MetricError::InvalidArgument(format!(
                "invalid loss: sum_nll={sum_nll}, num_tokens={num_tokens}"
            )));
        }
        self.state.add_values(SUM_NLL, &[sum_nll])?;
        self.state.add_counts(NUM_TOKENS, &[num_tokens])
    }

    pub fn merge<'a, I>(&mut self, peers: I) -> Result<&mut Self, MetricError>
    where
        I: IntoIterator<Item = &'a Perplexity>,
    {
        merge_peers(&mut *self, peers)?;
        Ok(self)
    }

    pub fn num_tokens(&self) -> Result<i64, MetricError> {
        Ok(self.state.counts(NUM_TOKENS)?[0])
    }
}

impl Default for Perplexity {
    fn default() -> Self {
        Self::new()
    }
}

impl Metric for Perplexity {
    fn name(&self) -> &str {
        "Perplexity"
    }

    /// Без токенов возвращает 0.
    fn compute(&self) -> Result<f64, MetricError> {
        let num_tokens = self.num_tokens()?;
        if num_tokens == 0 {
            return Ok(0.0);
        }
        let sum_nll = self.state.values(SUM_NLL)?[0];
        Ok((sum_nll / num_tokens as f64).exp())
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
