// --- Файл: src/metrics/accumulator.rs ---

//! Хранилище достаточных статистик метрики.
//!
//! Состояние - это упорядоченный набор именованных буферов фиксированной
//! длины. Каждый буфер знает, как он сливается с буферами других воркеров:
//! счетчики складываются, а поля вроде "времени старта" берут минимум.

use ndarray::{Array1, ArrayView1, Zip};
use serde::{Deserialize, Serialize};

use super::MetricError;

/// Правило слияния поля между воркерами.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reduction {
    /// Поэлементная сумма. Поле обнуляется при `reset`.
    Sum,
    /// Поэлементный минимум. Поле никогда не сбрасывается аккумулятором.
    Min,
}

/// Числовой буфер поля.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Buffer {
    Int(Array1<i64>),
    Float(Array1<f64>),
}

impl Buffer {
    pub fn len(&self) -> usize {
        match self {
            Buffer::Int(a) => a.len(),
            Buffer::Float(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn kind(&self) -> &'static str {
        match self {
            Buffer::Int(_) => "i64",
            Buffer::Float(_) => "f64",
        }
    }

    fn zero(&mut self) {
        match self {
            Buffer::Int(a) => a.fill(0),
            Buffer::Float(a) => a.fill(0.0),
        }
    }

    /// Комбинирует буферы. Совместимость проверяется заранее в `Accumulator::merge`.
    fn combine(&mut self, other: &Buffer, reduction: Reduction) {
        match (self, other, reduction) {
            (Buffer::Int(a), Buffer::Int(b), Reduction::Sum) => *a += b,
            (Buffer::Float(a), Buffer::Float(b), Reduction::Sum) => *a += b,
            (Buffer::Int(a), Buffer::Int(b), Reduction::Min) => {
                Zip::from(a).and(b).for_each(|x, &y| *x = (*x).min(y));
            }
            (Buffer::Float(a), Buffer::Float(b), Reduction::Min) => {
                Zip::from(a).and(b).for_each(|x, &y| *x = x.min(y));
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StateField {
    name: String,
    reduction: Reduction,
    buffer: Buffer,
}

/// Состояние метрики: набор полей фиксированной формы.
///
/// Форма задается один раз при создании и далее не меняется ни при
/// обновлении, ни при слиянии, ни при сбросе.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Accumulator {
    fields: Vec<StateField>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавляет целочисленный счетчик длины `len` (редукция `Sum`).
    pub fn with_counter(self, name: &str, len: usize) -> Self {
        self.with_field(name, Reduction::Sum, Buffer::Int(Array1::zeros(len)))
    }

    /// Добавляет вещественный счетчик длины `len` (редукция `Sum`).
    pub fn with_sum(self, name: &str, len: usize) -> Self {
        self.with_field(name, Reduction::Sum, Buffer::Float(Array1::zeros(len)))
    }

    /// Добавляет скалярное поле с редукцией `Min` и начальным значением.
    pub fn with_minimum(self, name: &str, initial: f64) -> Self {
        self.with_field(name, Reduction::Min, Buffer::Float(Array1::from_elem(1, initial)))
    }

    fn with_field(mut self, name: &str, reduction: Reduction, buffer: Buffer) -> Self {
        debug_assert!(
            self.fields.iter().all(|f| f.name != name),
            "duplicate state field '{name}'"
        );
        self.fields.push(StateField {
            name: name.to_string(),
            reduction,
            buffer,
        });
        self
    }

    /// Имена полей в порядке объявления.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn reduction(&self, name: &str) -> Result<Reduction, MetricError> {
        Ok(self.field(name)?.reduction)
    }

    fn field(&self, name: &str) -> Result<&StateField, MetricError> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| MetricError::UnknownField(name.to_string()))
    }

    fn field_mut(&mut self, name: &str) -> Result<&mut StateField, MetricError> {
        self.fields
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| MetricError::UnknownField(name.to_string()))
    }

    /// Целочисленный буфер поля.
    pub fn counts(&self, name: &str) -> Result<ArrayView1<'_, i64>, MetricError> {
        match &self.field(name)?.buffer {
            Buffer::Int(a) => Ok(a.view()),
            other => Err(kind_error(name, "i64", other)),
        }
    }

    /// Вещественный буфер поля.
    pub fn values(&self, name: &str) -> Result<ArrayView1<'_, f64>, MetricError> {
        match &self.field(name)?.buffer {
            Buffer::Float(a) => Ok(a.view()),
            other => Err(kind_error(name, "f64", other)),
        }
    }

    /// Прибавляет значения к целочисленному полю.
    pub fn add_counts(&mut self, name: &str, delta: &[i64]) -> Result<(), MetricError> {
        let field = self.field_mut(name)?;
        match &mut field.buffer {
            Buffer::Int(a) => {
                check_len(name, a.len(), delta.len())?;
                *a += &ArrayView1::from(delta);
                Ok(())
            }
            other => Err(kind_error(name, "i64", other)),
        }
    }

    /// Прибавляет значения к вещественному полю.
    pub fn add_values(&mut self, name: &str, delta: &[f64]) -> Result<(), MetricError> {
        let field = self.field_mut(name)?;
        match &mut field.buffer {
            Buffer::Float(a) => {
                check_len(name, a.len(), delta.len())?;
                *a += &ArrayView1::from(delta);
                Ok(())
            }
            other => Err(kind_error(name, "f64", other)),
        }
    }

    /// Перезаписывает вещественное поле.
    pub fn set_values(&mut self, name: &str, values: &[f64]) -> Result<(), MetricError> {
        let field = self.field_mut(name)?;
        match &mut field.buffer {
            Buffer::Float(a) => {
                check_len(name, a.len(), values.len())?;
                a.assign(&ArrayView1::from(values));
                Ok(())
            }
            other => Err(kind_error(name, "f64", other)),
        }
    }

    /// Проверяет, что `other` имеет ту же раскладку полей.
    pub fn check_compatible(&self, other: &Accumulator) -> Result<(), MetricError> {
        if self.fields.len() != other.fields.len() {
            return Err(MetricError::IncompatibleState(format!(
                "expected {} fields, peer has {}",
                self.fields.len(),
                other.fields.len()
            )));
        }
        for (mine, theirs) in self.fields.iter().zip(&other.fields) {
            let same = mine.name == theirs.name
                && mine.reduction == theirs.reduction
                && mine.buffer.kind() == theirs.buffer.kind()
                && mine.buffer.len() == theirs.buffer.len();
            if !same {
                return Err(MetricError::IncompatibleState(format!(
                    "field '{}' ({:?} {}[{}]) does not match peer field '{}' ({:?} {}[{}])",
                    mine.name,
                    mine.reduction,
                    mine.buffer.kind(),
                    mine.buffer.len(),
                    theirs.name,
                    theirs.reduction,
                    theirs.buffer.kind(),
                    theirs.buffer.len(),
                )));
            }
        }
        Ok(())
    }

    /// Сливает состояния других воркеров на месте.
    ///
    /// Если хотя бы одно состояние несовместимо, текущее не изменяется.
    pub fn merge(&mut self, peers: &[Accumulator]) -> Result<(), MetricError> {
        for peer in peers {
            self.check_compatible(peer)?;
        }
        for peer in peers {
            for (mine, theirs) in self.fields.iter_mut().zip(&peer.fields) {
                mine.buffer.combine(&theirs.buffer, mine.reduction);
            }
        }
        Ok(())
    }

    /// Обнуляет все поля с редукцией `Sum`.
    pub fn reset(&mut self) {
        for field in &mut self.fields {
            if field.reduction == Reduction::Sum {
                field.buffer.zero();
            }
        }
    }

    /// Сериализует состояние для передачи между процессами.
    pub fn to_json(&self) -> Result<String, MetricError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, MetricError> {
        Ok(serde_json::from_str(json)?)
    }
}

fn check_len(name: &str, expected: usize, actual: usize) -> Result<(), MetricError> {
    if expected == actual {
        Ok(())
    } else {
        Err(MetricError::ShapeMismatch {
            field: name.to_string(),
            expected,
            actual,
        })
    }
}

fn kind_error(name: &str, expected: &'static str, actual: &Buffer) -> MetricError {
    MetricError::FieldKind {
        field: name.to_string(),
        expected,
        actual: actual.kind(),
    }
}
