//! Dense time × symbol matrix of signed allocation ratios.

use chrono::NaiveDateTime;

/// Row-major matrix indexed by sorted timestamps and sorted symbols.
/// Unobserved cells are 0, never NaN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RatioMatrix {
    times: Vec<NaiveDateTime>,
    symbols: Vec<String>,
    values: Vec<f64>,
}

impl RatioMatrix {
    /// An all-zero matrix. Times and symbols are sorted and deduplicated.
    pub fn zeros(mut times: Vec<NaiveDateTime>, mut symbols: Vec<String>) -> Self {
        times.sort_unstable();
        times.dedup();
        symbols.sort_unstable();
        symbols.dedup();
        let values = vec![0.0; times.len() * symbols.len()];
        Self {
            times,
            symbols,
            values,
        }
    }

    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn n_times(&self) -> usize {
        self.times.len()
    }

    pub fn n_symbols(&self) -> usize {
        self.symbols.len()
    }

    /// No cells (no times or no symbols).
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn time_index(&self, t: NaiveDateTime) -> Option<usize> {
        self.times.binary_search(&t).ok()
    }

    pub fn symbol_index(&self, symbol: &str) -> Option<usize> {
        self.symbols
            .binary_search_by(|s| s.as_str().cmp(symbol))
            .ok()
    }

    pub fn get(&self, t: usize, s: usize) -> f64 {
        self.values[t * self.symbols.len() + s]
    }

    pub fn set(&mut self, t: usize, s: usize, v: f64) {
        let n = self.symbols.len();
        self.values[t * n + s] = v;
    }

    pub fn add(&mut self, t: usize, s: usize, v: f64) {
        let n = self.symbols.len();
        self.values[t * n + s] += v;
    }

    /// Cell value by label; 0 when either label is absent.
    pub fn value(&self, t: NaiveDateTime, symbol: &str) -> f64 {
        match (self.time_index(t), self.symbol_index(symbol)) {
            (Some(ti), Some(si)) => self.get(ti, si),
            _ => 0.0,
        }
    }

    pub fn row(&self, t: usize) -> &[f64] {
        let n = self.symbols.len();
        &self.values[t * n..(t + 1) * n]
    }

    pub fn row_mut(&mut self, t: usize) -> &mut [f64] {
        let n = self.symbols.len();
        &mut self.values[t * n..(t + 1) * n]
    }

    /// Same cells relabelled onto `times` × `symbols`. Labels missing from
    /// `self` are zero; cells outside the new labels are dropped.
    pub fn reindex(&self, times: Vec<NaiveDateTime>, symbols: Vec<String>) -> RatioMatrix {
        let mut out = RatioMatrix::zeros(times, symbols);
        let col_map: Vec<Option<usize>> = self
            .symbols
            .iter()
            .map(|s| out.symbol_index(s))
            .collect();
        for (ti, t) in self.times.iter().enumerate() {
            let Some(oi) = out.time_index(*t) else {
                continue;
            };
            for (si, target) in col_map.iter().enumerate() {
                if let Some(oj) = target {
                    out.set(oi, *oj, self.get(ti, si));
                }
            }
        }
        out
    }

    /// Add every cell of `other` whose labels exist in `self`.
    pub fn add_matrix(&mut self, other: &RatioMatrix) {
        let col_map: Vec<Option<usize>> = other
            .symbols
            .iter()
            .map(|s| self.symbol_index(s))
            .collect();
        for (ti, t) in other.times.iter().enumerate() {
            let Some(oi) = self.time_index(*t) else {
                continue;
            };
            for (si, target) in col_map.iter().enumerate() {
                if let Some(oj) = target {
                    self.add(oi, *oj, other.get(ti, si));
                }
            }
        }
    }

    /// `Σ|value|` over the whole matrix.
    pub fn abs_sum(&self) -> f64 {
        self.values.iter().map(|v| v.abs()).sum()
    }

    /// `Σ value` over the whole matrix.
    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Drop symbols whose column is zero everywhere.
    pub fn drop_zero_columns(&self) -> RatioMatrix {
        let keep: Vec<String> = self
            .symbols
            .iter()
            .enumerate()
            .filter(|(s, _)| (0..self.n_times()).any(|t| self.get(t, *s) != 0.0))
            .map(|(_, name)| name.clone())
            .collect();
        self.reindex(self.times.clone(), keep)
    }
}
