//! Ranking factor entries: `[name, ascending, param, weight]`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A factor parameter. Column names render it as `{name}_{param}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactorParam {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FactorParam {
    /// The parameter as a window length, if it is a positive whole number.
    pub fn as_window(&self) -> Option<usize> {
        match self {
            FactorParam::Int(n) if *n >= 1 => Some(*n as usize),
            FactorParam::Float(x) if *x >= 1.0 && x.fract() == 0.0 => Some(*x as usize),
            FactorParam::Text(s) => s.trim().parse::<usize>().ok().filter(|n| *n >= 1),
            _ => None,
        }
    }
}

impl fmt::Display for FactorParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactorParam::Int(n) => write!(f, "{n}"),
            FactorParam::Float(x) => write!(f, "{x}"),
            FactorParam::Text(s) => f.write_str(s),
        }
    }
}

/// Name of the panel column holding `name` computed with `param`.
pub fn column_name(name: &str, param: &FactorParam) -> String {
    format!("{name}_{param}")
}

/// One ranking factor of a strategy side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "(String, bool, FactorParam, f64)",
    into = "(String, bool, FactorParam, f64)"
)]
pub struct FactorConfig {
    pub name: String,
    pub ascending: bool,
    pub param: FactorParam,
    /// Share of the composite score; normalised per side.
    pub weight: f64,
}

impl FactorConfig {
    /// A factor with an integer window parameter.
    pub fn new(name: &str, ascending: bool, param: i64, weight: f64) -> Self {
        Self {
            name: name.to_string(),
            ascending,
            param: FactorParam::Int(param),
            weight,
        }
    }

    pub fn col_name(&self) -> String {
        column_name(&self.name, &self.param)
    }

    /// Rescale weights to sum to 1. An all-zero list stays all zero.
    pub fn normalize(list: Vec<FactorConfig>) -> Vec<FactorConfig> {
        let total: f64 = list.iter().map(|f| f.weight).sum();
        list.into_iter()
            .map(|mut f| {
                f.weight = if total != 0.0 { f.weight / total } else { 0.0 };
                f
            })
            .collect()
    }
}

impl From<(String, bool, FactorParam, f64)> for FactorConfig {
    fn from((name, ascending, param, weight): (String, bool, FactorParam, f64)) -> Self {
        Self {
            name,
            ascending,
            param,
            weight,
        }
    }
}

impl From<FactorConfig> for (String, bool, FactorParam, f64) {
    fn from(f: FactorConfig) -> Self {
        (f.name, f.ascending, f.param, f.weight)
    }
}

impl fmt::Display for FactorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = if self.ascending { "asc" } else { "desc" };
        write!(f, "{}:{arrow}:{:.4}", self.col_name(), self.weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_from_inline_array() {
        #[derive(Deserialize)]
        struct W {
            f: Vec<FactorConfig>,
        }
        let w: W = toml::from_str(r#"f = [["Bias", true, 3, 1.0], ["PctChange", false, 24, 2]]"#)
            .unwrap();
        assert_eq!(w.f[0], FactorConfig::new("Bias", true, 3, 1.0));
        assert_eq!(w.f[1].col_name(), "PctChange_24");
        assert_eq!(w.f[1].weight, 2.0);
    }

    #[test]
    fn normalize_sums_to_one() {
        let list = FactorConfig::normalize(vec![
            FactorConfig::new("A", true, 1, 1.0),
            FactorConfig::new("B", true, 1, 3.0),
        ]);
        assert_eq!(list[0].weight, 0.25);
        assert_eq!(list[1].weight, 0.75);
    }

    #[test]
    fn normalize_keeps_zero_weights_at_zero() {
        let list = FactorConfig::normalize(vec![FactorConfig::new("A", true, 1, 0.0)]);
        assert_eq!(list[0].weight, 0.0);
    }

    #[test]
    fn window_parsing() {
        assert_eq!(FactorParam::Int(5).as_window(), Some(5));
        assert_eq!(FactorParam::Float(5.0).as_window(), Some(5));
        assert_eq!(FactorParam::Float(0.5).as_window(), None);
        assert_eq!(FactorParam::Int(0).as_window(), None);
        assert_eq!(FactorParam::Text("12".into()).as_window(), Some(12));
    }
}
