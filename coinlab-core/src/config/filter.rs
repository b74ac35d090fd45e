//! Filter entries: `[name, param, "how:expr"]` or `[name, param, "how:expr", ascending]`.
//!
//! `how` is `rank` (per-bucket rank), `pct` (per-bucket percentile rank) or
//! `val` (raw value). `expr` is a comparison such as `<=10` or `>0.5`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::factor::{column_name, FactorParam};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Ge,
    Le,
    Eq,
    Ne,
    Gt,
    Lt,
}

impl Comparison {
    fn symbol(self) -> &'static str {
        match self {
            Comparison::Ge => ">=",
            Comparison::Le => "<=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
            Comparison::Gt => ">",
            Comparison::Lt => "<",
        }
    }
}

/// A threshold test such as `>=0.3`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeExpr {
    pub op: Comparison,
    pub value: f64,
}

impl RangeExpr {
    /// NaN fails every comparison except `!=`.
    pub fn test(&self, x: f64) -> bool {
        match self.op {
            Comparison::Ge => x >= self.value,
            Comparison::Le => x <= self.value,
            Comparison::Eq => x == self.value,
            Comparison::Ne => x != self.value,
            Comparison::Gt => x > self.value,
            Comparison::Lt => x < self.value,
        }
    }
}

impl FromStr for RangeExpr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (op, rest) = if let Some(rest) = s.strip_prefix(">=") {
            (Comparison::Ge, rest)
        } else if let Some(rest) = s.strip_prefix("<=") {
            (Comparison::Le, rest)
        } else if let Some(rest) = s.strip_prefix("==") {
            (Comparison::Eq, rest)
        } else if let Some(rest) = s.strip_prefix("!=") {
            (Comparison::Ne, rest)
        } else if let Some(rest) = s.strip_prefix('>') {
            (Comparison::Gt, rest)
        } else if let Some(rest) = s.strip_prefix('<') {
            (Comparison::Lt, rest)
        } else {
            return Err(format!("unsupported operator in '{s}'"));
        };
        let value: f64 = rest
            .parse()
            .map_err(|_| format!("filter expression '{s}' is not a plain comparison"))?;
        Ok(Self { op, value })
    }
}

impl fmt::Display for RangeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.symbol(), self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterHow {
    Rank,
    Pct,
    Val,
}

/// `how:expr`, e.g. `pct:<=0.2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterMethod {
    pub how: FilterHow,
    pub range: RangeExpr,
}

impl FromStr for FilterMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let (how, range) = compact
            .split_once(':')
            .ok_or_else(|| format!("filter method '{s}' must look like 'how:expr'"))?;
        let how = match how {
            "rank" => FilterHow::Rank,
            "pct" => FilterHow::Pct,
            "val" => FilterHow::Val,
            other => return Err(format!("unsupported filter method '{other}'")),
        };
        Ok(Self {
            how,
            range: range.parse()?,
        })
    }
}

impl fmt::Display for FilterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let how = match self.how {
            FilterHow::Rank => "rank",
            FilterHow::Pct => "pct",
            FilterHow::Val => "val",
        };
        write!(f, "{how}:{}", self.range)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FilterTuple {
    Sorted(String, FactorParam, String, bool),
    Plain(String, FactorParam, String),
}

/// One keep-mask rule applied before or after selection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "FilterTuple")]
pub struct FilterFactorConfig {
    pub name: String,
    pub param: FactorParam,
    pub method: FilterMethod,
    /// Rank direction for `rank` / `pct` methods.
    pub ascending: bool,
}

impl FilterFactorConfig {
    pub fn new(name: &str, param: FactorParam, method: &str, ascending: bool) -> Result<Self, String> {
        Ok(Self {
            name: name.to_string(),
            param,
            method: method.parse()?,
            ascending,
        })
    }

    pub fn col_name(&self) -> String {
        column_name(&self.name, &self.param)
    }
}

impl TryFrom<FilterTuple> for FilterFactorConfig {
    type Error = String;

    fn try_from(tuple: FilterTuple) -> Result<Self, Self::Error> {
        match tuple {
            FilterTuple::Sorted(name, param, method, ascending) => {
                Self::new(&name, param, &method, ascending)
            }
            FilterTuple::Plain(name, param, method) => Self::new(&name, param, &method, true),
        }
    }
}

impl fmt::Display for FilterFactorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = if self.ascending { "asc" } else { "desc" };
        write!(f, "{}:{arrow}:{}", self.col_name(), self.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_and_one_char_operators() {
        let e: RangeExpr = ">=0.5".parse().unwrap();
        assert_eq!(e.op, Comparison::Ge);
        assert_eq!(e.value, 0.5);
        let e: RangeExpr = "<10".parse().unwrap();
        assert_eq!(e.op, Comparison::Lt);
        let e: RangeExpr = "!=3".parse().unwrap();
        assert!(e.test(2.0));
        assert!(!e.test(3.0));
    }

    #[test]
    fn rejects_expressions() {
        assert!("<=a+b".parse::<RangeExpr>().is_err());
        assert!("~3".parse::<RangeExpr>().is_err());
    }

    #[test]
    fn method_ignores_whitespace() {
        let m: FilterMethod = " pct : <= 0.2 ".parse().unwrap();
        assert_eq!(m.how, FilterHow::Pct);
        assert_eq!(m.range.value, 0.2);
        assert_eq!(m.to_string(), "pct:<=0.2");
    }

    #[test]
    fn nan_only_passes_not_equal() {
        let nan = f64::NAN;
        assert!(!">=0".parse::<RangeExpr>().unwrap().test(nan));
        assert!("!=0".parse::<RangeExpr>().unwrap().test(nan));
    }

    #[test]
    fn deserializes_three_and_four_element_forms() {
        #[derive(Deserialize)]
        struct W {
            f: Vec<FilterFactorConfig>,
        }
        let w: W = toml::from_str(
            r#"f = [["QuoteVolumeMean", 48, "pct:>=0.8"], ["Volatility", 24, "rank:<=20", false]]"#,
        )
        .unwrap();
        assert!(w.f[0].ascending);
        assert_eq!(w.f[0].col_name(), "QuoteVolumeMean_48");
        assert!(!w.f[1].ascending);
        assert_eq!(w.f[1].method.how, FilterHow::Rank);
    }

    #[test]
    fn bad_method_fails_deserialization() {
        #[derive(Debug, Deserialize)]
        struct W {
            #[allow(dead_code)]
            f: Vec<FilterFactorConfig>,
        }
        assert!(toml::from_str::<W>(r#"f = [["Bias", 3, "top:<=5"]]"#).is_err());
    }
}
