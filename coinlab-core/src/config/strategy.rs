//! Per-strategy configuration: raw TOML form and validated form.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use super::factor::{FactorConfig, FactorParam};
use super::filter::FilterFactorConfig;
use super::ConfigError;
use crate::domain::{Direction, HoldPeriod, Market};
use crate::factors::FactorRegistry;

// ─── Selection counts ────────────────────────────────────────────────

/// How many symbols a side selects per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "RawSelectNum")]
pub enum SelectNum {
    /// `>= 1`: absolute count. `0 < x < 1`: fraction of the bucket universe.
    Count(f64),
    /// Rank window `(left, right)`, each bound absolute or fractional.
    Range(f64, f64),
    /// Same count as the long side in the same bucket (short side only).
    MatchLong,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSelectNum {
    Num(f64),
    Pair(f64, f64),
    Text(String),
}

impl TryFrom<RawSelectNum> for SelectNum {
    type Error = String;

    fn try_from(raw: RawSelectNum) -> Result<Self, Self::Error> {
        let check = |x: f64| {
            if x.is_finite() && x >= 0.0 {
                Ok(x)
            } else {
                Err(format!("select count {x} must be a non-negative number"))
            }
        };
        match raw {
            RawSelectNum::Num(x) => Ok(SelectNum::Count(check(x)?)),
            RawSelectNum::Pair(l, r) => Ok(SelectNum::Range(check(l)?, check(r)?)),
            RawSelectNum::Text(s) if s == "long_nums" => Ok(SelectNum::MatchLong),
            RawSelectNum::Text(s) => Err(format!("unknown select count '{s}'")),
        }
    }
}

impl SelectNum {
    pub fn is_zero(&self) -> bool {
        matches!(self, SelectNum::Count(x) if *x == 0.0)
    }
}

impl Default for SelectNum {
    fn default() -> Self {
        SelectNum::Count(0.1)
    }
}

impl fmt::Display for SelectNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectNum::Count(x) => write!(f, "{x}"),
            SelectNum::Range(l, r) => write!(f, "({l}, {r})"),
            SelectNum::MatchLong => f.write_str("long_nums"),
        }
    }
}

/// Which rank-window bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectInclusive {
    /// `>=` and `<=`.
    Both,
    /// `>=` and `<`.
    Left,
    /// `>` and `<=`.
    #[default]
    Right,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum InclusiveSpec {
    Shared(SelectInclusive),
    PerSide(SelectInclusive, SelectInclusive),
}

impl Default for InclusiveSpec {
    fn default() -> Self {
        InclusiveSpec::Shared(SelectInclusive::Right)
    }
}

// ─── Raw TOML form ───────────────────────────────────────────────────

fn default_hold_period() -> HoldPeriod {
    HoldPeriod::days(1)
}

fn default_offsets() -> Vec<u32> {
    vec![0]
}

fn default_short_num() -> SelectNum {
    SelectNum::MatchLong
}

fn one() -> f64 {
    1.0
}

/// A `[[strategy]]` table as written by the user.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategySpec {
    /// Strategy template label.
    pub strategy: String,
    /// Unique run name; defaults to `{index}.{strategy}`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_hold_period")]
    pub hold_period: HoldPeriod,
    #[serde(default = "default_offsets")]
    pub offset_list: Vec<u32>,
    #[serde(default)]
    pub market: Market,
    #[serde(default)]
    pub long_select_coin_num: SelectNum,
    #[serde(default = "default_short_num")]
    pub short_select_coin_num: SelectNum,
    #[serde(default)]
    pub long_select_coin_num_max: Option<f64>,
    #[serde(default)]
    pub short_select_coin_num_min: Option<f64>,
    #[serde(default)]
    select_inclusive: InclusiveSpec,
    #[serde(default = "one")]
    pub long_cap_weight: f64,
    #[serde(default = "one")]
    pub short_cap_weight: f64,
    #[serde(default = "one")]
    pub cap_weight: f64,

    #[serde(default)]
    pub factor_list: Vec<FactorConfig>,
    #[serde(default)]
    pub long_factor_list: Option<Vec<FactorConfig>>,
    #[serde(default)]
    pub short_factor_list: Option<Vec<FactorConfig>>,

    #[serde(default)]
    pub filter_list: Vec<FilterFactorConfig>,
    #[serde(default)]
    pub long_filter_list: Option<Vec<FilterFactorConfig>>,
    #[serde(default)]
    pub short_filter_list: Option<Vec<FilterFactorConfig>>,

    #[serde(default)]
    pub filter_list_post: Vec<FilterFactorConfig>,
    #[serde(default)]
    pub long_filter_list_post: Option<Vec<FilterFactorConfig>>,
    #[serde(default)]
    pub short_filter_list_post: Option<Vec<FilterFactorConfig>>,
}

/// Per-side lists fall back to the shared list, unless the other side was
/// given explicitly, in which case the missing side is empty.
fn split_sides<T: Clone>(shared: &[T], long: &Option<Vec<T>>, short: &Option<Vec<T>>) -> (Vec<T>, Vec<T>) {
    let fallback = if long.is_some() || short.is_some() {
        Vec::new()
    } else {
        shared.to_vec()
    };
    (
        long.clone().unwrap_or_else(|| fallback.clone()),
        short.clone().unwrap_or(fallback),
    )
}

// ─── Validated form ──────────────────────────────────────────────────

/// One side (long or short) of a strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct SideConfig {
    pub select_num: SelectNum,
    /// Upper clamp (long side) or lower clamp (short side) on the count.
    pub num_limit: Option<f64>,
    pub inclusive: SelectInclusive,
    /// Share of the strategy's capital; long + short == 1.
    pub cap_weight: f64,
    pub factor_list: Vec<FactorConfig>,
    pub filter_list: Vec<FilterFactorConfig>,
    pub filter_list_post: Vec<FilterFactorConfig>,
}

impl SideConfig {
    pub fn is_active(&self) -> bool {
        self.cap_weight > 0.0
    }

    fn describe(&self, label: &str) -> String {
        let join = |items: Vec<String>| format!("[{}]", items.join(","));
        format!(
            "{label}|weight:{:.2},num:{},limit:{},inclusive:{:?},factors{}&pre{}&post{}",
            self.cap_weight,
            self.select_num,
            self.num_limit.map_or_else(|| "none".to_string(), |l| l.to_string()),
            self.inclusive,
            join(self.factor_list.iter().map(|f| f.to_string()).collect()),
            join(self.filter_list.iter().map(|f| f.to_string()).collect()),
            join(self.filter_list_post.iter().map(|f| f.to_string()).collect()),
        )
    }
}

/// A validated strategy. Built only through [`StrategyConfig::from_spec`].
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub name: String,
    pub strategy: String,
    pub hold_period: HoldPeriod,
    /// Sorted, unique, each `< period_num`.
    pub offset_list: Vec<u32>,
    pub market: Market,
    /// Share of total capital; normalised across the backtest.
    pub cap_weight: f64,
    pub long: SideConfig,
    pub short: SideConfig,
}

/// Append zero-weight / no-op entries for the dependencies of every
/// cross-sectional factor referenced by a side.
fn expand_cross_dependencies(
    registry: &FactorRegistry,
    long: &mut Vec<FactorConfig>,
    short: &mut Vec<FactorConfig>,
) {
    let deps: Vec<(String, FactorParam)> = long
        .iter()
        .chain(short.iter())
        .flat_map(|f| registry.cross_dependencies(&f.name, &f.param))
        .collect();
    for (name, param) in deps {
        let entry = FactorConfig {
            name,
            ascending: true,
            param,
            weight: 0.0,
        };
        long.push(entry.clone());
        short.push(entry);
    }
}

fn expand_cross_filters(
    registry: &FactorRegistry,
    long: &mut Vec<FilterFactorConfig>,
    short: &mut Vec<FilterFactorConfig>,
) -> Result<(), ConfigError> {
    let deps: Vec<(String, FactorParam)> = long
        .iter()
        .chain(short.iter())
        .flat_map(|f| registry.cross_dependencies(&f.name, &f.param))
        .collect();
    for (name, param) in deps {
        let entry = FilterFactorConfig::new(&name, param, "pct:<2", true)
            .map_err(|reason| ConfigError::Invalid {
                field: "filter_list".into(),
                reason,
            })?;
        long.push(entry.clone());
        short.push(entry);
    }
    Ok(())
}

impl StrategyConfig {
    /// Validate and normalise a raw strategy table. `index` is its position
    /// in the backtest file, used for the default name.
    pub fn from_spec(
        index: usize,
        spec: StrategySpec,
        registry: &FactorRegistry,
    ) -> Result<Self, ConfigError> {
        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| format!("{index}.{}", spec.strategy));

        let (mut long_factors, mut short_factors) =
            split_sides(&spec.factor_list, &spec.long_factor_list, &spec.short_factor_list);
        for f in long_factors.iter().chain(short_factors.iter()) {
            if !f.weight.is_finite() || f.weight < 0.0 {
                return Err(ConfigError::NegativeWeight {
                    strategy: name.clone(),
                    factor: f.col_name(),
                });
            }
        }
        expand_cross_dependencies(registry, &mut long_factors, &mut short_factors);
        let long_factors = FactorConfig::normalize(long_factors);
        let short_factors = FactorConfig::normalize(short_factors);

        let (mut long_filters, mut short_filters) =
            split_sides(&spec.filter_list, &spec.long_filter_list, &spec.short_filter_list);
        expand_cross_filters(registry, &mut long_filters, &mut short_filters)?;
        let (mut long_post, mut short_post) = split_sides(
            &spec.filter_list_post,
            &spec.long_filter_list_post,
            &spec.short_filter_list_post,
        );
        expand_cross_filters(registry, &mut long_post, &mut short_post)?;

        if !(spec.long_cap_weight >= 0.0 && spec.short_cap_weight >= 0.0) {
            return Err(ConfigError::Invalid {
                field: format!("{name}.long_cap_weight/short_cap_weight"),
                reason: "side cap weights must be non-negative".into(),
            });
        }
        let side_total = spec.long_cap_weight + spec.short_cap_weight;
        if side_total == 0.0 {
            return Err(ConfigError::ZeroCapWeight(name));
        }
        let long_cap = spec.long_cap_weight / side_total;
        let short_cap = spec.short_cap_weight / side_total;

        let mut short_num = spec.short_select_coin_num;
        if long_cap == 0.0 && short_num == SelectNum::MatchLong {
            short_num = spec.long_select_coin_num;
        }

        for (direction, factors, num, cap) in [
            (Direction::Long, &long_factors, &spec.long_select_coin_num, long_cap),
            (Direction::Short, &short_factors, &short_num, short_cap),
        ] {
            if factors.is_empty() && !num.is_zero() && cap > 0.0 {
                return Err(ConfigError::EmptyFactorList {
                    strategy: name.clone(),
                    direction,
                });
            }
        }
        if spec.long_select_coin_num == SelectNum::MatchLong {
            return Err(ConfigError::Invalid {
                field: format!("{name}.long_select_coin_num"),
                reason: "'long_nums' is only valid for the short side".into(),
            });
        }

        let period_num = spec.hold_period.period_num();
        let mut offset_list: Vec<u32> = spec.offset_list.clone();
        offset_list.sort_unstable();
        offset_list.dedup();
        let before = offset_list.len();
        offset_list.retain(|&o| o < period_num);
        if offset_list.len() != before {
            warn!(
                strategy = %name,
                period = %spec.hold_period,
                kept = ?offset_list,
                "offsets outside the hold period were dropped"
            );
        }
        if offset_list.is_empty() {
            return Err(ConfigError::Invalid {
                field: format!("{name}.offset_list"),
                reason: format!("no offset below {period_num}"),
            });
        }
        if !(spec.cap_weight.is_finite() && spec.cap_weight >= 0.0) {
            return Err(ConfigError::Invalid {
                field: format!("{name}.cap_weight"),
                reason: "must be a non-negative number".into(),
            });
        }

        let (long_inclusive, short_inclusive) = match spec.select_inclusive {
            InclusiveSpec::Shared(i) => (i, i),
            InclusiveSpec::PerSide(l, s) => (l, s),
        };

        Ok(Self {
            name,
            strategy: spec.strategy,
            hold_period: spec.hold_period,
            offset_list,
            market: spec.market,
            cap_weight: spec.cap_weight,
            long: SideConfig {
                select_num: spec.long_select_coin_num,
                num_limit: spec.long_select_coin_num_max,
                inclusive: long_inclusive,
                cap_weight: long_cap,
                factor_list: long_factors,
                filter_list: long_filters,
                filter_list_post: long_post,
            },
            short: SideConfig {
                select_num: short_num,
                num_limit: spec.short_select_coin_num_min,
                inclusive: short_inclusive,
                cap_weight: short_cap,
                factor_list: short_factors,
                filter_list: short_filters,
                filter_list_post: short_post,
            },
        })
    }

    pub fn side(&self, direction: Direction) -> &SideConfig {
        match direction {
            Direction::Long => &self.long,
            Direction::Short => &self.short,
        }
    }

    /// Neither side can ever select anything.
    pub fn is_empty_selection(&self) -> bool {
        self.long.select_num.is_zero()
            && (self.short.select_num.is_zero() || self.short.select_num == SelectNum::MatchLong)
    }

    /// Every (factor, param) whose column selection reads, deduplicated by column.
    pub fn required_factors(&self) -> Vec<(String, FactorParam)> {
        let mut seen = std::collections::BTreeMap::new();
        for side in [&self.long, &self.short] {
            for f in &side.factor_list {
                seen.entry(f.col_name())
                    .or_insert_with(|| (f.name.clone(), f.param.clone()));
            }
            for f in side.filter_list.iter().chain(side.filter_list_post.iter()) {
                seen.entry(f.col_name())
                    .or_insert_with(|| (f.name.clone(), f.param.clone()));
            }
        }
        seen.into_values().collect()
    }

    /// Column names read by selection, sorted.
    pub fn factor_columns(&self) -> Vec<String> {
        let mut cols: Vec<String> = self
            .required_factors()
            .iter()
            .map(|(n, p)| super::factor::column_name(n, p))
            .collect();
        cols.sort();
        cols
    }

    /// Canonical description of everything that affects selection output
    /// except `cap_weight`.
    pub fn fullname(&self) -> String {
        let offsets: Vec<String> = self.offset_list.iter().map(|o| o.to_string()).collect();
        let mut name = format!(
            "{}-{}-{}-offset[{}]",
            self.name,
            self.hold_period,
            self.market,
            offsets.join(",")
        );
        if self.long.is_active() {
            name.push('-');
            name.push_str(&self.long.describe("long"));
        }
        if self.short.is_active() {
            name.push('-');
            name.push_str(&self.short.describe("short"));
        }
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> StrategySpec {
        toml::from_str(toml_src).unwrap()
    }

    fn build(toml_src: &str) -> Result<StrategyConfig, ConfigError> {
        StrategyConfig::from_spec(0, parse(toml_src), &FactorRegistry::with_builtins())
    }

    #[test]
    fn defaults_and_cap_normalisation() {
        let cfg = build(
            r#"
            strategy = "Momo"
            hold_period = "6H"
            offset_list = [0, 3, 7]
            long_cap_weight = 3
            short_cap_weight = 1
            factor_list = [["PctChange", false, 24, 1]]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.name, "0.Momo");
        assert_eq!(cfg.offset_list, vec![0, 3]);
        assert_eq!(cfg.long.cap_weight, 0.75);
        assert_eq!(cfg.short.cap_weight, 0.25);
        assert_eq!(cfg.short.select_num, SelectNum::MatchLong);
        assert_eq!(cfg.long.inclusive, SelectInclusive::Right);
        assert_eq!(cfg.market.to_string(), "swap_swap");
    }

    #[test]
    fn explicit_side_list_empties_the_other_side() {
        let err = build(
            r#"
            strategy = "S"
            factor_list = [["Bias", true, 3, 1]]
            long_factor_list = [["Bias", true, 3, 1]]
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::EmptyFactorList {
                direction: Direction::Short,
                ..
            }
        ));
    }

    #[test]
    fn empty_side_is_fine_without_capital() {
        let cfg = build(
            r#"
            strategy = "LongOnly"
            short_cap_weight = 0
            long_factor_list = [["Bias", true, 3, 1]]
            "#,
        )
        .unwrap();
        assert!(cfg.short.factor_list.is_empty());
        assert!(!cfg.short.is_active());
    }

    #[test]
    fn zero_cap_weights_rejected() {
        let err = build(
            r#"
            strategy = "S"
            long_cap_weight = 0
            short_cap_weight = 0
            factor_list = [["Bias", true, 3, 1]]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroCapWeight(_)));
    }

    #[test]
    fn long_nums_with_zero_long_cap_copies_long_count() {
        let cfg = build(
            r#"
            strategy = "ShortOnly"
            long_cap_weight = 0
            long_select_coin_num = 3
            factor_list = [["Bias", true, 3, 1]]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.short.select_num, SelectNum::Count(3.0));
        assert_eq!(cfg.short.cap_weight, 1.0);
    }

    #[test]
    fn cross_sectional_dependencies_are_appended() {
        let cfg = build(
            r#"
            strategy = "X"
            long_factor_list = [["BiasRankDiff", true, 3, 2]]
            short_cap_weight = 0
            filter_list = [["PctChangeRank", 6, "rank:<=10"]]
            "#,
        )
        .unwrap();
        let long = &cfg.long.factor_list;
        assert_eq!(long.len(), 2);
        assert_eq!(long[0].weight, 1.0);
        assert_eq!(long[1].col_name(), "Bias_3");
        assert_eq!(long[1].weight, 0.0);
        assert_eq!(cfg.short.factor_list[0].col_name(), "Bias_3");
        assert_eq!(cfg.long.filter_list[1].col_name(), "PctChange_6");
        assert_eq!(cfg.long.filter_list[1].method.to_string(), "pct:<2");
        assert!(cfg.factor_columns().contains(&"PctChange_6".to_string()));
    }

    #[test]
    fn per_side_inclusive_and_ranges() {
        let cfg = build(
            r#"
            strategy = "R"
            long_select_coin_num = [2, 5]
            short_select_coin_num = 0.2
            select_inclusive = ["both", "left"]
            factor_list = [["Bias", true, 3, 1]]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.long.select_num, SelectNum::Range(2.0, 5.0));
        assert_eq!(cfg.long.inclusive, SelectInclusive::Both);
        assert_eq!(cfg.short.inclusive, SelectInclusive::Left);
        assert_eq!(cfg.short.select_num, SelectNum::Count(0.2));
    }

    #[test]
    fn empty_selection_detection() {
        let cfg = build(
            r#"
            strategy = "Z"
            long_select_coin_num = 0
            factor_list = [["Bias", true, 3, 1]]
            "#,
        )
        .unwrap();
        assert!(cfg.is_empty_selection());
    }

    #[test]
    fn fullname_ignores_strategy_cap_weight() {
        let src = |w: f64| {
            format!(
                "strategy = \"F\"\ncap_weight = {w}\nfactor_list = [[\"Bias\", true, 3, 1]]\n"
            )
        };
        let a = build(&src(1.0)).unwrap();
        let b = build(&src(2.0)).unwrap();
        assert_eq!(a.fullname(), b.fullname());
        assert!(a.fullname().starts_with("0.F-1D-swap_swap-offset[0]-long|"));
    }

    #[test]
    fn bad_select_num_string() {
        assert!(toml::from_str::<StrategySpec>(
            "strategy = \"S\"\nshort_select_coin_num = \"lots\"\n"
        )
        .is_err());
    }

    #[test]
    fn all_offsets_out_of_range() {
        let err = build(
            r#"
            strategy = "O"
            hold_period = "2H"
            offset_list = [5]
            factor_list = [["Bias", true, 3, 1]]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
