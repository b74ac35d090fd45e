//! Market scope and order-priority venue.
//!
//! A market string is `"{scope}_{venue}"`:
//! - `spot_spot`: select from spot, trade spot.
//! - `swap_swap`: select from perpetuals, trade perpetuals.
//! - `spot_swap`: select from spot, trade the paired perpetual when one exists.
//! - `mix_spot` / `mix_swap`: select from both; a symbol listed on both venues
//!   keeps only the row of the preferred venue.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which listings a strategy ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectScope {
    Spot,
    Swap,
    Mix,
}

/// A trading venue: cash market or perpetual futures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Spot,
    Swap,
}

impl Venue {
    pub fn is_spot(self) -> bool {
        matches!(self, Venue::Spot)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Venue::Spot => "spot",
            Venue::Swap => "swap",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Venue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spot" => Ok(Venue::Spot),
            "swap" => Ok(Venue::Swap),
            other => Err(format!("unknown venue '{other}'")),
        }
    }
}

/// Selection universe × order-priority venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Market {
    pub scope: SelectScope,
    pub order_first: Venue,
}

impl Market {
    pub fn new(scope: SelectScope, order_first: Venue) -> Self {
        Self { scope, order_first }
    }

    /// Does a panel row on `is_spot` venue belong to this market's universe?
    ///
    /// `listed_on_both` is true when the economic symbol has both a spot and a
    /// perpetual listing at that bucket.
    pub fn admits(&self, is_spot: bool, listed_on_both: bool) -> bool {
        match self.scope {
            SelectScope::Spot => is_spot,
            SelectScope::Swap => !is_spot,
            SelectScope::Mix => !listed_on_both || is_spot == self.order_first.is_spot(),
        }
    }
}

impl Default for Market {
    fn default() -> Self {
        Self::new(SelectScope::Swap, Venue::Swap)
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = match self.scope {
            SelectScope::Spot => "spot",
            SelectScope::Swap => "swap",
            SelectScope::Mix => "mix",
        };
        write!(f, "{scope}_{}", self.order_first)
    }
}

impl FromStr for Market {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let (scope, venue) = lowered
            .split_once('_')
            .ok_or_else(|| format!("market '{s}' must look like 'scope_venue'"))?;
        let scope = match scope {
            "spot" => SelectScope::Spot,
            "swap" => SelectScope::Swap,
            "mix" => SelectScope::Mix,
            other => return Err(format!("unknown selection scope '{other}'")),
        };
        Ok(Self::new(scope, venue.parse()?))
    }
}

impl TryFrom<String> for Market {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Market> for String {
    fn from(market: Market) -> Self {
        market.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_documented_markets() {
        for s in ["spot_spot", "swap_swap", "spot_swap", "mix_spot", "mix_swap"] {
            let m: Market = s.parse().unwrap();
            assert_eq!(m.to_string(), s);
        }
    }

    #[test]
    fn rejects_malformed_market() {
        assert!("spot".parse::<Market>().is_err());
        assert!("futures_swap".parse::<Market>().is_err());
        assert!("spot_margin".parse::<Market>().is_err());
    }

    #[test]
    fn mix_keeps_preferred_venue_for_dual_listings() {
        let m: Market = "mix_swap".parse().unwrap();
        assert!(m.admits(false, true));
        assert!(!m.admits(true, true));
        // single-venue symbols are always kept
        assert!(m.admits(true, false));
    }

    #[test]
    fn serde_uses_string_form() {
        #[derive(Deserialize)]
        struct Wrapper {
            market: Market,
        }
        let w: Wrapper = toml::from_str("market = \"spot_swap\"").unwrap();
        assert_eq!(w.market, Market::new(SelectScope::Spot, Venue::Swap));
    }
}
