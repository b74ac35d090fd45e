use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::market::Venue;

/// Side of a selected position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn as_i8(self) -> i8 {
        match self {
            Direction::Long => 1,
            Direction::Short => -1,
        }
    }

    pub fn from_i8(value: i8) -> Option<Self> {
        match value {
            1 => Some(Direction::Long),
            -1 => Some(Direction::Short),
            _ => None,
        }
    }
}

/// One selected symbol for one strategy in one time bucket.
///
/// `target_alloc_ratio` is signed and already scaled by the side cap weight,
/// the strategy cap weight and `1 / len(offset_list)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRow {
    pub candle_begin_time: NaiveDateTime,
    pub symbol: String,
    pub is_spot: bool,
    /// Paired perpetual listing, empty when the symbol has none.
    pub symbol_swap: String,
    pub close: f64,
    pub direction: Direction,
    pub offset: u32,
    pub target_alloc_ratio: f64,
    pub strategy: String,
    pub cap_weight: f64,
    pub order_first: Venue,
}

impl SelectionRow {
    pub fn venue(&self) -> Venue {
        if self.is_spot {
            Venue::Spot
        } else {
            Venue::Swap
        }
    }
}
