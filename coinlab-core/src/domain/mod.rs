//! Domain types shared by selection, aggregation and lot sizing.

pub mod market;
pub mod period;
pub mod selection;

pub use market::{Market, SelectScope, Venue};
pub use period::{HoldPeriod, PeriodUnit};
pub use selection::{Direction, SelectionRow};
