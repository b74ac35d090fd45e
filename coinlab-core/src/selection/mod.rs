//! Selection engine: per-strategy, per-bucket ranking, filtering and
//! count selection.

pub mod count;
pub mod engine;
pub mod filter;
pub mod offset;
pub mod rank;
pub mod transfer;

pub use count::{rank_window, resolve_count, CountClamp};
pub use engine::select;
pub use filter::filter_mask;
pub use offset::offset_of;
pub use rank::{by_bucket, rank_average, rank_min, to_pct};
pub use transfer::{transfer_to_swap, trim_to_common_start};
