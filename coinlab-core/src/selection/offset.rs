//! Offset phase of a time bucket relative to the unified epoch.

use chrono::NaiveDateTime;

use crate::domain::HoldPeriod;

/// `(floor(secs_since_unified / base) mod period_num + 1) mod period_num`,
/// where `base` is one hour or one day. Times before the epoch wrap
/// consistently.
pub fn offset_of(time: NaiveDateTime, unified_time: NaiveDateTime, period: &HoldPeriod) -> u32 {
    let period_num = i64::from(period.period_num());
    let secs = (time - unified_time).num_seconds();
    let phase = secs.div_euclid(period.offset_base_secs()).rem_euclid(period_num);
    ((phase + 1) % period_num) as u32
}
