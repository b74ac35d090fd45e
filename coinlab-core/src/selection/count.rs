//! Count-based selection within one time bucket.

use crate::config::SelectInclusive;

/// Optional clamp on a resolved count: longs cap it, shorts floor it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CountClamp {
    Max(f64),
    Min(f64),
}

/// Resolve a configured count against the bucket universe size.
///
/// `0 < num < 1` is a fraction of `total`, rounded. A zero clamp is ignored.
pub fn resolve_count(num: f64, total: usize, clamp: Option<CountClamp>) -> f64 {
    let n = if num.trunc() == 0.0 {
        (total as f64 * num).round()
    } else {
        num
    };
    match clamp {
        Some(CountClamp::Max(limit)) if limit > 0.0 => n.min(limit),
        Some(CountClamp::Min(limit)) if limit > 0.0 => n.max(limit),
        _ => n,
    }
}

/// Keep-mask over one bucket's `ranks` for the rank window `(left, right]`
/// (bound inclusivity per `inclusive`). `None` bounds are open.
pub fn rank_window(
    ranks: &[f64],
    left: Option<f64>,
    right: Option<f64>,
    inclusive: SelectInclusive,
    clamp: Option<CountClamp>,
) -> Vec<bool> {
    let total = ranks.len();
    let left = left.map(|n| resolve_count(n, total, clamp));
    let right = right.map(|n| resolve_count(n, total, clamp));
    ranks
        .iter()
        .map(|&r| {
            let above = match left {
                None => true,
                Some(n) if inclusive == SelectInclusive::Right => r > n,
                Some(n) => r >= n,
            };
            let below = match right {
                None => true,
                Some(n) if inclusive == SelectInclusive::Left => r < n,
                Some(n) => r <= n,
            };
            above && below
        })
        .collect()
}
