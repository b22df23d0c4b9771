//! 按速率加权的随机迁移选择.
use rand::Rng;

use crate::net::ids::TransitionId;

/// Picks one of `candidates` with probability proportional to its rate.
///
/// A single candidate is returned without drawing from `rng`. Otherwise one
/// uniform draw in `[0, 1)` is compared against the cumulative normalised
/// rates in candidate order; should rounding leave the draw above the last
/// cumulative value, the last candidate wins. Rates must already be
/// validated positive.
pub fn select_weighted<R: Rng + ?Sized>(
    candidates: &[(TransitionId, f64)],
    rng: &mut R,
) -> Option<TransitionId> {
    match candidates {
        [] => None,
        [(only, _)] => Some(*only),
        _ => {
            let total: f64 = candidates.iter().map(|(_, rate)| rate).sum();
            let draw: f64 = rng.random();
            let mut cumulative = 0.0;
            for (transition, rate) in candidates {
                cumulative += rate / total;
                if draw < cumulative {
                    return Some(*transition);
                }
            }
            candidates.last().map(|(transition, _)| *transition)
        }
    }
}

/// First candidate whose rate is not a positive finite number.
pub fn invalid_rate(candidates: &[(TransitionId, f64)]) -> Option<(TransitionId, f64)> {
    candidates
        .iter()
        .copied()
        .find(|(_, rate)| !(rate.is_finite() && *rate > 0.0))
}
