//! 可发生性判定（纯函数）.
//!
//! 第一遍逐迁移检查输入令牌、容量与抑制弧；第二遍按优先级裁剪：
//! 只保留最高优先级的已使能瞬时迁移，且任何瞬时迁移使能时所有计时迁移被禁用。
use crate::net::ids::{PlaceId, TransitionId};
use crate::net::incidence::Incidence;
use crate::net::index_vec::{Idx, IndexVec};
use crate::net::structure::{Tokens, UNBOUNDED};

/// Everything besides the marking that decides enabling.
#[derive(Debug, Clone, Copy)]
pub struct EnablingRules<'a> {
    pub backward: &'a Incidence<Tokens>,
    pub forward: &'a Incidence<Tokens>,
    pub inhibition: &'a Incidence<Tokens>,
    /// 0 means unbounded.
    pub capacities: &'a IndexVec<PlaceId, Tokens>,
    pub priorities: &'a IndexVec<TransitionId, i32>,
    pub timed: &'a IndexVec<TransitionId, bool>,
}

/// Enabled flag of every transition under `marking`.
///
/// # Panics
///
/// If `marking` does not hold exactly one entry per place.
pub fn enabled(marking: &[Tokens], rules: &EnablingRules<'_>) -> IndexVec<TransitionId, bool> {
    check_len(marking, rules.backward);
    let mut result: IndexVec<TransitionId, bool> = rules
        .priorities
        .indices()
        .map(|transition| locally_enabled(marking, rules, transition))
        .collect();

    let max_priority = result
        .iter_enumerated()
        .filter(|(t, on)| **on && !rules.timed[*t])
        .map(|(t, _)| rules.priorities[t])
        .max();

    let Some(max_priority) = max_priority else {
        // No immediate transition is enabled: timed ones keep their flags.
        return result;
    };
    for (t, on) in result.iter_enumerated_mut() {
        if rules.timed[t] {
            // An enabled immediate transition exists, so timed ones yield.
            *on = false;
        } else if rules.priorities[t] < max_priority {
            *on = false;
        }
    }
    result
}

/// Input, capacity and inhibitor checks for one transition; the first failing
/// place decides.
fn locally_enabled(marking: &[Tokens], rules: &EnablingRules<'_>, t: TransitionId) -> bool {
    marking.iter().enumerate().all(|(j, &tokens)| {
        let p = PlaceId::from_usize(j);
        let backward = *rules.backward.get(p, t);
        if tokens < backward && tokens != UNBOUNDED {
            return false;
        }
        let capacity = rules.capacities[p];
        if capacity > 0 && tokens + *rules.forward.get(p, t) - backward > capacity {
            return false;
        }
        let threshold = *rules.inhibition.get(p, t);
        !(threshold > 0 && tokens >= threshold)
    })
}

/// The plain `marking >= backward` test for one transition. Panics like
/// [`enabled`] on a marking of the wrong length.
pub fn structurally_enabled(
    marking: &[Tokens],
    backward: &Incidence<Tokens>,
    transition: TransitionId,
) -> bool {
    check_len(marking, backward);
    backward
        .column(transition)
        .all(|(p, &need)| marking[p.index()] == UNBOUNDED || marking[p.index()] >= need)
}

/// How many times `transition` could fire at once from `marking`; `None`
/// when it has no constraining input place.
pub fn enabling_degree(
    marking: &[Tokens],
    backward: &Incidence<Tokens>,
    transition: TransitionId,
) -> Option<Tokens> {
    check_len(marking, backward);
    backward
        .column(transition)
        .filter(|(p, need)| **need > 0 && marking[p.index()] != UNBOUNDED)
        .map(|(p, need)| marking[p.index()] / need)
        .min()
}

fn check_len(marking: &[Tokens], backward: &Incidence<Tokens>) {
    assert_eq!(
        marking.len(),
        backward.places(),
        "marking length must equal the place count"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        backward: Incidence<Tokens>,
        forward: Incidence<Tokens>,
        inhibition: Incidence<Tokens>,
        capacities: IndexVec<PlaceId, Tokens>,
        priorities: IndexVec<TransitionId, i32>,
        timed: IndexVec<TransitionId, bool>,
    }

    impl Fixture {
        fn new(places: usize, transitions: usize) -> Self {
            Self {
                backward: Incidence::new(places, transitions, 0),
                forward: Incidence::new(places, transitions, 0),
                inhibition: Incidence::new(places, transitions, 0),
                capacities: IndexVec::from_elem(0, places),
                priorities: IndexVec::from_elem(1, transitions),
                timed: IndexVec::from_elem(false, transitions),
            }
        }

        fn rules(&self) -> EnablingRules<'_> {
            EnablingRules {
                backward: &self.backward,
                forward: &self.forward,
                inhibition: &self.inhibition,
                capacities: &self.capacities,
                priorities: &self.priorities,
                timed: &self.timed,
            }
        }

        fn eval(&self, marking: &[Tokens]) -> Vec<bool> {
            enabled(marking, &self.rules()).into_vec()
        }
    }

    const P0: PlaceId = PlaceId::new(0);
    const P1: PlaceId = PlaceId::new(1);
    const T0: TransitionId = TransitionId::new(0);
    const T1: TransitionId = TransitionId::new(1);
    const T2: TransitionId = TransitionId::new(2);

    #[test]
    fn input_capacity_and_inhibitor_checks() {
        let mut f = Fixture::new(2, 3);
        f.backward.set(P0, T0, 2);
        f.forward.set(P1, T1, 2);
        f.capacities[P1] = 2;
        f.inhibition.set(P1, T2, 1);

        assert_eq!(f.eval(&[1, 0]), vec![false, true, true]);
        assert_eq!(f.eval(&[2, 1]), vec![true, false, false]);
        // The sentinel satisfies any input requirement.
        assert!(f.eval(&[UNBOUNDED, 0])[0]);
    }

    #[test]
    fn only_highest_priority_immediate_survives() {
        let mut f = Fixture::new(1, 3);
        f.priorities[T0] = 3;
        f.priorities[T1] = 3;
        f.priorities[T2] = 1;
        assert_eq!(f.eval(&[0]), vec![true, true, false]);

        f.backward.set(P0, T0, 1);
        f.backward.set(P0, T1, 1);
        assert_eq!(f.eval(&[0]), vec![false, false, true]);
    }

    #[test]
    fn immediate_preempts_timed() {
        let mut f = Fixture::new(1, 2);
        f.timed[T1] = true;
        f.priorities[T1] = 10;
        assert_eq!(f.eval(&[0]), vec![true, false]);

        f.backward.set(P0, T0, 1);
        assert_eq!(f.eval(&[0]), vec![false, true]);
    }

    #[test]
    fn degree_is_min_over_inputs() {
        let mut backward = Incidence::new(2, 1, 0);
        backward.set(P0, T0, 2);
        backward.set(P1, T0, 1);
        assert_eq!(enabling_degree(&[5, 3], &backward, T0), Some(2));
        assert_eq!(enabling_degree(&[UNBOUNDED, 3], &backward, T0), Some(3));
        assert!(structurally_enabled(&[2, 1], &backward, T0));
        assert!(!structurally_enabled(&[1, 1], &backward, T0));
    }

    #[test]
    #[should_panic(expected = "marking length must equal the place count")]
    fn short_marking_is_rejected() {
        let f = Fixture::new(2, 1);
        f.eval(&[1]);
    }

    #[test]
    #[should_panic(expected = "marking length must equal the place count")]
    fn long_marking_is_rejected_by_degree() {
        let backward = Incidence::new(1, 1, 0);
        enabling_degree(&[1, 1], &backward, T0);
    }
}
