//! 候选绑定的组合枚举与取令牌探测.
use itertools::{Either, Itertools};
use smallvec::SmallVec;

use crate::color::token::TokenBag;
use crate::net::ids::PlaceId;
use crate::net::index_vec::IndexVec;
use crate::net::structure::Place;

/// Which tokens of one input place a binding uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selection {
    /// The token at this position of the place's bag.
    Index(usize),
    /// Every token of a powerset-typed place.
    All,
}

/// Candidate selections for one input place: one per distinct token value
/// held (its first occurrence), or a single [`Selection::All`] for powerset
/// places.
pub fn candidates(bag: &TokenBag) -> Vec<Selection> {
    if bag.is_powerset() {
        return vec![Selection::All];
    }
    let mut seen = Vec::with_capacity(bag.len());
    let mut selections = Vec::with_capacity(bag.len());
    for (idx, token) in bag.iter().enumerate() {
        if !seen.contains(&token) {
            seen.push(token);
            selections.push(Selection::Index(idx));
        }
    }
    selections
}

/// Cartesian product of per-place candidates in input order, depth first:
/// the last place varies fastest. At most `limit` bindings are produced.
pub fn enumerate(
    per_place: Vec<Vec<Selection>>,
    limit: Option<usize>,
) -> impl Iterator<Item = Vec<Selection>> {
    let product = if per_place.is_empty() {
        Either::Left(std::iter::once(Vec::new()))
    } else {
        Either::Right(
            per_place
                .into_iter()
                .map(Vec::into_iter)
                .multi_cartesian_product(),
        )
    };
    product.take(limit.unwrap_or(usize::MAX))
}

/// The tokens a binding takes out of each input place, checked against the
/// live bags but not yet applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Withdrawal {
    takes: Vec<(PlaceId, Take)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Take {
    Indices(SmallVec<[usize; 4]>),
    All,
}

impl Withdrawal {
    /// Matches `selections` against `inputs` (aligned, one per input arc).
    /// Fails when a selection points past the bag or the same token would be
    /// taken twice.
    pub fn plan<'a>(
        inputs: impl IntoIterator<Item = (PlaceId, &'a TokenBag)>,
        selections: &[Selection],
    ) -> Option<Self> {
        let mut takes: Vec<(PlaceId, Take)> = Vec::new();
        for ((place, bag), selection) in inputs.into_iter().zip(selections) {
            let slot = takes.iter().position(|(held, _)| *held == place);
            match (*selection, slot) {
                (Selection::All, None) => takes.push((place, Take::All)),
                (Selection::Index(idx), None) if idx < bag.len() => {
                    takes.push((place, Take::Indices(SmallVec::from_elem(idx, 1))))
                }
                (Selection::Index(idx), Some(slot)) if idx < bag.len() => match &mut takes[slot].1 {
                    Take::Indices(indices) if !indices.contains(&idx) => indices.push(idx),
                    _ => return None,
                },
                _ => return None,
            }
        }
        Some(Self { takes })
    }

    pub fn places(&self) -> impl Iterator<Item = PlaceId> + '_ {
        self.takes.iter().map(|(place, _)| *place)
    }

    /// Removes the planned tokens from the live places and resynchronises
    /// their integer markings.
    pub fn commit(&self, places: &mut IndexVec<PlaceId, Place>) {
        for (place_id, take) in &self.takes {
            let Some(place) = places.get_mut(*place_id) else {
                log::warn!("withdrawal from missing place {place_id:?}");
                continue;
            };
            let Some(bag) = place.tokens.as_mut() else {
                log::warn!("withdrawal from {place_id:?} which is no longer colored");
                continue;
            };
            match take {
                Take::All => {
                    bag.take_all();
                }
                Take::Indices(indices) => {
                    let mut indices = indices.clone();
                    indices.sort_unstable_by(|a, b| b.cmp(a));
                    for idx in indices {
                        bag.remove_at(idx);
                    }
                }
            }
            place.sync_marking_with_tokens();
        }
    }
}
