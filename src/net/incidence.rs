//! 库所 × 迁移的稠密权值矩阵：Forward / Backward / Incidence / Inhibition 共用同一表示.
use std::fmt;
use std::ops::{AddAssign, Sub};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::net::ids::{PlaceId, TransitionId};
use crate::net::index_vec::{Idx, IndexVec};

type SmallRow<T> = SmallVec<[T; 4]>;

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Incidence<T> {
    rows: Vec<SmallRow<T>>,
    cols: usize,
}

impl<T> Incidence<T>
where
    T: Clone,
{
    pub fn new(places: usize, transitions: usize, default: T) -> Self {
        let rows = (0..places)
            .map(|_| SmallRow::from_elem(default.clone(), transitions))
            .collect();
        Self {
            rows,
            cols: transitions,
        }
    }

    pub fn places(&self) -> usize {
        self.rows.len()
    }

    pub fn transitions(&self) -> usize {
        self.cols
    }

    pub fn get(&self, place: PlaceId, transition: TransitionId) -> &T {
        &self.rows[place.index()][transition.index()]
    }

    pub fn get_mut(&mut self, place: PlaceId, transition: TransitionId) -> &mut T {
        &mut self.rows[place.index()][transition.index()]
    }

    pub fn set(&mut self, place: PlaceId, transition: TransitionId, value: T) {
        self.rows[place.index()][transition.index()] = value;
    }

    /// The entries of one transition's column, in place order.
    pub fn column(&self, transition: TransitionId) -> impl Iterator<Item = (PlaceId, &T)> {
        self.rows
            .iter()
            .enumerate()
            .map(move |(idx, row)| (PlaceId::from_usize(idx), &row[transition.index()]))
    }

    /// Detached `[place][transition]` copy of the matrix.
    pub fn to_rows(&self) -> Vec<Vec<T>> {
        self.rows.iter().map(|row| row.to_vec()).collect()
    }
}

impl<T> Incidence<T>
where
    T: Copy + AddAssign,
{
    /// Adds `delta` to an entry; parallel arcs between the same pair
    /// accumulate through this.
    pub fn accumulate(&mut self, place: PlaceId, transition: TransitionId, delta: T) {
        *self.get_mut(place, transition) += delta;
    }
}

impl<T> Incidence<T>
where
    T: Copy + Sub<Output = T>,
{
    /// Element-wise `self - other`. Both operands must share dimensions.
    pub fn difference(&self, other: &Self) -> Self {
        assert_eq!(self.places(), other.places());
        assert_eq!(self.transitions(), other.transitions());
        let rows = self
            .rows
            .iter()
            .zip(other.rows.iter())
            .map(|(left, right)| {
                left.iter()
                    .zip(right.iter())
                    .map(|(l, r)| *l - *r)
                    .collect::<SmallRow<_>>()
            })
            .collect();
        Incidence {
            rows,
            cols: self.cols,
        }
    }
}

impl<T> fmt::Debug for Incidence<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Incidence")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish()
    }
}

/// Gathers one value per place or transition into a typed vector.
pub fn gather<I, S, T>(items: &IndexVec<I, S>, f: impl FnMut(&S) -> T) -> IndexVec<I, T>
where
    I: Idx,
{
    items.iter().map(f).collect()
}
