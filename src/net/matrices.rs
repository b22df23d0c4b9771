//! 结构矩阵（前向、后向、关联、抑制）的派生与缓存.
//!
//! 每个矩阵带一个脏标志：拓扑或弧权变化时置位，重算时清除。
//! 标识变化只使缓存的标识向量失效，不影响四个拓扑矩阵。
use std::collections::HashMap;

use bitflags::bitflags;

use crate::net::ids::{PlaceId, TransitionId};
use crate::net::incidence::Incidence;
use crate::net::index_vec::IndexVec;
use crate::net::structure::{Arc, ArcKind, Place, Tokens, Transition};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Dirty: u8 {
        const FORWARD = 1 << 0;
        const BACKWARD = 1 << 1;
        const INCIDENCE = 1 << 2;
        const INHIBITION = 1 << 3;
        const CURRENT_MARKING = 1 << 4;
        const INITIAL_MARKING = 1 << 5;

        const TOPOLOGY = Self::FORWARD.bits()
            | Self::BACKWARD.bits()
            | Self::INCIDENCE.bits()
            | Self::INHIBITION.bits();
        const MARKINGS = Self::CURRENT_MARKING.bits() | Self::INITIAL_MARKING.bits();
    }
}

/// Forward, backward and inhibition weights derived from one pass over the
/// arcs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub forward: Incidence<Tokens>,
    pub backward: Incidence<Tokens>,
    pub inhibition: Incidence<Tokens>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Place(PlaceId),
    Transition(TransitionId),
}

impl Topology {
    /// Walks every arc once. Parallel arcs accumulate; arcs whose ends are
    /// missing or point the wrong way are skipped.
    pub fn build(
        places: &IndexVec<PlaceId, Place>,
        transitions: &IndexVec<TransitionId, Transition>,
        arcs: &[Arc],
    ) -> Self {
        let (p, t) = (places.len(), transitions.len());
        let mut topology = Self {
            forward: Incidence::new(p, t, 0),
            backward: Incidence::new(p, t, 0),
            inhibition: Incidence::new(p, t, 0),
        };

        let mut endpoints: HashMap<String, Endpoint> = HashMap::with_capacity(p + t);
        for (id, place) in places.iter_enumerated() {
            endpoints
                .entry(place.id.to_ascii_lowercase())
                .or_insert(Endpoint::Place(id));
        }
        for (id, transition) in transitions.iter_enumerated() {
            endpoints
                .entry(transition.id.to_ascii_lowercase())
                .or_insert(Endpoint::Transition(id));
        }

        for arc in arcs {
            let source = endpoints.get(&arc.source.to_ascii_lowercase()).copied();
            let target = endpoints.get(&arc.target.to_ascii_lowercase()).copied();
            let (Some(source), Some(target)) = (source, target) else {
                log::warn!(
                    "arc {} references a missing endpoint ({} -> {}), skipped",
                    arc.id,
                    arc.source,
                    arc.target
                );
                continue;
            };
            match (arc.kind, source, target) {
                (ArcKind::Normal, Endpoint::Place(place), Endpoint::Transition(transition)) => {
                    topology.backward.accumulate(place, transition, arc.weight)
                }
                (ArcKind::Normal, Endpoint::Transition(transition), Endpoint::Place(place)) => {
                    topology.forward.accumulate(place, transition, arc.weight)
                }
                (ArcKind::Inhibitor, Endpoint::Place(place), Endpoint::Transition(transition)) => {
                    topology.inhibition.accumulate(place, transition, arc.weight)
                }
                _ => log::debug!("arc {} has an unsupported direction, ignored", arc.id),
            }
        }
        topology
    }
}

/// Cached structural matrices and marking vectors of one net.
#[derive(Debug, Clone)]
pub struct StructuralMatrices {
    forward: Incidence<Tokens>,
    backward: Incidence<Tokens>,
    incidence: Incidence<Tokens>,
    inhibition: Incidence<Tokens>,
    current_marking: IndexVec<PlaceId, Tokens>,
    initial_marking: IndexVec<PlaceId, Tokens>,
    dirty: Dirty,
    rebuilds: usize,
}

impl Default for StructuralMatrices {
    fn default() -> Self {
        Self::new()
    }
}

impl StructuralMatrices {
    pub fn new() -> Self {
        Self {
            forward: Incidence::new(0, 0, 0),
            backward: Incidence::new(0, 0, 0),
            incidence: Incidence::new(0, 0, 0),
            inhibition: Incidence::new(0, 0, 0),
            current_marking: IndexVec::new(),
            initial_marking: IndexVec::new(),
            dirty: Dirty::all(),
            rebuilds: 0,
        }
    }

    pub fn invalidate(&mut self, flags: Dirty) {
        self.dirty |= flags;
    }

    pub fn dirty(&self) -> Dirty {
        self.dirty
    }

    /// Number of topology rebuilds so far.
    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    /// Recomputes whatever is dirty.
    pub fn refresh(
        &mut self,
        places: &IndexVec<PlaceId, Place>,
        transitions: &IndexVec<TransitionId, Transition>,
        arcs: &[Arc],
    ) {
        if self.dirty.intersects(Dirty::TOPOLOGY) {
            self.rebuild(places, transitions, arcs);
        }
        if self.dirty.contains(Dirty::CURRENT_MARKING) {
            self.current_marking = places.iter().map(|place| place.current_marking).collect();
            self.dirty.remove(Dirty::CURRENT_MARKING);
        }
        if self.dirty.contains(Dirty::INITIAL_MARKING) {
            self.initial_marking = places.iter().map(|place| place.initial_marking).collect();
            self.dirty.remove(Dirty::INITIAL_MARKING);
        }
    }

    /// Unconditionally recomputes the four topology matrices.
    pub fn rebuild(
        &mut self,
        places: &IndexVec<PlaceId, Place>,
        transitions: &IndexVec<TransitionId, Transition>,
        arcs: &[Arc],
    ) {
        let Topology {
            forward,
            backward,
            inhibition,
        } = Topology::build(places, transitions, arcs);
        self.incidence = forward.difference(&backward);
        self.forward = forward;
        self.backward = backward;
        self.inhibition = inhibition;
        self.dirty.remove(Dirty::TOPOLOGY);
        self.rebuilds += 1;
        log::debug!(
            "rebuilt structural matrices: {} places x {} transitions",
            places.len(),
            transitions.len()
        );
    }

    pub fn forward(&self) -> &Incidence<Tokens> {
        self.assert_fresh(Dirty::FORWARD);
        &self.forward
    }

    pub fn backward(&self) -> &Incidence<Tokens> {
        self.assert_fresh(Dirty::BACKWARD);
        &self.backward
    }

    pub fn incidence(&self) -> &Incidence<Tokens> {
        self.assert_fresh(Dirty::INCIDENCE);
        &self.incidence
    }

    pub fn inhibition(&self) -> &Incidence<Tokens> {
        self.assert_fresh(Dirty::INHIBITION);
        &self.inhibition
    }

    pub fn current_marking(&self) -> &IndexVec<PlaceId, Tokens> {
        self.assert_fresh(Dirty::CURRENT_MARKING);
        &self.current_marking
    }

    pub fn initial_marking(&self) -> &IndexVec<PlaceId, Tokens> {
        self.assert_fresh(Dirty::INITIAL_MARKING);
        &self.initial_marking
    }

    fn assert_fresh(&self, flag: Dirty) {
        debug_assert!(
            !self.dirty.intersects(flag),
            "stale {flag:?} read without refresh"
        );
    }
}
