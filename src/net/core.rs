//! 网存储与执行引擎：对象集合、标识、结构矩阵缓存、发生与加权随机选择.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::color::{ColorError, Token, TokenBag};
use crate::config::EngineConfig;
use crate::formula::FormulaError;
use crate::net::enabling::{self, EnablingRules};
use crate::net::events::{Direction, Listeners, NetEvent, NetListener};
use crate::net::ids::{PlaceId, TransitionId, fresh_id};
use crate::net::incidence::gather;
use crate::net::index_vec::{Idx, IndexVec};
use crate::net::matrices::{Dirty, StructuralMatrices};
use crate::net::selection::{invalid_rate, select_weighted};
use crate::net::structure::{
    Annotation, Arc, ArcKind, Marking, NetObject, ObjectKind, Parameter, ParameterValue, Place,
    Tokens, Transition,
};
use crate::net::undo::{PlaceSnapshot, UndoEntry, UndoStack};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetError {
    #[error("transition `{transition}` has rate {rate}; rates must be positive and finite")]
    InvalidRate { transition: String, rate: f64 },
    #[error("transition {0:?} is out of bounds")]
    UnknownTransition(TransitionId),
    #[error("no object with id `{0}`")]
    UnknownObject(String),
    #[error("no parameter named `{0}`")]
    UnknownParameter(String),
    #[error("parameter name `{0}` is already in use")]
    ParameterNameTaken(String),
    #[error("parameter `{0}` holds a value of the wrong kind")]
    ParameterKindMismatch(String),
    #[error(transparent)]
    Formula(#[from] FormulaError),
    #[error(transparent)]
    Color(#[from] ColorError),
}

/// A Petri net together with its execution state.
///
/// Objects are identified externally by string ids (`P0`, `T1`, `A2`, `I0`,
/// `N3`), compared case-insensitively. Positional [`PlaceId`] /
/// [`TransitionId`] values index the current collections and shift when an
/// object is removed.
#[derive(Debug, Clone)]
pub struct Net {
    pub(crate) places: IndexVec<PlaceId, Place>,
    pub(crate) transitions: IndexVec<TransitionId, Transition>,
    pub(crate) arcs: Vec<Arc>,
    annotations: Vec<Annotation>,
    parameters: Vec<Parameter>,
    pub(crate) matrices: StructuralMatrices,
    pub(crate) undo: UndoStack,
    stored_state: Option<Vec<Tokens>>,
    pub(crate) rng: StdRng,
    pub(crate) config: EngineConfig,
    pub(crate) listeners: Listeners,
}

impl Default for Net {
    fn default() -> Self {
        Self::new()
    }
}

impl Net {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            places: IndexVec::new(),
            transitions: IndexVec::new(),
            arcs: Vec::new(),
            annotations: Vec::new(),
            parameters: Vec::new(),
            matrices: StructuralMatrices::new(),
            undo: UndoStack::new(config.undo_depth),
            stored_state: None,
            rng,
            config,
            listeners: Listeners::default(),
        }
    }

    /// A net whose shared generator starts from `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self::with_config(EngineConfig {
            seed: Some(seed),
            ..EngineConfig::default()
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Independent copy without listeners, for running on another thread.
    pub fn detached(&self) -> Self {
        self.clone()
    }

    pub fn subscribe(&mut self, listener: impl NetListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn emit_with(&mut self, event: impl FnOnce() -> NetEvent) {
        self.listeners.emit_with(event);
    }

    // ---------------------------------------------------------------------
    // Construction
    // ---------------------------------------------------------------------

    fn id_taken(&self, id: &str) -> bool {
        self.find_object(id).is_some()
    }

    /// Keeps a supplied unique id, otherwise generates `<prefix><n>` starting
    /// at `count`.
    fn assign_id(&self, supplied: &str, prefix: &str, count: usize) -> String {
        if !supplied.is_empty() {
            if !self.id_taken(supplied) {
                return supplied.to_owned();
            }
            let fresh = fresh_id(prefix, count, |candidate| self.id_taken(candidate));
            log::warn!("duplicate id `{supplied}` replaced by `{fresh}`");
            return fresh;
        }
        fresh_id(prefix, count, |candidate| self.id_taken(candidate))
    }

    pub fn add_place(&mut self, mut place: Place) -> String {
        place.id = self.assign_id(&place.id, "P", self.places.len());
        if let Some(name) = place.marking_parameter.clone() {
            match self.parameter_value(&name, &ParameterValue::Marking(0)) {
                Some(ParameterValue::Marking(value)) => {
                    place.initial_marking = value;
                    place.current_marking = value;
                }
                _ => {
                    log::warn!("place {} bound to unknown marking parameter `{name}`", place.id);
                    place.marking_parameter = None;
                }
            }
        }
        let id = place.id.clone();
        self.places.push(place.clone());
        self.matrices.invalidate(Dirty::TOPOLOGY | Dirty::MARKINGS);
        self.emit_with(|| NetEvent::Added(NetObject::Place(place)));
        id
    }

    pub fn add_transition(&mut self, mut transition: Transition) -> String {
        transition.id = self.assign_id(&transition.id, "T", self.transitions.len());
        if let Some(name) = transition.rate_parameter.clone() {
            match self.parameter_value(&name, &ParameterValue::Rate(0.0)) {
                Some(ParameterValue::Rate(value)) => transition.rate = value,
                _ => {
                    log::warn!(
                        "transition {} bound to unknown rate parameter `{name}`",
                        transition.id
                    );
                    transition.rate_parameter = None;
                }
            }
        }
        let id = transition.id.clone();
        self.transitions.push(transition.clone());
        self.matrices.invalidate(Dirty::TOPOLOGY);
        self.emit_with(|| NetEvent::Added(NetObject::Transition(transition)));
        id
    }

    /// Adds a normal or inhibitor arc. Weights below 1 are raised to 1; the
    /// variable label defaults to the adjacent place's name.
    pub fn add_arc(&mut self, mut arc: Arc) -> String {
        let prefix = match arc.kind {
            ArcKind::Normal => "A",
            ArcKind::Inhibitor => "I",
        };
        let count = self.arcs.iter().filter(|a| a.kind == arc.kind).count();
        arc.id = self.assign_id(&arc.id, prefix, count);
        if arc.weight < 1 {
            log::warn!("arc {} has weight {}, clamped to 1", arc.id, arc.weight);
            arc.weight = 1;
        }
        if arc.variable.is_none() {
            arc.variable = self
                .place(&arc.source)
                .or_else(|| self.place(&arc.target))
                .map(|place| place.name.clone());
        }
        let id = arc.id.clone();
        self.arcs.push(arc.clone());
        self.matrices.invalidate(Dirty::TOPOLOGY);
        self.emit_with(|| NetEvent::Added(NetObject::from(arc)));
        id
    }

    pub fn add_annotation(&mut self, mut annotation: Annotation) -> String {
        annotation.id = self.assign_id(&annotation.id, "N", self.annotation_count());
        let id = annotation.id.clone();
        self.annotations.push(annotation.clone());
        self.emit_with(|| NetEvent::Added(NetObject::Annotation(annotation)));
        id
    }

    /// Parameters share the `N<n>` id space with annotations. Names are unique
    /// per kind.
    pub fn add_parameter(&mut self, mut parameter: Parameter) -> Result<String, NetError> {
        if self.parameter_name_taken(&parameter.name, &parameter.value) {
            return Err(NetError::ParameterNameTaken(parameter.name));
        }
        parameter.id = self.assign_id(&parameter.id, "N", self.annotation_count());
        let id = parameter.id.clone();
        self.parameters.push(parameter.clone());
        self.emit_with(|| NetEvent::Added(NetObject::Parameter(parameter)));
        Ok(id)
    }

    /// Dispatches on the object kind.
    pub fn add_object(&mut self, object: NetObject) -> Result<String, NetError> {
        Ok(match object {
            NetObject::Place(place) => self.add_place(place),
            NetObject::Transition(transition) => self.add_transition(transition),
            NetObject::NormalArc(mut arc) => {
                arc.kind = ArcKind::Normal;
                self.add_arc(arc)
            }
            NetObject::InhibitorArc(mut arc) => {
                arc.kind = ArcKind::Inhibitor;
                self.add_arc(arc)
            }
            NetObject::Annotation(annotation) => self.add_annotation(annotation),
            NetObject::Parameter(parameter) => return self.add_parameter(parameter),
        })
    }

    fn annotation_count(&self) -> usize {
        self.annotations.len() + self.parameters.len()
    }

    /// Removes the object with `id`. Removing a place or transition first
    /// removes every arc attached to it; removing a parameter unbinds the
    /// objects that used it.
    pub fn remove_object(&mut self, id: &str) -> Option<NetObject> {
        let removed = match self.find_object(id)? {
            ObjectKind::Place => {
                self.remove_attached_arcs(id);
                let index = self.place_index(id)?;
                self.matrices.invalidate(Dirty::TOPOLOGY | Dirty::MARKINGS);
                self.stored_state = None;
                NetObject::Place(self.places.remove(index))
            }
            ObjectKind::Transition => {
                self.remove_attached_arcs(id);
                let index = self.transition_index(id)?;
                self.matrices.invalidate(Dirty::TOPOLOGY);
                NetObject::Transition(self.transitions.remove(index))
            }
            ObjectKind::NormalArc | ObjectKind::InhibitorArc => {
                let index = self.arcs.iter().position(|arc| arc.id.eq_ignore_ascii_case(id))?;
                self.matrices.invalidate(Dirty::TOPOLOGY);
                NetObject::from(self.arcs.remove(index))
            }
            ObjectKind::Annotation => {
                let index = self
                    .annotations
                    .iter()
                    .position(|annotation| annotation.id.eq_ignore_ascii_case(id))?;
                NetObject::Annotation(self.annotations.remove(index))
            }
            ObjectKind::Parameter => {
                let index = self
                    .parameters
                    .iter()
                    .position(|parameter| parameter.id.eq_ignore_ascii_case(id))?;
                let parameter = self.parameters.remove(index);
                self.unbind_parameter(&parameter);
                NetObject::Parameter(parameter)
            }
        };
        log::debug!("removed {:?} {}", removed.kind(), removed.id());
        let event = removed.clone();
        self.emit_with(|| NetEvent::Removed(event));
        Some(removed)
    }

    fn remove_attached_arcs(&mut self, object_id: &str) {
        let attached: Vec<String> = self
            .arcs
            .iter()
            .filter(|arc| arc.touches(object_id))
            .map(|arc| arc.id.clone())
            .collect();
        for arc_id in attached {
            self.remove_object(&arc_id);
        }
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    fn find_object(&self, id: &str) -> Option<ObjectKind> {
        let matches = |other: &str| other.eq_ignore_ascii_case(id);
        if self.places.iter().any(|p| matches(&p.id)) {
            Some(ObjectKind::Place)
        } else if self.transitions.iter().any(|t| matches(&t.id)) {
            Some(ObjectKind::Transition)
        } else if let Some(arc) = self.arcs.iter().find(|a| matches(&a.id)) {
            Some(match arc.kind {
                ArcKind::Normal => ObjectKind::NormalArc,
                ArcKind::Inhibitor => ObjectKind::InhibitorArc,
            })
        } else if self.annotations.iter().any(|a| matches(&a.id)) {
            Some(ObjectKind::Annotation)
        } else if self.parameters.iter().any(|p| matches(&p.id)) {
            Some(ObjectKind::Parameter)
        } else {
            None
        }
    }

    /// Clone of the object with `id`, whatever its kind.
    pub fn object(&self, id: &str) -> Option<NetObject> {
        let matches = |other: &str| other.eq_ignore_ascii_case(id);
        match self.find_object(id)? {
            ObjectKind::Place => self.place(id).cloned().map(NetObject::Place),
            ObjectKind::Transition => self.transition(id).cloned().map(NetObject::Transition),
            ObjectKind::NormalArc | ObjectKind::InhibitorArc => {
                self.arc(id).cloned().map(NetObject::from)
            }
            ObjectKind::Annotation => self
                .annotations
                .iter()
                .find(|a| matches(&a.id))
                .cloned()
                .map(NetObject::Annotation),
            ObjectKind::Parameter => self
                .parameters
                .iter()
                .find(|p| matches(&p.id))
                .cloned()
                .map(NetObject::Parameter),
        }
    }

    /// Clones of every object of `kind`, in insertion order.
    pub fn objects_of_kind(&self, kind: ObjectKind) -> Vec<NetObject> {
        match kind {
            ObjectKind::Place => self.places.iter().cloned().map(NetObject::Place).collect(),
            ObjectKind::Transition => self
                .transitions
                .iter()
                .cloned()
                .map(NetObject::Transition)
                .collect(),
            ObjectKind::NormalArc => self
                .arcs
                .iter()
                .filter(|arc| arc.kind == ArcKind::Normal)
                .cloned()
                .map(NetObject::NormalArc)
                .collect(),
            ObjectKind::InhibitorArc => self
                .arcs
                .iter()
                .filter(|arc| arc.kind == ArcKind::Inhibitor)
                .cloned()
                .map(NetObject::InhibitorArc)
                .collect(),
            ObjectKind::Annotation => self
                .annotations
                .iter()
                .cloned()
                .map(NetObject::Annotation)
                .collect(),
            ObjectKind::Parameter => self
                .parameters
                .iter()
                .cloned()
                .map(NetObject::Parameter)
                .collect(),
        }
    }

    pub fn place(&self, id: &str) -> Option<&Place> {
        self.places.iter().find(|p| p.id.eq_ignore_ascii_case(id))
    }

    pub fn place_by_name(&self, name: &str) -> Option<&Place> {
        self.places.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn place_index(&self, id: &str) -> Option<PlaceId> {
        self.places.position(|p| p.id.eq_ignore_ascii_case(id))
    }

    pub fn transition(&self, id: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.id.eq_ignore_ascii_case(id))
    }

    pub fn transition_by_name(&self, name: &str) -> Option<&Transition> {
        self.transitions
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn transition_index(&self, id: &str) -> Option<TransitionId> {
        self.transitions.position(|t| t.id.eq_ignore_ascii_case(id))
    }

    pub fn arc(&self, id: &str) -> Option<&Arc> {
        self.arcs.iter().find(|a| a.id.eq_ignore_ascii_case(id))
    }

    pub fn places(&self) -> &[Place] {
        self.places.as_slice()
    }

    pub fn transitions(&self) -> &[Transition] {
        self.transitions.as_slice()
    }

    pub fn arcs(&self) -> &[Arc] {
        &self.arcs
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn place_count(&self) -> usize {
        self.places.len()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    /// Recomputes every dirty cache. Called at the start of each read.
    fn refresh(&mut self) {
        self.matrices
            .refresh(&self.places, &self.transitions, &self.arcs);
    }

    pub fn current_marking(&mut self) -> Marking {
        self.refresh();
        Marking::from(self.matrices.current_marking().clone())
    }

    pub fn initial_marking(&mut self) -> Marking {
        self.refresh();
        Marking::from(self.matrices.initial_marking().clone())
    }

    pub fn forward_matrix(&mut self) -> Vec<Vec<Tokens>> {
        self.refresh();
        self.matrices.forward().to_rows()
    }

    pub fn backward_matrix(&mut self) -> Vec<Vec<Tokens>> {
        self.refresh();
        self.matrices.backward().to_rows()
    }

    pub fn incidence_matrix(&mut self) -> Vec<Vec<Tokens>> {
        self.refresh();
        self.matrices.incidence().to_rows()
    }

    pub fn inhibition_matrix(&mut self) -> Vec<Vec<Tokens>> {
        self.refresh();
        self.matrices.inhibition().to_rows()
    }

    /// Forces a rebuild of the topology matrices even when nothing is dirty.
    pub fn rebuild_matrices(&mut self) {
        self.matrices
            .rebuild(&self.places, &self.transitions, &self.arcs);
    }

    /// Gathered fresh on every call.
    pub fn capacities(&self) -> IndexVec<PlaceId, Tokens> {
        gather(&self.places, |place| place.capacity)
    }

    pub fn priorities(&self) -> IndexVec<TransitionId, i32> {
        gather(&self.transitions, |transition| transition.priority)
    }

    pub fn timed_flags(&self) -> IndexVec<TransitionId, bool> {
        gather(&self.transitions, |transition| transition.timed)
    }

    pub fn has_timed_transitions(&self) -> bool {
        self.transitions.iter().any(|t| t.timed)
    }

    pub fn has_immediate_transitions(&self) -> bool {
        self.transitions.iter().any(|t| !t.timed)
    }

    // ---------------------------------------------------------------------
    // Attribute edits
    // ---------------------------------------------------------------------

    fn place_mut(&mut self, id: &str) -> Result<&mut Place, NetError> {
        let index = self
            .place_index(id)
            .ok_or_else(|| NetError::UnknownObject(id.to_owned()))?;
        Ok(&mut self.places[index])
    }

    fn transition_mut(&mut self, id: &str) -> Result<&mut Transition, NetError> {
        let index = self
            .transition_index(id)
            .ok_or_else(|| NetError::UnknownObject(id.to_owned()))?;
        Ok(&mut self.transitions[index])
    }

    /// Sets the current marking of an uncolored place.
    pub fn set_marking(&mut self, place_id: &str, marking: Tokens) -> Result<(), NetError> {
        let place = self.place_mut(place_id)?;
        place.current_marking = marking;
        let place = place.id.clone();
        self.matrices.invalidate(Dirty::CURRENT_MARKING);
        self.emit_with(|| NetEvent::MarkingChanged { place, marking });
        Ok(())
    }

    pub fn set_initial_marking(&mut self, place_id: &str, marking: Tokens) -> Result<(), NetError> {
        self.place_mut(place_id)?.initial_marking = marking;
        self.matrices.invalidate(Dirty::INITIAL_MARKING);
        Ok(())
    }

    /// Capacities are read fresh, so no cache is touched.
    pub fn set_capacity(&mut self, place_id: &str, capacity: Tokens) -> Result<(), NetError> {
        self.place_mut(place_id)?.capacity = capacity;
        Ok(())
    }

    pub fn set_arc_weight(&mut self, arc_id: &str, weight: Tokens) -> Result<(), NetError> {
        let arc = self
            .arcs
            .iter_mut()
            .find(|arc| arc.id.eq_ignore_ascii_case(arc_id))
            .ok_or_else(|| NetError::UnknownObject(arc_id.to_owned()))?;
        if weight < 1 {
            log::warn!("arc {} weight {weight} clamped to 1", arc.id);
        }
        arc.weight = weight.max(1);
        self.matrices.invalidate(Dirty::TOPOLOGY);
        Ok(())
    }

    pub fn set_rate(&mut self, transition_id: &str, rate: f64) -> Result<(), NetError> {
        self.transition_mut(transition_id)?.rate = rate;
        Ok(())
    }

    pub fn set_priority(&mut self, transition_id: &str, priority: i32) -> Result<(), NetError> {
        self.transition_mut(transition_id)?.priority = priority;
        Ok(())
    }

    pub fn set_timed(&mut self, transition_id: &str, timed: bool) -> Result<(), NetError> {
        self.transition_mut(transition_id)?.timed = timed;
        Ok(())
    }

    pub fn set_formula(&mut self, transition_id: &str, source: &str) -> Result<(), NetError> {
        self.transition_mut(transition_id)?.set_formula(source);
        Ok(())
    }

    /// Adds one token to a colored place.
    pub fn add_token(&mut self, place_id: &str, token: Token) -> Result<(), NetError> {
        let place = self.place_mut(place_id)?;
        let bag = place
            .tokens
            .as_mut()
            .ok_or_else(|| ColorError::NotColored {
                place: place.id.clone(),
            })?;
        bag.add(token)?;
        self.after_token_change(place_id);
        Ok(())
    }

    /// Removes every copy of `token` from a colored place; returns how many.
    pub fn remove_token(&mut self, place_id: &str, token: &Token) -> Result<usize, NetError> {
        let place = self.place_mut(place_id)?;
        let bag = place
            .tokens
            .as_mut()
            .ok_or_else(|| ColorError::NotColored {
                place: place.id.clone(),
            })?;
        let removed = bag.remove_matching(token);
        self.after_token_change(place_id);
        Ok(removed)
    }

    pub fn tokens(&self, place_id: &str) -> Option<&TokenBag> {
        self.place(place_id)?.tokens.as_ref()
    }

    pub(crate) fn after_token_change(&mut self, place_id: &str) {
        let Some(index) = self.place_index(place_id) else {
            return;
        };
        let place = &mut self.places[index];
        place.sync_marking_with_tokens();
        let (id, count) = (place.id.clone(), place.token_count());
        self.matrices.invalidate(Dirty::CURRENT_MARKING);
        self.emit_with(|| NetEvent::TokensChanged { place: id, count });
    }

    // ---------------------------------------------------------------------
    // Parameters
    // ---------------------------------------------------------------------

    /// Value of the parameter called `name` whose kind matches `kind`.
    fn parameter_value(&self, name: &str, kind: &ParameterValue) -> Option<ParameterValue> {
        self.parameters
            .iter()
            .find(|p| p.name == name && p.value.same_kind(kind))
            .map(|p| p.value)
    }

    /// `UnknownParameter`, or `ParameterKindMismatch` if only the other kind
    /// carries this name.
    fn missing_parameter(&self, name: &str) -> NetError {
        if self.parameters.iter().any(|p| p.name == name) {
            NetError::ParameterKindMismatch(name.to_owned())
        } else {
            NetError::UnknownParameter(name.to_owned())
        }
    }

    fn parameter_name_taken(&self, name: &str, kind: &ParameterValue) -> bool {
        self.parameters
            .iter()
            .any(|p| p.name == name && p.value.same_kind(kind))
    }

    pub fn exists_marking_parameter(&self, name: &str) -> bool {
        self.parameter_name_taken(name, &ParameterValue::Marking(0))
    }

    pub fn exists_rate_parameter(&self, name: &str) -> bool {
        self.parameter_name_taken(name, &ParameterValue::Rate(0.0))
    }

    /// Renames the marking parameter `old` and every place bound to it.
    pub fn rename_marking_parameter(&mut self, old: &str, new: &str) -> Result<(), NetError> {
        self.rename_parameter(old, new, ParameterValue::Marking(0))
    }

    /// Renames the rate parameter `old` and every transition bound to it.
    pub fn rename_rate_parameter(&mut self, old: &str, new: &str) -> Result<(), NetError> {
        self.rename_parameter(old, new, ParameterValue::Rate(0.0))
    }

    fn rename_parameter(
        &mut self,
        old: &str,
        new: &str,
        kind: ParameterValue,
    ) -> Result<(), NetError> {
        let index = self
            .parameters
            .iter()
            .position(|p| p.name == old && p.value.same_kind(&kind))
            .ok_or_else(|| self.missing_parameter(old))?;
        if old != new && self.parameter_name_taken(new, &kind) {
            return Err(NetError::ParameterNameTaken(new.to_owned()));
        }
        self.parameters[index].name = new.to_owned();
        match kind {
            ParameterValue::Marking(_) => {
                for place in self.places.iter_mut() {
                    if place.marking_parameter.as_deref() == Some(old) {
                        place.marking_parameter = Some(new.to_owned());
                    }
                }
            }
            ParameterValue::Rate(_) => {
                for transition in self.transitions.iter_mut() {
                    if transition.rate_parameter.as_deref() == Some(old) {
                        transition.rate_parameter = Some(new.to_owned());
                    }
                }
            }
        }
        let name = new.to_owned();
        self.emit_with(|| NetEvent::ParameterChanged { name });
        Ok(())
    }

    /// Stores a new value and pushes it into every bound place or transition.
    pub fn set_parameter_value(
        &mut self,
        name: &str,
        value: ParameterValue,
    ) -> Result<(), NetError> {
        let index = self
            .parameters
            .iter()
            .position(|p| p.name == name && p.value.same_kind(&value))
            .ok_or_else(|| self.missing_parameter(name))?;
        self.parameters[index].value = value;
        let owned = name.to_owned();
        self.emit_with(|| NetEvent::ParameterChanged { name: owned });
        self.apply_parameter(name, value);
        Ok(())
    }

    pub fn bind_marking_parameter(&mut self, place_id: &str, name: &str) -> Result<(), NetError> {
        let value = self
            .parameter_value(name, &ParameterValue::Marking(0))
            .ok_or_else(|| self.missing_parameter(name))?;
        self.place_mut(place_id)?.marking_parameter = Some(name.to_owned());
        self.apply_parameter(name, value);
        Ok(())
    }

    pub fn bind_rate_parameter(
        &mut self,
        transition_id: &str,
        name: &str,
    ) -> Result<(), NetError> {
        let value = self
            .parameter_value(name, &ParameterValue::Rate(0.0))
            .ok_or_else(|| self.missing_parameter(name))?;
        self.transition_mut(transition_id)?.rate_parameter = Some(name.to_owned());
        self.apply_parameter(name, value);
        Ok(())
    }

    fn apply_parameter(&mut self, name: &str, value: ParameterValue) {
        match value {
            ParameterValue::Marking(marking) => {
                let mut changed = Vec::new();
                for place in self.places.iter_mut() {
                    if place.marking_parameter.as_deref() == Some(name) {
                        place.initial_marking = marking;
                        place.current_marking = marking;
                        changed.push(place.id.clone());
                    }
                }
                self.matrices.invalidate(Dirty::MARKINGS);
                for place in changed {
                    self.emit_with(|| NetEvent::MarkingChanged { place, marking });
                }
            }
            ParameterValue::Rate(rate) => {
                for transition in self.transitions.iter_mut() {
                    if transition.rate_parameter.as_deref() == Some(name) {
                        transition.rate = rate;
                    }
                }
            }
        }
    }

    fn unbind_parameter(&mut self, parameter: &Parameter) {
        let name = parameter.name.as_str();
        match parameter.value {
            ParameterValue::Marking(_) => {
                for place in self.places.iter_mut() {
                    if place.marking_parameter.as_deref() == Some(name) {
                        place.marking_parameter = None;
                    }
                }
            }
            ParameterValue::Rate(_) => {
                for transition in self.transitions.iter_mut() {
                    if transition.rate_parameter.as_deref() == Some(name) {
                        transition.rate_parameter = None;
                    }
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Enabling
    // ---------------------------------------------------------------------

    /// Enabled flags under `marking`; with `backwards` the roles of the
    /// forward and backward matrices are swapped.
    fn evaluate_enabled(&mut self, marking: &[Tokens], backwards: bool) -> IndexVec<TransitionId, bool> {
        self.refresh();
        let capacities = self.capacities();
        let priorities = self.priorities();
        let timed = self.timed_flags();
        let (backward, forward) = if backwards {
            (self.matrices.forward(), self.matrices.backward())
        } else {
            (self.matrices.backward(), self.matrices.forward())
        };
        enabling::enabled(
            marking,
            &EnablingRules {
                backward,
                forward,
                inhibition: self.matrices.inhibition(),
                capacities: &capacities,
                priorities: &priorities,
                timed: &timed,
            },
        )
    }

    /// Enabled flags of every transition under `marking`, which holds one
    /// entry per place in place order. Panics on any other length.
    pub fn enabled_under(&mut self, marking: &[Tokens]) -> IndexVec<TransitionId, bool> {
        self.evaluate_enabled(marking, false)
    }

    /// Enabled flags under the current marking.
    pub fn enabled_transitions(&mut self) -> IndexVec<TransitionId, bool> {
        let marking = self.current_marking();
        self.evaluate_enabled(marking.as_slice(), false)
    }

    /// Stores every transition's enabled flag, emitting an event for each
    /// flag that changed.
    pub fn set_enabled_transitions(&mut self) {
        let flags = self.enabled_transitions();
        self.store_enabled(flags);
    }

    /// Like [`Net::set_enabled_transitions`] for stepping backwards.
    pub fn set_enabled_transitions_backwards(&mut self) {
        let marking = self.current_marking();
        let flags = self.evaluate_enabled(marking.as_slice(), true);
        self.store_enabled(flags);
    }

    /// Clears every stored enabled flag.
    pub fn reset_enabled(&mut self) {
        let flags = IndexVec::from_elem(false, self.transitions.len());
        self.store_enabled(flags);
    }

    fn store_enabled(&mut self, flags: IndexVec<TransitionId, bool>) {
        let mut changed = Vec::new();
        for (transition, enabled) in self.transitions.iter_mut().zip(flags.iter()) {
            if transition.enabled != *enabled {
                transition.enabled = *enabled;
                changed.push((transition.id.clone(), *enabled));
            }
        }
        for (transition, enabled) in changed {
            self.emit_with(|| NetEvent::EnabledChanged {
                transition,
                enabled,
            });
        }
    }

    pub fn transition_enabled_structurally(
        &mut self,
        marking: &[Tokens],
        transition: TransitionId,
    ) -> bool {
        self.refresh();
        enabling::structurally_enabled(marking, self.matrices.backward(), transition)
    }

    /// At least one timed and no immediate transition is structurally
    /// enabled. `marking` needs one entry per place, as for
    /// [`Net::enabled_under`].
    pub fn is_tangible_state(&mut self, marking: &[Tokens]) -> bool {
        self.refresh();
        let backward = self.matrices.backward();
        let mut timed_enabled = false;
        for (t, transition) in self.transitions.iter_enumerated() {
            if enabling::structurally_enabled(marking, backward, t) {
                if !transition.timed {
                    return false;
                }
                timed_enabled = true;
            }
        }
        timed_enabled
    }

    /// See [`enabling::enabling_degree`]; `marking` needs one entry per place.
    pub fn enabling_degree(&mut self, transition: TransitionId, marking: &[Tokens]) -> Option<Tokens> {
        self.refresh();
        enabling::enabling_degree(marking, self.matrices.backward(), transition)
    }

    // ---------------------------------------------------------------------
    // Firing
    // ---------------------------------------------------------------------

    fn check_transition(&self, transition: TransitionId) -> Result<(), NetError> {
        if transition.index() < self.transitions.len() {
            Ok(())
        } else {
            Err(NetError::UnknownTransition(transition))
        }
    }

    /// Fires `transition` if it is enabled under the current marking.
    /// Returns whether it fired.
    pub fn fire(&mut self, transition: TransitionId) -> Result<bool, NetError> {
        self.check_transition(transition)?;
        let enabled = self.enabled_transitions();
        if !enabled[transition] {
            log::debug!("{transition:?} not enabled, nothing fired");
            self.matrices.invalidate(Dirty::CURRENT_MARKING);
            return Ok(false);
        }
        self.apply_incidence(transition, 1);
        log::debug!("fired {}", self.transitions[transition].id);
        let id = self.transitions[transition].id.clone();
        self.emit_with(|| NetEvent::Fired {
            transition: id,
            direction: Direction::Forward,
        });
        Ok(true)
    }

    /// Undoes one firing of `transition` if it is enabled backwards, that is
    /// with its input and output arcs swapped. Returns whether it fired.
    pub fn fire_backward(&mut self, transition: TransitionId) -> Result<bool, NetError> {
        self.check_transition(transition)?;
        let marking = self.current_marking();
        if !self.evaluate_enabled(marking.as_slice(), true)[transition] {
            log::debug!("{transition:?} not enabled backwards, nothing fired");
            self.matrices.invalidate(Dirty::CURRENT_MARKING);
            return Ok(false);
        }
        self.apply_incidence(transition, -1);
        log::debug!("fired {} backwards", self.transitions[transition].id);
        let id = self.transitions[transition].id.clone();
        self.emit_with(|| NetEvent::Fired {
            transition: id,
            direction: Direction::Backward,
        });
        Ok(true)
    }

    fn apply_incidence(&mut self, transition: TransitionId, sign: Tokens) {
        self.refresh();
        let deltas: Vec<(PlaceId, Tokens)> = self
            .matrices
            .incidence()
            .column(transition)
            .filter(|(_, delta)| **delta != 0)
            .map(|(place, delta)| (place, sign * *delta))
            .collect();
        for (place, delta) in deltas {
            let place = &mut self.places[place];
            place.current_marking += delta;
            let (id, marking) = (place.id.clone(), place.current_marking);
            self.emit_with(|| NetEvent::MarkingChanged { place: id, marking });
        }
        self.matrices.invalidate(Dirty::CURRENT_MARKING);
    }

    /// Enabled transitions with their rates, rates validated.
    fn weighted_candidates(&mut self) -> Result<Vec<(TransitionId, f64)>, NetError> {
        let enabled = self.enabled_transitions();
        let candidates: Vec<(TransitionId, f64)> = enabled
            .iter_enumerated()
            .filter(|(_, on)| **on)
            .map(|(t, _)| (t, self.transitions[t].rate))
            .collect();
        if let Some((t, rate)) = invalid_rate(&candidates) {
            return Err(NetError::InvalidRate {
                transition: self.transitions[t].id.clone(),
                rate,
            });
        }
        Ok(candidates)
    }

    /// Chooses an enabled transition with probability proportional to its
    /// rate, using the net's shared generator. Does not fire it.
    pub fn pick_random_weighted(&mut self) -> Result<Option<TransitionId>, NetError> {
        let candidates = self.weighted_candidates()?;
        Ok(select_weighted(&candidates, &mut self.rng))
    }

    pub fn pick_random_weighted_with<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<Option<TransitionId>, NetError> {
        let candidates = self.weighted_candidates()?;
        Ok(select_weighted(&candidates, rng))
    }

    /// Picks a transition as [`Net::pick_random_weighted`] does and fires it.
    pub fn fire_random_weighted(&mut self) -> Result<Option<TransitionId>, NetError> {
        let Some(transition) = self.pick_random_weighted()? else {
            return Ok(None);
        };
        self.fire(transition)?;
        Ok(Some(transition))
    }

    pub fn fire_random_weighted_with<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<Option<TransitionId>, NetError> {
        let Some(transition) = self.pick_random_weighted_with(rng)? else {
            return Ok(None);
        };
        self.fire(transition)?;
        Ok(Some(transition))
    }

    // ---------------------------------------------------------------------
    // Saved markings and colored undo
    // ---------------------------------------------------------------------

    /// Saves the current marking into the single snapshot slot.
    pub fn store_state(&mut self) {
        self.stored_state = Some(self.current_marking().into_inner());
    }

    /// Restores the marking saved by [`Net::store_state`]; false when nothing
    /// was stored.
    pub fn restore_state(&mut self) -> bool {
        let Some(saved) = self.stored_state.clone() else {
            return false;
        };
        self.overwrite_marking(&saved);
        true
    }

    /// Sets every current marking back to its initial value.
    pub fn restore_initial_marking(&mut self) {
        let initial = self.initial_marking().into_inner();
        self.overwrite_marking(&initial);
    }

    fn overwrite_marking(&mut self, marking: &[Tokens]) {
        let mut changed = Vec::new();
        for (place, &value) in self.places.iter_mut().zip(marking) {
            if place.current_marking != value {
                place.current_marking = value;
                changed.push((place.id.clone(), value));
            }
        }
        self.matrices.invalidate(Dirty::CURRENT_MARKING);
        for (place, marking) in changed {
            self.emit_with(|| NetEvent::MarkingChanged { place, marking });
        }
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    /// Most recent colored-firing snapshot, removed from the stack.
    pub fn pop_undo(&mut self) -> Option<UndoEntry> {
        self.undo.pop()
    }

    /// Writes snapshot places back verbatim; returns how many were found.
    pub fn restore_snapshot(&mut self, entry: &[PlaceSnapshot]) -> usize {
        let mut restored = 0;
        for snapshot in entry {
            let Some(index) = self.place_index(&snapshot.place_id) else {
                log::warn!("undo snapshot for missing place {}", snapshot.place_id);
                continue;
            };
            self.places[index] = snapshot.place.clone();
            restored += 1;
            self.after_token_change(&snapshot.place_id);
        }
        restored
    }

    /// Pops the last colored firing and restores its places.
    pub fn undo_colored(&mut self) -> bool {
        match self.pop_undo() {
            Some(entry) => {
                self.restore_snapshot(&entry);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    /// p0 (2) --> t0 --> p1
    fn simple() -> Net {
        let mut net = Net::seeded(3);
        net.add_place(Place::new("p0").with_marking(2));
        net.add_place(Place::new("p1"));
        net.add_transition(Transition::new("t0"));
        net.add_arc(Arc::normal("P0", "T0", 1));
        net.add_arc(Arc::normal("T0", "P1", 1));
        net
    }

    #[test]
    fn generated_ids_skip_collisions() {
        let mut net = Net::seeded(0);
        let first = net.add_place(Place::new("a").with_id("P1"));
        let second = net.add_place(Place::new("b"));
        let third = net.add_place(Place::new("c"));
        assert_eq!((first.as_str(), second.as_str(), third.as_str()), ("P1", "P2", "P3"));

        let dup = net.add_place(Place::new("d").with_id("p2"));
        assert_eq!(dup, "P4");
        assert_eq!(net.add_arc(Arc::inhibitor("P1", "T9", 1)), "I0");
        assert_eq!(net.add_annotation(Annotation::new("note")), "N0");
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let net = simple();
        assert_eq!(net.place("p1").map(|p| p.name.as_str()), Some("p1"));
        assert_eq!(net.transition_by_name("T0").map(|t| t.id.as_str()), Some("T0"));
        assert!(matches!(net.object("a0"), Some(NetObject::NormalArc(_))));
        assert_eq!(net.objects_of_kind(ObjectKind::NormalArc).len(), 2);
    }

    #[test]
    fn arc_defaults() {
        let mut net = simple();
        let id = net.add_arc(Arc::normal("P0", "T0", 0));
        let arc = net.arc(&id).unwrap();
        assert_eq!(arc.weight, 1);
        assert_eq!(arc.variable.as_deref(), Some("p0"));
    }

    #[test]
    fn fire_and_fire_backward() {
        let mut net = simple();
        let t0 = TransitionId::new(0);
        assert_eq!(net.fire(t0), Ok(true));
        assert_eq!(net.current_marking().as_slice(), &[1, 1]);
        assert_eq!(net.fire_backward(t0), Ok(true));
        assert_eq!(net.current_marking().as_slice(), &[2, 0]);
        assert_eq!(net.fire(TransitionId::new(5)), Err(NetError::UnknownTransition(TransitionId::new(5))));
    }

    #[test]
    fn backward_fire_needs_tokens_in_the_output_place() {
        let mut net = simple();
        let t0 = TransitionId::new(0);
        assert_eq!(net.fire_backward(t0), Ok(false));
        assert_eq!(net.current_marking().as_slice(), &[2, 0]);
        net.set_capacity("P0", 2).unwrap();
        net.set_marking("P1", 1).unwrap();
        assert_eq!(net.fire_backward(t0), Ok(false));
        assert_eq!(net.current_marking().as_slice(), &[2, 1]);
    }

    #[test]
    fn disabled_fire_is_a_noop() {
        let mut net = simple();
        net.set_marking("P0", 0).unwrap();
        assert_eq!(net.fire(TransitionId::new(0)), Ok(false));
        assert_eq!(net.current_marking().as_slice(), &[0, 0]);
    }

    #[test]
    fn marking_changes_do_not_rebuild_topology() {
        let mut net = simple();
        net.current_marking();
        let before = net.matrices.rebuilds();
        net.fire(TransitionId::new(0)).unwrap();
        net.set_marking("P1", 4).unwrap();
        net.incidence_matrix();
        assert_eq!(net.matrices.rebuilds(), before);

        net.set_arc_weight("A0", 2).unwrap();
        assert_eq!(net.backward_matrix(), vec![vec![2], vec![0]]);
        assert_eq!(net.matrices.rebuilds(), before + 1);
    }

    #[test]
    fn removing_a_place_removes_its_arcs() {
        let (tx, rx) = mpsc::channel();
        let mut net = simple();
        net.subscribe(move |event: &NetEvent| {
            if let NetEvent::Removed(object) = event {
                let _ = tx.send(object.id().to_owned());
            }
        });
        assert!(matches!(net.remove_object("p0"), Some(NetObject::Place(_))));
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec!["A0", "P0"]);
        assert_eq!(net.arcs().len(), 1);
        assert_eq!(net.incidence_matrix(), vec![vec![1]]);
    }

    #[test]
    fn store_and_restore_state() {
        let mut net = simple();
        assert!(!net.restore_state());
        net.store_state();
        net.fire(TransitionId::new(0)).unwrap();
        net.fire(TransitionId::new(0)).unwrap();
        assert_eq!(net.current_marking().as_slice(), &[0, 2]);
        assert!(net.restore_state());
        assert_eq!(net.current_marking().as_slice(), &[2, 0]);
    }

    #[test]
    fn enabled_flags_emit_only_changes() {
        let (tx, rx) = mpsc::channel();
        let mut net = simple();
        net.subscribe(move |event: &NetEvent| {
            if let NetEvent::EnabledChanged { transition, enabled } = event {
                let _ = tx.send((transition.clone(), *enabled));
            }
        });
        net.set_enabled_transitions();
        net.set_enabled_transitions();
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![("T0".to_owned(), true)]);
        assert!(net.transitions()[0].enabled);

        net.set_enabled_transitions_backwards();
        assert!(!net.transitions()[0].enabled);
        net.reset_enabled();
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn invalid_rate_is_reported_even_on_fast_path() {
        let mut net = simple();
        net.set_rate("T0", 0.0).unwrap();
        assert!(matches!(
            net.fire_random_weighted(),
            Err(NetError::InvalidRate { .. })
        ));
    }

    #[test]
    fn parameters_propagate_and_unbind() {
        let mut net = simple();
        net.add_parameter(Parameter::marking("k", 5)).unwrap();
        net.add_parameter(Parameter::rate("k", 2.5)).unwrap();
        assert!(matches!(
            net.add_parameter(Parameter::marking("k", 1)),
            Err(NetError::ParameterNameTaken(_))
        ));

        net.bind_marking_parameter("P0", "k").unwrap();
        assert_eq!(net.current_marking().as_slice(), &[5, 0]);
        net.set_parameter_value("k", ParameterValue::Marking(7)).unwrap();
        assert_eq!(net.initial_marking().as_slice(), &[7, 0]);

        net.rename_marking_parameter("k", "cap").unwrap();
        assert_eq!(net.place("P0").unwrap().marking_parameter.as_deref(), Some("cap"));
        assert!(net.exists_marking_parameter("cap"));
        assert!(net.exists_rate_parameter("k"));

        let id = net.parameters()[0].id.clone();
        net.remove_object(&id);
        assert_eq!(net.place("P0").unwrap().marking_parameter, None);
        assert_eq!(net.place("P0").unwrap().initial_marking, 7);
    }

    #[test]
    fn same_named_parameters_of_each_kind_stay_apart() {
        let mut net = simple();
        net.add_parameter(Parameter::marking("k", 5)).unwrap();
        net.add_parameter(Parameter::rate("k", 2.5)).unwrap();
        net.bind_marking_parameter("P0", "k").unwrap();
        net.bind_rate_parameter("T0", "k").unwrap();
        assert_eq!(net.current_marking().as_slice(), &[5, 0]);
        assert_eq!(net.transition("T0").unwrap().rate, 2.5);

        net.set_parameter_value("k", ParameterValue::Rate(3.0)).unwrap();
        assert_eq!(net.transition("T0").unwrap().rate, 3.0);
        assert_eq!(net.current_marking().as_slice(), &[5, 0]);

        let mut late = Transition::new("late");
        late.rate_parameter = Some("k".into());
        let late = net.add_transition(late);
        let late = net.transition(&late).unwrap();
        assert_eq!(late.rate_parameter.as_deref(), Some("k"));
        assert_eq!(late.rate, 3.0);

        net.set_parameter_value("k", ParameterValue::Marking(9)).unwrap();
        assert_eq!(net.current_marking().as_slice(), &[9, 0]);
        assert!(net.transitions().iter().all(|t| t.rate == 3.0));

        net.rename_rate_parameter("k", "lambda").unwrap();
        assert_eq!(net.transition("T0").unwrap().rate_parameter.as_deref(), Some("lambda"));
        assert_eq!(net.place("P0").unwrap().marking_parameter.as_deref(), Some("k"));
        assert!(net.exists_marking_parameter("k"));
        assert!(!net.exists_rate_parameter("k"));
    }

    #[test]
    fn tangible_state_and_degree() {
        let mut net = simple();
        net.set_timed("T0", true).unwrap();
        assert!(net.is_tangible_state(&[2, 0]));
        assert!(!net.is_tangible_state(&[0, 0]));
        assert_eq!(net.enabling_degree(TransitionId::new(0), &[2, 0]), Some(2));
        assert!(net.has_timed_transitions());
        assert!(!net.has_immediate_transitions());
    }
}
