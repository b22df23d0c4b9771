//! 网的静态结构元素：库所、迁移、弧、注释、参数与标识.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::color::{ColorError, DataType, Token, TokenBag};
use crate::formula::Formula;
use crate::net::ids::PlaceId;
use crate::net::index_vec::IndexVec;

/// Token count of an uncolored place; also used for arc weights.
pub type Tokens = i64;

/// Marking value meaning "unbounded / don't care". Never produced by normal
/// execution; only the structural enabling test honours it.
pub const UNBOUNDED: Tokens = -1;

pub const DEFAULT_PRIORITY: i32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: String,
    pub name: String,
    pub initial_marking: Tokens,
    pub current_marking: Tokens,
    /// 0 means unbounded.
    pub capacity: Tokens,
    /// Token multiset of a colored place.
    pub tokens: Option<TokenBag>,
    pub marking_parameter: Option<String>,
}

impl Place {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            initial_marking: 0,
            current_marking: 0,
            capacity: 0,
            tokens: None,
            marking_parameter: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets both the initial and the current marking.
    pub fn with_marking(mut self, marking: Tokens) -> Self {
        self.initial_marking = marking;
        self.current_marking = marking;
        self
    }

    pub fn with_capacity(mut self, capacity: Tokens) -> Self {
        self.capacity = capacity;
        self
    }

    /// Turns the place into a colored place holding `tokens` of `data_type`.
    pub fn with_tokens(
        mut self,
        data_type: DataType,
        tokens: Vec<Token>,
    ) -> Result<Self, ColorError> {
        let bag = TokenBag::from_tokens(data_type, tokens)?;
        let count = bag.len() as Tokens;
        self.tokens = Some(bag);
        self.initial_marking = count;
        self.current_marking = count;
        Ok(self)
    }

    pub fn is_colored(&self) -> bool {
        self.tokens.is_some()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.as_ref().map_or(0, TokenBag::len)
    }

    /// Keeps the integer marking in step with the colored multiset.
    pub(crate) fn sync_marking_with_tokens(&mut self) {
        if let Some(bag) = &self.tokens {
            self.current_marking = bag.len() as Tokens;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub id: String,
    pub name: String,
    /// Higher fires first among enabled immediate transitions.
    pub priority: i32,
    pub timed: bool,
    pub infinite_server: bool,
    /// Weight used by the random selector. Must be positive.
    pub rate: f64,
    pub rate_parameter: Option<String>,
    pub formula: Option<Formula>,
    #[serde(skip)]
    pub enabled: bool,
}

impl Transition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            priority: DEFAULT_PRIORITY,
            timed: false,
            infinite_server: false,
            rate: 1.0,
            rate_parameter: None,
            formula: None,
            enabled: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    pub fn timed(mut self) -> Self {
        self.timed = true;
        self
    }

    pub fn infinite_server(mut self) -> Self {
        self.infinite_server = true;
        self
    }

    pub fn with_formula(mut self, source: impl Into<String>) -> Self {
        self.set_formula(source);
        self
    }

    /// Replaces the guard/update formula; the cached parse is discarded.
    pub fn set_formula(&mut self, source: impl Into<String>) {
        self.formula = Some(Formula::new(source));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArcKind {
    Normal,
    Inhibitor,
}

/// A directed edge between a place and a transition, referencing both ends by
/// object id.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arc {
    pub id: String,
    pub source: String,
    pub target: String,
    pub weight: Tokens,
    pub kind: ArcKind,
    /// Guard variable bound to the tokens flowing along this arc.
    pub variable: Option<String>,
}

impl Arc {
    pub fn normal(source: impl Into<String>, target: impl Into<String>, weight: Tokens) -> Self {
        Self::with_kind(source, target, weight, ArcKind::Normal)
    }

    pub fn inhibitor(source: impl Into<String>, target: impl Into<String>, weight: Tokens) -> Self {
        Self::with_kind(source, target, weight, ArcKind::Inhibitor)
    }

    fn with_kind(
        source: impl Into<String>,
        target: impl Into<String>,
        weight: Tokens,
        kind: ArcKind,
    ) -> Self {
        Self {
            id: String::new(),
            source: source.into(),
            target: target.into(),
            weight,
            kind,
            variable: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_variable(mut self, variable: impl Into<String>) -> Self {
        self.variable = Some(variable.into());
        self
    }

    pub fn touches(&self, object_id: &str) -> bool {
        self.source.eq_ignore_ascii_case(object_id) || self.target.eq_ignore_ascii_case(object_id)
    }
}

impl fmt::Debug for Arc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arc")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("target", &self.target)
            .field("weight", &self.weight)
            .field("kind", &self.kind)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    pub text: String,
}

impl Annotation {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Marking(Tokens),
    Rate(f64),
}

impl ParameterValue {
    pub fn same_kind(&self, other: &ParameterValue) -> bool {
        matches!(
            (self, other),
            (ParameterValue::Marking(_), ParameterValue::Marking(_))
                | (ParameterValue::Rate(_), ParameterValue::Rate(_))
        )
    }
}

/// A named value that places (marking) or transitions (rate) can be bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: String,
    pub name: String,
    pub value: ParameterValue,
}

impl Parameter {
    pub fn marking(name: impl Into<String>, value: Tokens) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            value: ParameterValue::Marking(value),
        }
    }

    pub fn rate(name: impl Into<String>, value: f64) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            value: ParameterValue::Rate(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Place,
    Transition,
    NormalArc,
    InhibitorArc,
    Annotation,
    Parameter,
}

/// Every kind of object the net store can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NetObject {
    Place(Place),
    Transition(Transition),
    NormalArc(Arc),
    InhibitorArc(Arc),
    Annotation(Annotation),
    Parameter(Parameter),
}

impl NetObject {
    pub fn id(&self) -> &str {
        match self {
            NetObject::Place(place) => &place.id,
            NetObject::Transition(transition) => &transition.id,
            NetObject::NormalArc(arc) | NetObject::InhibitorArc(arc) => &arc.id,
            NetObject::Annotation(annotation) => &annotation.id,
            NetObject::Parameter(parameter) => &parameter.id,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            NetObject::Place(_) => ObjectKind::Place,
            NetObject::Transition(_) => ObjectKind::Transition,
            NetObject::NormalArc(_) => ObjectKind::NormalArc,
            NetObject::InhibitorArc(_) => ObjectKind::InhibitorArc,
            NetObject::Annotation(_) => ObjectKind::Annotation,
            NetObject::Parameter(_) => ObjectKind::Parameter,
        }
    }
}

impl From<Arc> for NetObject {
    fn from(arc: Arc) -> Self {
        match arc.kind {
            ArcKind::Normal => NetObject::NormalArc(arc),
            ArcKind::Inhibitor => NetObject::InhibitorArc(arc),
        }
    }
}

/// Per-place token counts, in place order.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Marking(pub Vec<Tokens>);

impl Marking {
    pub fn new(tokens: Vec<Tokens>) -> Self {
        Self(tokens)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tokens(&self, place: PlaceId) -> Tokens {
        self.0[place.0 as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlaceId, Tokens)> + '_ {
        self.0
            .iter()
            .enumerate()
            .map(|(idx, tokens)| (PlaceId::new(idx as u32), *tokens))
    }

    pub fn as_slice(&self) -> &[Tokens] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<Tokens> {
        self.0
    }
}

impl From<Vec<Tokens>> for Marking {
    fn from(value: Vec<Tokens>) -> Self {
        Self(value)
    }
}

impl From<IndexVec<PlaceId, Tokens>> for Marking {
    fn from(value: IndexVec<PlaceId, Tokens>) -> Self {
        Self(value.into_vec())
    }
}

impl fmt::Debug for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (place, tokens) in self.iter() {
            map.entry(&place, &tokens);
        }
        map.finish()
    }
}
