use serde::{Deserialize, Serialize};

use crate::color::value::Value;

/// Kind of one token component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    Int,
    Str,
    /// Nested sub-type, carried as a tuple value.
    Group(DataType),
}

impl ComponentKind {
    fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ComponentKind::Int, Value::Int(_)) => true,
            (ComponentKind::Str, Value::Str(_)) => true,
            (ComponentKind::Group(sub), Value::Tuple(items)) => sub.conforms(items),
            _ => false,
        }
    }
}

/// Declared shape of the tokens a colored place may hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataType {
    pub name: String,
    pub components: Vec<ComponentKind>,
    /// Powerset places are bound as a whole rather than token by token.
    pub powerset: bool,
}

impl DataType {
    pub fn new(name: impl Into<String>, components: Vec<ComponentKind>) -> Self {
        Self {
            name: name.into(),
            components,
            powerset: false,
        }
    }

    /// Single integer component.
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, vec![ComponentKind::Int])
    }

    /// Single string component.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, vec![ComponentKind::Str])
    }

    pub fn powerset(mut self) -> Self {
        self.powerset = true;
        self
    }

    /// Number of components of every token of this type.
    pub fn arity(&self) -> usize {
        self.components.len()
    }

    /// Arity and component kinds of `values` match this type.
    pub fn conforms(&self, values: &[Value]) -> bool {
        values.len() == self.components.len()
            && self
                .components
                .iter()
                .zip(values)
                .all(|(kind, value)| kind.accepts(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_group_conformity() {
        let point = DataType::new("point", vec![ComponentKind::Int, ComponentKind::Int]);
        let labelled = DataType::new(
            "labelled",
            vec![ComponentKind::Str, ComponentKind::Group(point)],
        );

        let good = vec![
            Value::from("a"),
            Value::Tuple(vec![Value::Int(1), Value::Int(2)]),
        ];
        let short_group = vec![Value::from("a"), Value::Tuple(vec![Value::Int(1)])];
        let swapped = vec![
            Value::Tuple(vec![Value::Int(1), Value::Int(2)]),
            Value::from("a"),
        ];

        assert!(labelled.conforms(&good));
        assert!(!labelled.conforms(&short_group));
        assert!(!labelled.conforms(&swapped));
        assert_eq!(labelled.arity(), 2);
    }
}
