use std::fmt;

use serde::{Deserialize, Serialize};

use crate::color::ColorError;
use crate::color::data_type::DataType;
use crate::color::value::Value;

/// Fixed-length tuple of typed components.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token(pub Vec<Value>);

impl Token {
    pub fn new(components: Vec<Value>) -> Self {
        Self(components)
    }

    pub fn int(value: i64) -> Self {
        Self(vec![Value::Int(value)])
    }

    pub fn str(value: impl Into<String>) -> Self {
        Self(vec![Value::Str(value.into())])
    }

    pub fn components(&self) -> &[Value] {
        &self.0
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// The value a guard variable sees: single-component tokens are
    /// unwrapped, wider tokens become a tuple.
    pub fn to_value(&self) -> Value {
        match self.0.as_slice() {
            [single] => single.clone(),
            components => Value::Tuple(components.to_vec()),
        }
    }

    /// Inverse of [`Token::to_value`] for a value produced by an update,
    /// shaped for a data type with `arity` components.
    pub fn from_value(value: Value, arity: usize) -> Self {
        match value {
            Value::Tuple(components) if arity != 1 => Self(components),
            other => Self(vec![other]),
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

/// Token multiset of one colored place. Order is irrelevant for matching but
/// kept so that undo snapshots restore the place verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBag {
    data_type: DataType,
    tokens: Vec<Token>,
}

impl TokenBag {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            tokens: Vec::new(),
        }
    }

    pub fn from_tokens(data_type: DataType, tokens: Vec<Token>) -> Result<Self, ColorError> {
        let mut bag = Self::new(data_type);
        for token in tokens {
            bag.add(token)?;
        }
        Ok(bag)
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn is_powerset(&self) -> bool {
        self.data_type.powerset
    }

    pub fn check(&self, token: &Token) -> Result<(), ColorError> {
        if self.data_type.conforms(token.components()) {
            Ok(())
        } else {
            Err(ColorError::NonConforming {
                token: format!("{token:?}"),
                data_type: self.data_type.name.clone(),
            })
        }
    }

    pub fn add(&mut self, token: Token) -> Result<(), ColorError> {
        self.check(&token)?;
        self.tokens.push(token);
        Ok(())
    }

    /// Removes every token equal to `token`, returning how many went.
    pub fn remove_matching(&mut self, token: &Token) -> usize {
        let before = self.tokens.len();
        self.tokens.retain(|held| held != token);
        before - self.tokens.len()
    }

    pub(crate) fn remove_at(&mut self, index: usize) -> Token {
        self.tokens.remove(index)
    }

    pub(crate) fn take_all(&mut self) -> Vec<Token> {
        std::mem::take(&mut self.tokens)
    }

    pub fn get(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter()
    }

    /// All tokens as one set value, the binding of a powerset place.
    pub fn to_set_value(&self) -> Value {
        Value::Set(self.tokens.iter().map(Token::to_value).collect())
    }
}
