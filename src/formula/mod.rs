//! 迁移守卫/更新公式语言.
//!
//! 公式以纯文本附着在迁移上，第一次使用时解析为 AST 并缓存.
//!
//! ```text
//! formula  := implies
//! implies  := or ( "=>" implies )?
//! or       := and ( ("||" | "\/" | "or") and )*
//! and      := not ( ("&&" | "/\" | "and") not )*
//! not      := ("!" | "not") not | cmp
//! cmp      := add ( ("=" | "==" | "!=" | "<>" | "<" | "<=" | ">" | ">=" | "in") add )?
//! add      := mul ( ("+" | "-") mul )*
//! mul      := neg ( ("*" | "/" | "%") neg )*
//! neg      := "-" neg | postfix
//! postfix  := primary ( "[" INT "]" )*
//! primary  := INT | STRING | "true" | "false" | IDENT
//!           | ("card" | "abs" | "min" | "max") "(" args ")"
//!           | "(" formula ( "," formula )* ")"
//!           | ("forall" | "exists") IDENT "in" add ":" formula
//! ```
//!
//! Arc variables of input arcs are bound to the selected tokens. Variables of
//! output arcs that are not also inputs start unassigned: `y = e` assigns
//! them, and their final values become the produced tokens.
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod ast;
pub mod interp;
mod lexer;
mod parser;

pub use ast::{BinaryOp, Builtin, Expr, ExprKind, Quantifier, UnaryOp};
pub use interp::{EvalMode, SymbolTable, evaluate, evaluate_guard};
pub use parser::parse;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("syntax error at {position}: {message}")]
    Syntax { position: usize, message: String },
    #[error("unbound variable `{name}` at {position}")]
    UnboundVariable { name: String, position: usize },
    #[error("type mismatch at {position}: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
        position: usize,
    },
    #[error("division by zero at {position}")]
    DivisionByZero { position: usize },
    #[error("arithmetic overflow at {position}")]
    Overflow { position: usize },
    #[error("index {index} out of range for tuple of {len} at {position}")]
    IndexOutOfRange {
        index: usize,
        len: usize,
        position: usize,
    },
    #[error("guard evaluated to {found}, expected bool")]
    NotBoolean { found: &'static str },
}

impl FormulaError {
    pub fn is_syntax(&self) -> bool {
        matches!(self, FormulaError::Syntax { .. })
    }

    pub fn position(&self) -> Option<usize> {
        match self {
            FormulaError::Syntax { position, .. }
            | FormulaError::UnboundVariable { position, .. }
            | FormulaError::TypeMismatch { position, .. }
            | FormulaError::DivisionByZero { position }
            | FormulaError::Overflow { position }
            | FormulaError::IndexOutOfRange { position, .. } => Some(*position),
            FormulaError::NotBoolean { .. } => None,
        }
    }
}

/// Formula text plus its lazily parsed AST.
#[derive(Clone, Serialize, Deserialize)]
pub struct Formula {
    source: String,
    #[serde(skip)]
    parsed: OnceLock<Arc<Expr>>,
}

impl Formula {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            parsed: OnceLock::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parses on first use; later calls reuse the cached tree. A syntax
    /// error is not cached and is reported again on the next call.
    pub fn ast(&self) -> Result<&Expr, FormulaError> {
        self.cached().map(|expr| &**expr)
    }

    /// Shared handle to the cached tree, usable while the net is mutated.
    pub fn shared(&self) -> Result<Arc<Expr>, FormulaError> {
        self.cached().map(Arc::clone)
    }

    fn cached(&self) -> Result<&Arc<Expr>, FormulaError> {
        if let Some(expr) = self.parsed.get() {
            return Ok(expr);
        }
        let expr = Arc::new(parse(&self.source)?);
        Ok(self.parsed.get_or_init(|| expr))
    }
}

impl PartialEq for Formula {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Formula({:?})", self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ast_is_parsed_once() {
        let formula = Formula::new("x > 0");
        let first = formula.ast().unwrap() as *const Expr;
        let second = formula.ast().unwrap() as *const Expr;
        assert_eq!(first, second);
    }

    #[test]
    fn shared_handles_point_at_the_cached_tree() {
        let formula = Formula::new("forall v in x : v > 0");
        let first = formula.shared().unwrap();
        let second = formula.shared().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(std::ptr::eq(formula.ast().unwrap(), &*first));
        assert_eq!(Arc::strong_count(&first), 3);
    }

    #[test]
    fn syntax_error_is_inspectable() {
        let formula = Formula::new("x >");
        let err = formula.ast().unwrap_err();
        assert!(err.is_syntax());
        assert_eq!(err.position(), Some(3));
        assert_eq!(err.to_string(), "syntax error at 3: unexpected end of formula");
    }

    #[test]
    fn clones_compare_by_source() {
        let formula = Formula::new("y = x + 1");
        formula.ast().unwrap();
        assert_eq!(formula.clone(), Formula::new("y = x + 1"));
    }
}
