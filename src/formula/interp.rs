//! 守卫公式解释器：在一次候选绑定的符号表上递归求值.
use indexmap::IndexMap;

use crate::color::Value;
use crate::formula::FormulaError;
use crate::formula::ast::{BinaryOp, Builtin, Expr, ExprKind, Quantifier, UnaryOp};

/// Check decides whether a binding satisfies the guard; Apply additionally
/// records the output assignments the formula makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    Check,
    Apply,
}

/// Variables visible to one evaluation: input bindings from the selected
/// tokens, and declared output variables which `y = e` may assign.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    inputs: IndexMap<String, Value>,
    outputs: IndexMap<String, Option<Value>>,
    /// Assignments made while checking; discarded with the table.
    tentative: IndexMap<String, Value>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.inputs.insert(name.into(), value);
    }

    pub fn declare_output(&mut self, name: impl Into<String>) {
        self.outputs.entry(name.into()).or_insert(None);
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.inputs
            .get(name)
            .or_else(|| self.outputs.get(name).and_then(Option::as_ref))
            .or_else(|| self.tentative.get(name))
    }

    /// A declared output that is neither an input nor assigned yet.
    pub fn is_pending_output(&self, name: &str) -> bool {
        !self.inputs.contains_key(name)
            && !self.tentative.contains_key(name)
            && matches!(self.outputs.get(name), Some(None))
    }

    /// Value an output variable ends up with: its assignment, otherwise the
    /// same-named input.
    pub fn output(&self, name: &str) -> Option<&Value> {
        match self.outputs.get(name) {
            Some(Some(value)) => Some(value),
            _ => self.inputs.get(name),
        }
    }

    pub fn clear(&mut self) {
        self.inputs.clear();
        self.outputs.clear();
        self.tentative.clear();
    }

    fn assign(&mut self, name: &str, value: Value, mode: EvalMode) {
        match mode {
            EvalMode::Apply => {
                self.outputs.insert(name.to_owned(), Some(value));
            }
            EvalMode::Check => {
                self.tentative.insert(name.to_owned(), value);
            }
        }
    }
}

/// Evaluates a guard, which must produce a boolean.
pub fn evaluate_guard(
    expr: &Expr,
    symbols: &mut SymbolTable,
    mode: EvalMode,
) -> Result<bool, FormulaError> {
    match evaluate(expr, symbols, mode)? {
        Value::Bool(holds) => Ok(holds),
        other => Err(FormulaError::NotBoolean {
            found: other.type_name(),
        }),
    }
}

pub fn evaluate(
    expr: &Expr,
    symbols: &mut SymbolTable,
    mode: EvalMode,
) -> Result<Value, FormulaError> {
    Interpreter {
        symbols,
        mode,
        locals: Vec::new(),
    }
    .eval(expr)
}

struct Interpreter<'a> {
    symbols: &'a mut SymbolTable,
    mode: EvalMode,
    /// Quantifier variables, innermost last.
    locals: Vec<(String, Value)>,
}

impl Interpreter<'_> {
    fn eval(&mut self, expr: &Expr) -> Result<Value, FormulaError> {
        let position = expr.position;
        match &expr.kind {
            ExprKind::Int(v) => Ok(Value::Int(*v)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Var(name) => self.variable(name, position),
            ExprKind::Tuple(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Tuple),
            ExprKind::Unary(op, operand) => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Neg => {
                        let v = int(&value, position)?;
                        v.checked_neg()
                            .map(Value::Int)
                            .ok_or(FormulaError::Overflow { position })
                    }
                    UnaryOp::Not => Ok(Value::Bool(!boolean(&value, position)?)),
                }
            }
            ExprKind::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs, position),
            ExprKind::Index(operand, index) => match self.eval(operand)? {
                Value::Tuple(items) => {
                    let len = items.len();
                    items
                        .into_iter()
                        .nth(*index)
                        .ok_or(FormulaError::IndexOutOfRange {
                            index: *index,
                            len,
                            position,
                        })
                }
                other => Err(mismatch("tuple", &other, position)),
            },
            ExprKind::Call(builtin, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                call(*builtin, &args, position)
            }
            ExprKind::Quantified {
                quantifier,
                variable,
                domain,
                body,
            } => {
                let elements = match self.eval(domain)? {
                    Value::Set(items) | Value::Tuple(items) => items,
                    other => return Err(mismatch("set", &other, domain.position)),
                };
                let want = matches!(quantifier, Quantifier::Exists);
                for element in elements {
                    self.locals.push((variable.clone(), element));
                    let holds = self.eval(body).and_then(|v| boolean(&v, body.position));
                    self.locals.pop();
                    if holds? == want {
                        return Ok(Value::Bool(want));
                    }
                }
                Ok(Value::Bool(!want))
            }
        }
    }

    fn variable(&self, name: &str, position: usize) -> Result<Value, FormulaError> {
        self.locals
            .iter()
            .rev()
            .find(|(local, _)| local == name)
            .map(|(_, value)| value)
            .or_else(|| self.symbols.lookup(name))
            .cloned()
            .ok_or_else(|| FormulaError::UnboundVariable {
                name: name.to_owned(),
                position,
            })
    }

    /// `y = e` where `y` is still-unassigned output variable.
    fn pending_output<'e>(&self, expr: &'e Expr) -> Option<&'e str> {
        match &expr.kind {
            ExprKind::Var(name)
                if self.symbols.is_pending_output(name)
                    && !self.locals.iter().any(|(local, _)| local == name) =>
            {
                Some(name)
            }
            _ => None,
        }
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        position: usize,
    ) -> Result<Value, FormulaError> {
        match op {
            BinaryOp::And => {
                if !boolean(&self.eval(lhs)?, lhs.position)? {
                    return Ok(Value::Bool(false));
                }
                return Ok(Value::Bool(boolean(&self.eval(rhs)?, rhs.position)?));
            }
            BinaryOp::Or => {
                if boolean(&self.eval(lhs)?, lhs.position)? {
                    return Ok(Value::Bool(true));
                }
                return Ok(Value::Bool(boolean(&self.eval(rhs)?, rhs.position)?));
            }
            BinaryOp::Implies => {
                if !boolean(&self.eval(lhs)?, lhs.position)? {
                    return Ok(Value::Bool(true));
                }
                return Ok(Value::Bool(boolean(&self.eval(rhs)?, rhs.position)?));
            }
            BinaryOp::Eq => {
                if let Some(name) = self.pending_output(lhs) {
                    let value = self.eval(rhs)?;
                    self.symbols.assign(name, value, self.mode);
                    return Ok(Value::Bool(true));
                }
                if let Some(name) = self.pending_output(rhs) {
                    let value = self.eval(lhs)?;
                    self.symbols.assign(name, value, self.mode);
                    return Ok(Value::Bool(true));
                }
            }
            _ => {}
        }

        let left = self.eval(lhs)?;
        let right = self.eval(rhs)?;
        match op {
            BinaryOp::Add => match (&left, &right) {
                (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
                _ => arithmetic(&left, &right, position, i64::checked_add),
            },
            BinaryOp::Sub => arithmetic(&left, &right, position, i64::checked_sub),
            BinaryOp::Mul => arithmetic(&left, &right, position, i64::checked_mul),
            BinaryOp::Div | BinaryOp::Rem => {
                let (a, b) = (int(&left, position)?, int(&right, position)?);
                if b == 0 {
                    return Err(FormulaError::DivisionByZero { position });
                }
                let result = if op == BinaryOp::Div {
                    a.checked_div(b)
                } else {
                    a.checked_rem(b)
                };
                result
                    .map(Value::Int)
                    .ok_or(FormulaError::Overflow { position })
            }
            BinaryOp::Eq => Ok(Value::Bool(left == right)),
            BinaryOp::Ne => Ok(Value::Bool(left != right)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = match (&left, &right) {
                    (Value::Int(a), Value::Int(b)) => a.cmp(b),
                    (Value::Str(a), Value::Str(b)) => a.cmp(b),
                    (Value::Int(_), other) => return Err(mismatch("int", other, rhs.position)),
                    (Value::Str(_), other) => {
                        return Err(mismatch("string", other, rhs.position));
                    }
                    (other, _) => return Err(mismatch("int", other, lhs.position)),
                };
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }))
            }
            BinaryOp::In => match right {
                Value::Set(items) | Value::Tuple(items) => Ok(Value::Bool(items.contains(&left))),
                other => Err(mismatch("set", &other, rhs.position)),
            },
            BinaryOp::And | BinaryOp::Or | BinaryOp::Implies => {
                unreachable!("connectives are evaluated lazily above")
            }
        }
    }
}

fn call(builtin: Builtin, args: &[Value], position: usize) -> Result<Value, FormulaError> {
    match (builtin, args) {
        (Builtin::Card, [value]) => {
            let len = match value {
                Value::Set(items) | Value::Tuple(items) => items.len(),
                Value::Str(s) => s.chars().count(),
                other => return Err(mismatch("set", other, position)),
            };
            i64::try_from(len)
                .map(Value::Int)
                .map_err(|_| FormulaError::Overflow { position })
        }
        (Builtin::Abs, [value]) => int(value, position)?
            .checked_abs()
            .map(Value::Int)
            .ok_or(FormulaError::Overflow { position }),
        (Builtin::Min, [a, b]) => Ok(Value::Int(int(a, position)?.min(int(b, position)?))),
        (Builtin::Max, [a, b]) => Ok(Value::Int(int(a, position)?.max(int(b, position)?))),
        // Arity is enforced by the parser.
        _ => Err(FormulaError::Syntax {
            position,
            message: format!("wrong number of arguments to `{}`", builtin.name()),
        }),
    }
}

fn arithmetic(
    left: &Value,
    right: &Value,
    position: usize,
    op: fn(i64, i64) -> Option<i64>,
) -> Result<Value, FormulaError> {
    let (a, b) = (int(left, position)?, int(right, position)?);
    op(a, b)
        .map(Value::Int)
        .ok_or(FormulaError::Overflow { position })
}

fn int(value: &Value, position: usize) -> Result<i64, FormulaError> {
    value
        .as_int()
        .ok_or_else(|| mismatch("int", value, position))
}

fn boolean(value: &Value, position: usize) -> Result<bool, FormulaError> {
    value
        .as_bool()
        .ok_or_else(|| mismatch("bool", value, position))
}

fn mismatch(expected: &'static str, found: &Value, position: usize) -> FormulaError {
    FormulaError::TypeMismatch {
        expected,
        found: found.type_name(),
        position,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parse;

    fn eval_with(source: &str, symbols: &mut SymbolTable, mode: EvalMode) -> Result<Value, FormulaError> {
        evaluate(&parse(source).unwrap(), symbols, mode)
    }

    fn eval(source: &str) -> Result<Value, FormulaError> {
        eval_with(source, &mut SymbolTable::new(), EvalMode::Check)
    }

    #[test]
    fn arithmetic_and_comparison() {
        assert_eq!(eval("1 + 2 * 3 - 4 / 2"), Ok(Value::Int(5)));
        assert_eq!(eval("-7 % 3"), Ok(Value::Int(-1)));
        assert_eq!(eval("\"ab\" + \"c\" = \"abc\""), Ok(Value::Bool(true)));
        assert_eq!(eval("\"a\" < \"b\" && 3 >= 3"), Ok(Value::Bool(true)));
        assert_eq!(eval("max(2, abs(-5)) != min(1, 9)"), Ok(Value::Bool(true)));
    }

    #[test]
    fn connectives_short_circuit() {
        // Right operands would fail if evaluated.
        assert_eq!(eval("false && missing > 0"), Ok(Value::Bool(false)));
        assert_eq!(eval("true || 1 / 0 = 0"), Ok(Value::Bool(true)));
        assert_eq!(eval("false => missing"), Ok(Value::Bool(true)));
    }

    #[test]
    fn evaluation_errors_report_positions() {
        assert_eq!(eval("1 / 0"), Err(FormulaError::DivisionByZero { position: 2 }));
        assert_eq!(
            eval("x + 1"),
            Err(FormulaError::UnboundVariable {
                name: "x".into(),
                position: 0
            })
        );
        assert!(matches!(
            eval("1 + true"),
            Err(FormulaError::TypeMismatch { expected: "int", found: "bool", .. })
        ));
        assert_eq!(
            eval("9223372036854775807 + 1"),
            Err(FormulaError::Overflow { position: 20 })
        );
        assert!(matches!(
            eval("(1, 2)[2]"),
            Err(FormulaError::IndexOutOfRange { index: 2, len: 2, .. })
        ));
    }

    #[test]
    fn tuples_sets_and_quantifiers() {
        let mut symbols = SymbolTable::new();
        symbols.bind("p", Value::Tuple(vec![Value::Int(4), Value::from("red")]));
        symbols.bind("s", Value::Set(vec![Value::Int(1), Value::Int(2), Value::Int(5)]));

        let check = |src: &str, symbols: &mut SymbolTable| {
            eval_with(src, symbols, EvalMode::Check).unwrap()
        };
        assert_eq!(check("p[0] + 1", &mut symbols), Value::Int(5));
        assert_eq!(check("p[1] = \"red\"", &mut symbols), Value::Bool(true));
        assert_eq!(check("card(s) = 3 && 2 in s", &mut symbols), Value::Bool(true));
        assert_eq!(check("forall v in s : v > 0", &mut symbols), Value::Bool(true));
        assert_eq!(check("exists v in s : v > 4", &mut symbols), Value::Bool(true));
        assert_eq!(check("exists v in s : v > 5", &mut symbols), Value::Bool(false));
    }

    #[test]
    fn output_assignment_depends_on_mode() {
        let mut symbols = SymbolTable::new();
        symbols.bind("x", Value::Int(3));
        symbols.declare_output("y");

        let formula = parse("x > 0 && y = x * 2 && y < 10").unwrap();
        assert_eq!(
            evaluate_guard(&formula, &mut symbols, EvalMode::Check),
            Ok(true)
        );
        assert_eq!(symbols.output("y"), None);

        let mut symbols = SymbolTable::new();
        symbols.bind("x", Value::Int(3));
        symbols.declare_output("y");
        assert_eq!(
            evaluate_guard(&formula, &mut symbols, EvalMode::Apply),
            Ok(true)
        );
        assert_eq!(symbols.output("y"), Some(&Value::Int(6)));
    }

    #[test]
    fn unassigned_output_falls_back_to_input() {
        let mut symbols = SymbolTable::new();
        symbols.bind("x", Value::Int(3));
        symbols.declare_output("x");
        symbols.declare_output("z");
        // `x` is bound, so this is a comparison rather than an assignment.
        let formula = parse("x = 4").unwrap();
        assert_eq!(
            evaluate_guard(&formula, &mut symbols, EvalMode::Apply),
            Ok(false)
        );
        assert_eq!(symbols.output("x"), Some(&Value::Int(3)));
        assert_eq!(symbols.output("z"), None);
    }

    #[test]
    fn guard_must_be_boolean() {
        let formula = parse("1 + 1").unwrap();
        assert_eq!(
            evaluate_guard(&formula, &mut SymbolTable::new(), EvalMode::Check),
            Err(FormulaError::NotBoolean { found: "int" })
        );
    }
}
