//! 守卫公式的递归下降语法分析.
//!
//! 优先级由低到高: `=>`(右结合) < `||` < `&&` < `!` < 比较与 `in`
//! < `+ -` < `* / %` < 一元负号 < 投影 `e[i]` < 基本表达式.
use crate::formula::FormulaError;
use crate::formula::ast::{BinaryOp, Builtin, Expr, ExprKind, Quantifier, UnaryOp};
use crate::formula::lexer::{Spanned, Tok, tokenize};

pub fn parse(source: &str) -> Result<Expr, FormulaError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(FormulaError::Syntax {
            position: 0,
            message: "empty formula".to_owned(),
        });
    }
    let mut parser = FormulaParser {
        tokens,
        cursor: 0,
        end: source.len(),
    };
    let expr = parser.implication()?;
    if let Some(extra) = parser.peek() {
        return Err(FormulaError::Syntax {
            position: extra.position,
            message: format!("unexpected {:?} after expression", extra.tok),
        });
    }
    Ok(expr)
}

struct FormulaParser {
    tokens: Vec<Spanned>,
    cursor: usize,
    /// Byte offset reported for errors at end of input.
    end: usize,
}

impl FormulaParser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.cursor)
    }

    fn next(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Tok) -> Option<usize> {
        match self.peek() {
            Some(spanned) if &spanned.tok == expected => {
                let position = spanned.position;
                self.cursor += 1;
                Some(position)
            }
            _ => None,
        }
    }

    fn expect(&mut self, expected: Tok, what: &str) -> Result<usize, FormulaError> {
        self.eat(&expected).ok_or_else(|| self.error(format!("expected {what}")))
    }

    fn error(&self, message: String) -> FormulaError {
        let position = self.peek().map_or(self.end, |spanned| spanned.position);
        FormulaError::Syntax { position, message }
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, position: usize) -> Expr {
        Expr::new(ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), position)
    }

    fn implication(&mut self) -> Result<Expr, FormulaError> {
        let lhs = self.disjunction()?;
        if let Some(position) = self.eat(&Tok::Implies) {
            let rhs = self.implication()?;
            return Ok(Self::binary(BinaryOp::Implies, lhs, rhs, position));
        }
        Ok(lhs)
    }

    fn disjunction(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.conjunction()?;
        while let Some(position) = self.eat(&Tok::Or) {
            let rhs = self.conjunction()?;
            lhs = Self::binary(BinaryOp::Or, lhs, rhs, position);
        }
        Ok(lhs)
    }

    fn conjunction(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.negation()?;
        while let Some(position) = self.eat(&Tok::And) {
            let rhs = self.negation()?;
            lhs = Self::binary(BinaryOp::And, lhs, rhs, position);
        }
        Ok(lhs)
    }

    fn negation(&mut self) -> Result<Expr, FormulaError> {
        if let Some(position) = self.eat(&Tok::Not) {
            let operand = self.negation()?;
            return Ok(Expr::new(
                ExprKind::Unary(UnaryOp::Not, Box::new(operand)),
                position,
            ));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, FormulaError> {
        let lhs = self.additive()?;
        let op = match self.peek().map(|spanned| &spanned.tok) {
            Some(Tok::Eq) => BinaryOp::Eq,
            Some(Tok::NotEq) => BinaryOp::Ne,
            Some(Tok::Lt) => BinaryOp::Lt,
            Some(Tok::Le) => BinaryOp::Le,
            Some(Tok::Gt) => BinaryOp::Gt,
            Some(Tok::Ge) => BinaryOp::Ge,
            Some(Tok::In) => BinaryOp::In,
            _ => return Ok(lhs),
        };
        let position = self.next().map_or(self.end, |spanned| spanned.position);
        let rhs = self.additive()?;
        Ok(Self::binary(op, lhs, rhs, position))
    }

    fn additive(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek().map(|spanned| &spanned.tok) {
                Some(Tok::Plus) => BinaryOp::Add,
                Some(Tok::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            let position = self.next().map_or(self.end, |spanned| spanned.position);
            let rhs = self.term()?;
            lhs = Self::binary(op, lhs, rhs, position);
        }
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().map(|spanned| &spanned.tok) {
                Some(Tok::Star) => BinaryOp::Mul,
                Some(Tok::Slash) => BinaryOp::Div,
                Some(Tok::Percent) => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            let position = self.next().map_or(self.end, |spanned| spanned.position);
            let rhs = self.unary()?;
            lhs = Self::binary(op, lhs, rhs, position);
        }
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if let Some(position) = self.eat(&Tok::Minus) {
            let operand = self.unary()?;
            return Ok(Expr::new(
                ExprKind::Unary(UnaryOp::Neg, Box::new(operand)),
                position,
            ));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, FormulaError> {
        let mut expr = self.primary()?;
        while let Some(position) = self.eat(&Tok::LBracket) {
            let index = match self.peek() {
                Some(Spanned {
                    tok: Tok::Int(index),
                    position,
                }) => {
                    let (index, position) = (*index, *position);
                    self.cursor += 1;
                    usize::try_from(index).map_err(|_| FormulaError::Syntax {
                        position,
                        message: "projection index out of range".to_owned(),
                    })?
                }
                _ => return Err(self.error("expected integer projection index".to_owned())),
            };
            self.expect(Tok::RBracket, "`]`")?;
            expr = Expr::new(ExprKind::Index(Box::new(expr), index), position);
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        let Some(Spanned { tok, position }) = self.next() else {
            return Err(self.error("unexpected end of formula".to_owned()));
        };
        let kind = match tok {
            Tok::Int(v) => ExprKind::Int(v),
            Tok::Str(s) => ExprKind::Str(s),
            Tok::True => ExprKind::Bool(true),
            Tok::False => ExprKind::Bool(false),
            Tok::Ident(name) => {
                if self.eat(&Tok::LParen).is_some() {
                    return self.call(name, position);
                }
                ExprKind::Var(name)
            }
            Tok::LParen => return self.parenthesized(position),
            Tok::Forall => return self.quantified(Quantifier::Forall, position),
            Tok::Exists => return self.quantified(Quantifier::Exists, position),
            other => {
                return Err(FormulaError::Syntax {
                    position,
                    message: format!("unexpected {other:?}"),
                });
            }
        };
        Ok(Expr::new(kind, position))
    }

    /// `(e)` groups, `(e1, e2, ...)` builds a tuple.
    fn parenthesized(&mut self, position: usize) -> Result<Expr, FormulaError> {
        let first = self.implication()?;
        if self.eat(&Tok::RParen).is_some() {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Tok::Comma).is_some() {
            items.push(self.implication()?);
        }
        self.expect(Tok::RParen, "`)` or `,`")?;
        Ok(Expr::new(ExprKind::Tuple(items), position))
    }

    fn call(&mut self, name: String, position: usize) -> Result<Expr, FormulaError> {
        let builtin = Builtin::from_name(&name).ok_or_else(|| FormulaError::Syntax {
            position,
            message: format!("unknown function `{name}`"),
        })?;
        let mut args = Vec::new();
        if self.eat(&Tok::RParen).is_none() {
            loop {
                args.push(self.implication()?);
                if self.eat(&Tok::Comma).is_none() {
                    break;
                }
            }
            self.expect(Tok::RParen, "`)`")?;
        }
        if args.len() != builtin.arity() {
            return Err(FormulaError::Syntax {
                position,
                message: format!(
                    "`{name}` takes {} argument(s), got {}",
                    builtin.arity(),
                    args.len()
                ),
            });
        }
        Ok(Expr::new(ExprKind::Call(builtin, args), position))
    }

    fn quantified(&mut self, quantifier: Quantifier, position: usize) -> Result<Expr, FormulaError> {
        let variable = match self.peek() {
            Some(Spanned {
                tok: Tok::Ident(name),
                ..
            }) => name.clone(),
            _ => return Err(self.error("expected quantifier variable".to_owned())),
        };
        self.cursor += 1;
        self.expect(Tok::In, "`in`")?;
        let domain = self.additive()?;
        self.expect(Tok::Colon, "`:`")?;
        let body = self.implication()?;
        Ok(Expr::new(
            ExprKind::Quantified {
                quantifier,
                variable,
                domain: Box::new(domain),
                body: Box::new(body),
            },
            position,
        ))
    }
}
