//! 守卫公式词法分析（基于 nom），每个记号携带其在源文本中的字节偏移.
use nom::IResult;
use nom::Parser;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while};
use nom::character::complete::{char, digit1, satisfy};
use nom::combinator::{map, map_res, recognize, value};
use nom::sequence::{delimited, pair};

use crate::formula::FormulaError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tok {
    Int(i64),
    Str(String),
    Ident(String),
    True,
    False,
    Forall,
    Exists,
    In,
    Not,
    And,
    Or,
    Implies,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    /// `=` or `==`; doubles as assignment to an output variable.
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub tok: Tok,
    pub position: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, FormulaError> {
    let mut tokens = Vec::new();
    let mut rest = source.trim_start();
    while !rest.is_empty() {
        let position = source.len() - rest.len();
        match alt((integer, string, word, operator, punctuation)).parse(rest) {
            Ok((remaining, tok)) => {
                tokens.push(Spanned { tok, position });
                rest = remaining.trim_start();
            }
            Err(_) => {
                return Err(FormulaError::Syntax {
                    position,
                    message: describe_unexpected(rest),
                });
            }
        }
    }
    Ok(tokens)
}

fn describe_unexpected(rest: &str) -> String {
    match rest.chars().next() {
        Some(c) if c.is_ascii_digit() => "integer literal out of range".to_owned(),
        Some('"') => "unterminated string literal".to_owned(),
        Some(c) => format!("unexpected character `{c}`"),
        None => "unexpected end of input".to_owned(),
    }
}

fn integer(input: &str) -> IResult<&str, Tok> {
    map_res(digit1, |digits: &str| digits.parse::<i64>().map(Tok::Int)).parse(input)
}

fn string(input: &str) -> IResult<&str, Tok> {
    map(
        delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
        |text: &str| Tok::Str(text.to_owned()),
    )
    .parse(input)
}

fn word(input: &str) -> IResult<&str, Tok> {
    map(
        recognize(pair(
            satisfy(|c: char| c.is_alphabetic() || c == '_'),
            take_while(|c: char| c.is_alphanumeric() || c == '_'),
        )),
        keyword,
    )
    .parse(input)
}

fn keyword(word: &str) -> Tok {
    match word {
        "true" => Tok::True,
        "false" => Tok::False,
        "forall" => Tok::Forall,
        "exists" => Tok::Exists,
        "in" => Tok::In,
        "not" => Tok::Not,
        "and" => Tok::And,
        "or" => Tok::Or,
        _ => Tok::Ident(word.to_owned()),
    }
}

// Longer spellings come first so that `<=` never lexes as `<` `=`.
fn operator(input: &str) -> IResult<&str, Tok> {
    alt((
        value(Tok::Implies, tag("=>")),
        value(Tok::Eq, tag("==")),
        value(Tok::NotEq, alt((tag("!="), tag("<>")))),
        value(Tok::Le, tag("<=")),
        value(Tok::Ge, tag(">=")),
        value(Tok::And, alt((tag("&&"), tag("/\\")))),
        value(Tok::Or, alt((tag("||"), tag("\\/")))),
        value(Tok::Eq, tag("=")),
        value(Tok::Lt, tag("<")),
        value(Tok::Gt, tag(">")),
        value(Tok::Not, tag("!")),
        value(Tok::Plus, tag("+")),
        value(Tok::Minus, tag("-")),
        value(Tok::Star, tag("*")),
        value(Tok::Slash, tag("/")),
        value(Tok::Percent, tag("%")),
    ))
    .parse(input)
}

fn punctuation(input: &str) -> IResult<&str, Tok> {
    alt((
        value(Tok::LParen, char('(')),
        value(Tok::RParen, char(')')),
        value(Tok::LBracket, char('[')),
        value(Tok::RBracket, char(']')),
        value(Tok::Comma, char(',')),
        value(Tok::Colon, char(':')),
    ))
    .parse(input)
}
