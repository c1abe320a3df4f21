//! Value types usable in node signatures, and the grammar that parses their
//! textual representation.
//!
//! The type-expression grammar is small and fixed, so it's parsed with a
//! hand-written scanner and recursive-descent parser below rather than
//! pulling in a regex or parser-combinator dependency.

use std::fmt;

use crate::data::Value;

/// A value type describing the shape of a node input or output.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum Type {
    Int,
    Float,
    #[cfg_attr(test, proptest(rename = "Str"))]
    String,
    Bool,
    List(#[cfg_attr(test, proptest(strategy = "list_item_strategy()"))] Option<Box<Type>>),
    #[cfg_attr(test, proptest(strategy = "tuple_items_strategy()"))]
    Tuple(Vec<Type>),
    #[cfg_attr(test, proptest(strategy = "union_items_strategy()"))]
    Union(Vec<Type>),
    Any,
}

#[cfg(test)]
fn leaf_strategy() -> impl proptest::strategy::Strategy<Value = Type> {
    use proptest::prelude::*;
    prop_oneof![
        Just(Type::Int),
        Just(Type::Float),
        Just(Type::String),
        Just(Type::Bool),
        Just(Type::Any),
    ]
}

#[cfg(test)]
fn list_item_strategy() -> impl proptest::strategy::Strategy<Value = Option<Box<Type>>> {
    use proptest::prelude::*;
    proptest::option::of(leaf_strategy().prop_map(Box::new))
}

#[cfg(test)]
fn tuple_items_strategy() -> impl proptest::strategy::Strategy<Value = Vec<Type>> {
    proptest::collection::vec(leaf_strategy(), 1..4)
}

#[cfg(test)]
fn union_items_strategy() -> impl proptest::strategy::Strategy<Value = Vec<Type>> {
    proptest::collection::vec(leaf_strategy(), 2..4)
}

impl Type {
    /// Structural runtime check: does `value` belong to this type?
    ///
    /// - Lists match when empty or the item type matches the head (spec §3).
    /// - Tuples match only when length and per-element types all agree.
    /// - Unions match when any alternative matches.
    /// - `Any` matches everything.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Type::Int => matches!(value, Value::Int(_)),
            Type::Float => matches!(value, Value::Float(_)),
            Type::String => matches!(value, Value::String(_)),
            Type::Bool => matches!(value, Value::Bool(_)),
            Type::Any => true,
            Type::List(item_type) => match value {
                Value::List(items) => match (item_type, items.first()) {
                    (_, None) => true,
                    (None, Some(_)) => true,
                    (Some(item_type), Some(head)) => item_type.matches(head),
                },
                _ => false,
            },
            Type::Tuple(item_types) => match value {
                Value::Tuple(items) => {
                    item_types.len() == items.len()
                        && item_types
                            .iter()
                            .zip(items)
                            .all(|(t, v)| t.matches(v))
                },
                _ => false,
            },
            Type::Union(alternatives) => alternatives.iter().any(|t| t.matches(value)),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::String => write!(f, "str"),
            Type::Bool => write!(f, "bool"),
            Type::Any => write!(f, "any"),
            Type::List(None) => write!(f, "[]"),
            Type::List(Some(item_type)) => write!(f, "[{item_type}]"),
            Type::Tuple(item_types) => {
                write!(f, "(")?;
                for (i, t) in item_types.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            },
            Type::Union(alternatives) => {
                for (i, t) in alternatives.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{t}")?;
                }
                Ok(())
            },
        }
    }
}

impl Default for Type {
    /// `Param.type` defaults to `Any` (spec §3).
    fn default() -> Self {
        Type::Any
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeParseError {
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
    #[error("unexpected end of input, expected {0}")]
    UnexpectedEof(&'static str),
    #[error("unexpected token '{found}' at position {pos}, expected {expected}")]
    UnexpectedToken {
        found: String,
        pos: usize,
        expected: &'static str,
    },
    #[error("trailing input after type expression: '{0}'")]
    TrailingInput(String),
}

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Pipe,
    Comma,
    LBracket,
    RBracket,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => s.clone(),
            Token::Pipe => "|".to_string(),
            Token::Comma => ",".to_string(),
            Token::LBracket => "[".to_string(),
            Token::RBracket => "]".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
        }
    }
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.char_indices().peekable(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<(Token, usize)>, TypeParseError> {
        let mut tokens = Vec::new();
        while let Some(&(pos, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
                continue;
            }
            match c {
                '|' => {
                    self.chars.next();
                    tokens.push((Token::Pipe, pos));
                },
                ',' => {
                    self.chars.next();
                    tokens.push((Token::Comma, pos));
                },
                '[' => {
                    self.chars.next();
                    tokens.push((Token::LBracket, pos));
                },
                ']' => {
                    self.chars.next();
                    tokens.push((Token::RBracket, pos));
                },
                '(' => {
                    self.chars.next();
                    tokens.push((Token::LParen, pos));
                },
                ')' => {
                    self.chars.next();
                    tokens.push((Token::RParen, pos));
                },
                c if c.is_alphabetic() || c == '_' => {
                    let mut ident = String::new();
                    while let Some(&(_, c)) = self.chars.peek() {
                        if c.is_alphanumeric() || c == '_' {
                            ident.push(c);
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    tokens.push((Token::Ident(ident), pos));
                },
                other => return Err(TypeParseError::UnexpectedChar(other, pos)),
            }
        }
        Ok(tokens)
    }
}

/// Recursive-descent parser for the type-expression grammar:
///
/// ```text
/// chunk   := union EOF
/// union   := type ('|' type)*
/// list    := type (',' type)*
/// type    := 'int' | 'float' | 'str' | 'bool'
///          | '[' union? ']'
///          | '(' list ')'
/// ```
struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_pos(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, p)| *p)
            .unwrap_or(usize::MAX)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: Token, what: &'static str) -> Result<(), TypeParseError> {
        match self.advance() {
            Some(ref tok) if *tok == expected => Ok(()),
            Some(tok) => Err(TypeParseError::UnexpectedToken {
                found: tok.describe(),
                pos: self.peek_pos(),
                expected: what,
            }),
            None => Err(TypeParseError::UnexpectedEof(what)),
        }
    }

    /// `union := type ('|' type)*`; a union of one alternative reduces to
    /// that alternative (spec §4.3 semantics).
    fn parse_union(&mut self) -> Result<Type, TypeParseError> {
        let mut alternatives = vec![self.parse_type()?];
        while matches!(self.peek(), Some(Token::Pipe)) {
            self.advance();
            alternatives.push(self.parse_type()?);
        }
        if alternatives.len() == 1 {
            Ok(alternatives.into_iter().next().unwrap())
        } else {
            Ok(Type::Union(alternatives))
        }
    }

    /// `list := type (',' type)*`, used inside tuple parens; always >=1 type.
    fn parse_list(&mut self) -> Result<Vec<Type>, TypeParseError> {
        let mut items = vec![self.parse_type()?];
        while matches!(self.peek(), Some(Token::Comma)) {
            self.advance();
            items.push(self.parse_type()?);
        }
        Ok(items)
    }

    fn parse_type(&mut self) -> Result<Type, TypeParseError> {
        match self.advance() {
            Some(Token::Ident(name)) => match name.as_str() {
                "int" => Ok(Type::Int),
                "float" => Ok(Type::Float),
                "str" => Ok(Type::String),
                "bool" => Ok(Type::Bool),
                other => Err(TypeParseError::UnexpectedToken {
                    found: other.to_string(),
                    pos: self.peek_pos(),
                    expected: "int, float, str, or bool",
                }),
            },
            Some(Token::LBracket) => {
                if matches!(self.peek(), Some(Token::RBracket)) {
                    self.advance();
                    return Ok(Type::List(None));
                }
                let item_type = self.parse_union()?;
                self.expect(Token::RBracket, "']'")?;
                Ok(Type::List(Some(Box::new(item_type))))
            },
            Some(Token::LParen) => {
                let items = self.parse_list()?;
                self.expect(Token::RParen, "')'")?;
                Ok(Type::Tuple(items))
            },
            Some(tok) => Err(TypeParseError::UnexpectedToken {
                found: tok.describe(),
                pos: self.peek_pos(),
                expected: "a type expression",
            }),
            None => Err(TypeParseError::UnexpectedEof("a type expression")),
        }
    }
}

/// Parse the textual representation of a type (spec §4.3).
///
/// ```
/// use gada::typing::{parse, Type};
///
/// assert_eq!(parse("int").unwrap(), Type::Int);
/// assert_eq!(parse("[int]").unwrap(), Type::List(Some(Box::new(Type::Int))));
/// assert_eq!(parse("(int, str)").unwrap(), Type::Tuple(vec![Type::Int, Type::String]));
/// ```
pub fn parse(s: &str) -> Result<Type, TypeParseError> {
    let tokens = Lexer::new(s).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let result = parser.parse_union()?;
    if parser.pos != parser.tokens.len() {
        let remaining: String = parser.tokens[parser.pos..]
            .iter()
            .map(|(t, _)| t.describe())
            .collect::<Vec<_>>()
            .join(" ");
        return Err(TypeParseError::TrailingInput(remaining));
    }
    Ok(result)
}


#[cfg(test)]
use proptest::prelude::any;
