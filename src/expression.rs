//! Computed-key expressions.
//!
//! A template key written as `(expression)` is evaluated against the actual
//! value at the current position and the result is compared with the key's
//! expected value. Evaluation goes through the [`ExpressionEvaluator`] trait
//! so the matcher does not depend on one grammar; [`PathExpressions`] is the
//! bounded language used by default:
//!
//! - `@`, `field`, `field.nested[0]`, `@.items` walk the current actual value
//! - `$name`, `$name.field` read a binding
//! - `'text'`, `12`, `1.5`, `true`, `false`, `null` are literals
//! - `length(x)`, `keys(x)`, `values(x)`, `type(x)`, `to_string(x)`,
//!   `to_number(x)`, `contains(a, b)`, `starts_with(a, b)`, `ends_with(a, b)`,
//!   `not_null(a, ...)` are the available functions

use crate::binding::Bindings;
use crate::path::{render_accessors, walk, Accessor};
use crate::value::{Number, Value};
use thiserror::Error;

/// Strategy for evaluating computed-key expressions.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate `expression` against `actual`, the value at the current
    /// position of the compared tree.
    fn evaluate(
        &self,
        expression: &str,
        actual: &Value,
        bindings: &Bindings,
    ) -> Result<Value, ExpressionError>;

    /// Names of the bindings `expression` reads, so unbound names can be
    /// reported before anything is compared. The default reports none.
    fn bindings(&self, _expression: &str) -> Result<Vec<String>, ExpressionError> {
        Ok(Vec::new())
    }
}

/// Errors raised while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("function `{function}` expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: &'static str,
        found: usize,
    },

    #[error("undefined variable `{0}`")]
    UndefinedVariable(String),

    #[error("field `{path}` not found")]
    MissingField { path: String },

    #[error("{0}")]
    Type(String),
}

impl ExpressionError {
    /// Usage errors abort the whole check; the rest become field errors.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExpressionError::Syntax { .. }
                | ExpressionError::UnknownFunction(_)
                | ExpressionError::Arity { .. }
                | ExpressionError::UndefinedVariable(_)
        )
    }
}

/// Parsed expression tree of the default language.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A walk into the current actual value (`@` is an empty walk).
    Current(Vec<Accessor>),
    Binding {
        name: String,
        accessors: Vec<Accessor>,
    },
    Literal(Value),
    Call {
        function: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Every `$name` read by the expression, in order of appearance.
    pub fn bindings(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_bindings(&mut names);
        names
    }

    fn collect_bindings<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::Binding { name, .. } => names.push(name),
            Expr::Call { args, .. } => args.iter().for_each(|arg| arg.collect_bindings(names)),
            Expr::Current(_) | Expr::Literal(_) => {}
        }
    }
}

/// The default bounded expression language.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathExpressions;

impl PathExpressions {
    pub fn new() -> Self {
        Self
    }

    /// Parse without evaluating, e.g. to validate template syntax up front.
    pub fn parse(&self, expression: &str) -> Result<Expr, ExpressionError> {
        Parser::new(tokenize(expression)?).parse()
    }
}

impl ExpressionEvaluator for PathExpressions {
    fn evaluate(
        &self,
        expression: &str,
        actual: &Value,
        bindings: &Bindings,
    ) -> Result<Value, ExpressionError> {
        let expr = self.parse(expression)?;
        eval(&expr, actual, bindings)
    }

    fn bindings(&self, expression: &str) -> Result<Vec<String>, ExpressionError> {
        let expr = self.parse(expression)?;
        Ok(expr.bindings().into_iter().map(str::to_string).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Dollar,
    At,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '$' | '@' | '.' | ',' | '(' | ')' | '[' | ']' => {
                chars.next();
                let token = match ch {
                    '$' => Token::Dollar,
                    '@' => Token::At,
                    '.' => Token::Dot,
                    ',' => Token::Comma,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    _ => Token::RBracket,
                };
                tokens.push((pos, token));
            }
            '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, '\\')) => match chars.next() {
                            Some((_, escaped)) => text.push(escaped),
                            None => break,
                        },
                        Some((_, '\'')) => {
                            tokens.push((pos, Token::Str(text)));
                            break;
                        }
                        Some((_, c)) => text.push(c),
                        None => {
                            return Err(ExpressionError::Syntax {
                                offset: pos,
                                message: "unterminated string literal".to_string(),
                            })
                        }
                    }
                }
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut text = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() || c == '-' || c == '.' || c == 'e' || c == 'E' {
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let token = if let Ok(n) = text.parse::<i64>() {
                    Token::Int(n)
                } else if let Ok(n) = text.parse::<f64>() {
                    Token::Float(n)
                } else {
                    return Err(ExpressionError::Syntax {
                        offset: pos,
                        message: format!("invalid number literal '{}'", text),
                    });
                };
                tokens.push((pos, token));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut text = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((pos, Token::Ident(text)));
            }
            other => {
                return Err(ExpressionError::Syntax {
                    offset: pos,
                    message: format!("unexpected character '{}'", other),
                })
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    position: usize,
    end: usize,
}

impl Parser {
    fn new(tokens: Vec<(usize, Token)>) -> Self {
        let end = tokens.last().map_or(0, |(pos, _)| pos + 1);
        Self {
            tokens,
            position: 0,
            end,
        }
    }

    fn parse(mut self) -> Result<Expr, ExpressionError> {
        if self.tokens.is_empty() {
            return Err(self.error("empty expression"));
        }
        let expr = self.parse_expr()?;
        if self.peek().is_some() {
            return Err(self.error("unexpected trailing input"));
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).map(|(_, t)| t.clone());
        self.position += 1;
        token
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.position)
            .map_or(self.end, |(pos, _)| *pos)
    }

    fn error(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::Syntax {
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        if self.peek() == Some(&expected) {
            self.position += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}", expected)))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ExpressionError> {
        let offset = self.offset();
        match self.next() {
            Some(Token::At) => Ok(Expr::Current(self.parse_accessors()?)),
            Some(Token::Dollar) => match self.next() {
                Some(Token::Ident(name)) => Ok(Expr::Binding {
                    name,
                    accessors: self.parse_accessors()?,
                }),
                _ => Err(ExpressionError::Syntax {
                    offset,
                    message: "expected a binding name after '$'".to_string(),
                }),
            },
            Some(Token::Str(text)) => Ok(Expr::Literal(Value::String(text))),
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::Number(Number::Int(n)))),
            Some(Token::Float(n)) => Ok(Expr::Literal(Value::Number(Number::Float(n)))),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.position += 1;
                    let args = self.parse_args()?;
                    return Ok(Expr::Call {
                        function: name,
                        args,
                    });
                }
                match name.as_str() {
                    "true" => Ok(Expr::Literal(Value::Bool(true))),
                    "false" => Ok(Expr::Literal(Value::Bool(false))),
                    "null" => Ok(Expr::Literal(Value::Null)),
                    _ => {
                        let mut accessors = vec![Accessor::Field(name)];
                        accessors.extend(self.parse_accessors()?);
                        Ok(Expr::Current(accessors))
                    }
                }
            }
            _ => Err(ExpressionError::Syntax {
                offset,
                message: "expected a path, binding, literal or function call".to_string(),
            }),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ExpressionError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.position += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                _ => {
                    self.position = self.position.saturating_sub(1);
                    return Err(self.error("expected ',' or ')' in argument list"));
                }
            }
        }
    }

    fn parse_accessors(&mut self) -> Result<Vec<Accessor>, ExpressionError> {
        let mut accessors = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.position += 1;
                    match self.next() {
                        Some(Token::Ident(name)) => accessors.push(Accessor::Field(name)),
                        _ => {
                            self.position = self.position.saturating_sub(1);
                            return Err(self.error("expected a field name after '.'"));
                        }
                    }
                }
                Some(Token::LBracket) => {
                    self.position += 1;
                    match self.next() {
                        Some(Token::Int(n)) if n >= 0 => {
                            accessors.push(Accessor::Index(n as usize))
                        }
                        Some(Token::Str(key)) => accessors.push(Accessor::Field(key)),
                        _ => {
                            self.position = self.position.saturating_sub(1);
                            return Err(self.error("expected an index or quoted key inside '[]'"));
                        }
                    }
                    self.expect(Token::RBracket)?;
                }
                _ => return Ok(accessors),
            }
        }
    }
}

fn eval(expr: &Expr, actual: &Value, bindings: &Bindings) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Current(accessors) => walk(actual, accessors).cloned().map_err(|depth| {
            ExpressionError::MissingField {
                path: render_missing("@", accessors, depth),
            }
        }),
        Expr::Binding { name, accessors } => {
            let root = bindings
                .get(name)
                .ok_or_else(|| ExpressionError::UndefinedVariable(name.clone()))?;
            walk(root, accessors)
                .cloned()
                .map_err(|depth| ExpressionError::MissingField {
                    path: render_missing(&format!("${}", name), accessors, depth),
                })
        }
        Expr::Call { function, args } => call(function, args, actual, bindings),
    }
}

fn render_missing(head: &str, accessors: &[Accessor], depth: usize) -> String {
    let shown = &accessors[..=depth];
    if head == "@" {
        render_accessors("", shown)
    } else {
        render_accessors(head, shown)
    }
}

fn call(
    function: &str,
    args: &[Expr],
    actual: &Value,
    bindings: &Bindings,
) -> Result<Value, ExpressionError> {
    let arity = |expected: &'static str, ok: bool| -> Result<(), ExpressionError> {
        if ok {
            Ok(())
        } else {
            Err(ExpressionError::Arity {
                function: function.to_string(),
                expected,
                found: args.len(),
            })
        }
    };

    match function {
        "length" | "keys" | "values" | "type" | "to_string" | "to_number" => {
            arity("1", args.len() == 1)?;
            let value = eval(&args[0], actual, bindings)?;
            unary(function, value)
        }
        "contains" | "starts_with" | "ends_with" => {
            arity("2", args.len() == 2)?;
            let subject = eval(&args[0], actual, bindings)?;
            let search = eval(&args[1], actual, bindings)?;
            binary(function, subject, search)
        }
        "not_null" => {
            arity("at least 1", !args.is_empty())?;
            for arg in args {
                match eval(arg, actual, bindings) {
                    Ok(Value::Null) | Err(ExpressionError::MissingField { .. }) => continue,
                    Ok(value) => return Ok(value),
                    Err(other) => return Err(other),
                }
            }
            Ok(Value::Null)
        }
        other => Err(ExpressionError::UnknownFunction(other.to_string())),
    }
}

fn unary(function: &str, value: Value) -> Result<Value, ExpressionError> {
    match (function, value) {
        ("length", Value::String(s)) => Ok(Value::from(s.chars().count())),
        ("length", Value::Sequence(items)) => Ok(Value::from(items.len())),
        ("length", Value::Mapping(m)) => Ok(Value::from(m.len())),
        ("keys", Value::Mapping(m)) => Ok(Value::Sequence(m.keys().map(Value::from).collect())),
        ("values", Value::Mapping(m)) => Ok(Value::Sequence(m.values().cloned().collect())),
        ("type", value) => Ok(Value::from(value.kind())),
        ("to_string", Value::String(s)) => Ok(Value::String(s)),
        ("to_string", value) => Ok(Value::String(
            value.scalar_text().unwrap_or_else(|| value.to_string()),
        )),
        ("to_number", Value::Number(n)) => Ok(Value::Number(n)),
        ("to_number", Value::String(s)) => Ok(s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| s.trim().parse::<f64>().map(Value::from))
            .unwrap_or(Value::Null)),
        ("to_number", _) => Ok(Value::Null),
        (function, value) => Err(ExpressionError::Type(format!(
            "function `{}` cannot be applied to a {}",
            function,
            value.kind()
        ))),
    }
}

fn binary(function: &str, subject: Value, search: Value) -> Result<Value, ExpressionError> {
    match (function, &subject, &search) {
        ("contains", Value::String(s), Value::String(needle)) => {
            Ok(Value::Bool(s.contains(needle.as_str())))
        }
        ("contains", Value::Sequence(items), needle) => {
            Ok(Value::Bool(items.iter().any(|item| item.loose_eq(needle))))
        }
        ("starts_with", Value::String(s), Value::String(prefix)) => {
            Ok(Value::Bool(s.starts_with(prefix.as_str())))
        }
        ("ends_with", Value::String(s), Value::String(suffix)) => {
            Ok(Value::Bool(s.ends_with(suffix.as_str())))
        }
        _ => Err(ExpressionError::Type(format!(
            "function `{}` cannot be applied to a {} and a {}",
            function,
            subject.kind(),
            search.kind()
        ))),
    }
}
