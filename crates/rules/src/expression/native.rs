//! Built-in boolean expression language.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! or         := and (("||" | "or") and)*
//! and        := unary (("&&" | "and") unary)*
//! unary      := ("!" | "not") unary | comparison
//! comparison := primary (("==" | "!=" | "<" | "<=" | ">" | ">=") primary | "in" primary)?
//! primary    := literal | path | list | "(" or ")"
//! list       := "[" (or ("," or)*)? "]"
//! path       := ident ("." ident)*
//! ```
//!
//! Literals are `true`, `false`, `null`, numbers and single- or double-quoted
//! strings. Missing paths resolve to `null`.

use std::cmp::Ordering;

use serde_json::Value;

use super::{ExpressionError, ExpressionEvaluator};

/// Interpreter for the built-in expression language.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEvaluator;

impl NativeEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Parse and evaluate synchronously.
    pub fn evaluate_sync(
        &self,
        expression: &str,
        context: &Value,
    ) -> Result<bool, ExpressionError> {
        let ast = parse(expression)?;
        Ok(truthy(&eval(&ast, context)))
    }

    /// Parse only, reporting the first syntax error.
    pub fn check(&self, expression: &str) -> Result<(), ExpressionError> {
        parse(expression).map(|_| ())
    }
}

#[async_trait::async_trait]
impl ExpressionEvaluator for NativeEvaluator {
    async fn evaluate(&self, expression: &str, context: &Value) -> Result<bool, ExpressionError> {
        self.evaluate_sync(expression, context)
    }
}

// ── Lexer ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    In,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

fn parse_error(position: usize, message: impl Into<String>) -> ExpressionError {
    ExpressionError::Parse {
        position,
        message: message.into(),
    }
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ExpressionError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let (token, width) = match (c, next) {
            ('&', Some('&')) => (Token::And, 2),
            ('|', Some('|')) => (Token::Or, 2),
            ('=', Some('=')) => (Token::Eq, 2),
            ('!', Some('=')) => (Token::Ne, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('!', _) => (Token::Not, 1),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('.', _) => (Token::Dot, 1),
            (',', _) => (Token::Comma, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            ('"', _) | ('\'', _) => {
                let (s, consumed) = lex_string(&chars, i)?;
                tokens.push((pos, Token::Str(s)));
                i += consumed;
                continue;
            }
            (c, _)
                if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) =>
            {
                let (n, consumed) = lex_number(&chars, i)?;
                tokens.push((pos, Token::Num(n)));
                i += consumed;
                continue;
            }
            (c, _) if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].1.is_alphanumeric() || chars[i].1 == '_' || chars[i].1 == '$')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().map(|(_, c)| *c).collect();
                let token = match word.to_ascii_lowercase().as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" | "nil" => Token::Null,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    _ => Token::Ident(word),
                };
                tokens.push((pos, token));
                continue;
            }
            (c, _) => return Err(parse_error(pos, format!("unexpected character '{}'", c))),
        };

        tokens.push((pos, token));
        i += width;
    }

    Ok(tokens)
}

fn lex_string(chars: &[(usize, char)], start: usize) -> Result<(String, usize), ExpressionError> {
    let (pos, quote) = chars[start];
    let mut out = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i].1;
        if c == '\\' {
            let escaped = chars
                .get(i + 1)
                .ok_or_else(|| parse_error(chars[i].0, "dangling escape"))?
                .1;
            out.push(match escaped {
                'n' => '\n',
                't' => '\t',
                other => other,
            });
            i += 2;
            continue;
        }
        if c == quote {
            return Ok((out, i + 1 - start));
        }
        out.push(c);
        i += 1;
    }

    Err(parse_error(pos, "unterminated string"))
}

fn lex_number(chars: &[(usize, char)], start: usize) -> Result<(f64, usize), ExpressionError> {
    let mut i = start;
    if chars[i].1 == '-' {
        i += 1;
    }
    let mut seen_dot = false;
    while i < chars.len() {
        let c = chars[i].1;
        if c.is_ascii_digit() {
            i += 1;
        } else if c == '.'
            && !seen_dot
            && chars.get(i + 1).is_some_and(|(_, n)| n.is_ascii_digit())
        {
            seen_dot = true;
            i += 1;
        } else {
            break;
        }
    }
    let text: String = chars[start..i].iter().map(|(_, c)| *c).collect();
    text.parse::<f64>()
        .map(|n| (n, i - start))
        .map_err(|e| parse_error(chars[start].0, format!("invalid number '{}': {}", text, e)))
}

// ── Parser ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Path(Vec<String>),
    List(Vec<Expr>),
    Not(Box<Expr>),
    /// Operands of an `and` chain, flattened.
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    In(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Deepest allowed nesting of parentheses, lists and negations.
const MAX_NESTING: usize = 64;

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
    depth: usize,
}

fn parse(input: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(parse_error(0, "empty expression"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
        depth: 0,
    };
    let expr = parser.parse_or()?;
    if let Some((pos, token)) = parser.tokens.get(parser.pos) {
        return Err(parse_error(*pos, format!("unexpected trailing token {:?}", token)));
    }
    Ok(expr)
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|(p, _)| *p).unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        let position = self.position();
        match self.advance() {
            Some(ref t) if *t == expected => Ok(()),
            Some(t) => Err(parse_error(
                position,
                format!("expected {:?}, found {:?}", expected, t),
            )),
            None => Err(parse_error(
                position,
                format!("expected {:?}, found end of input", expected),
            )),
        }
    }

    /// Enter one nesting level; the parser and evaluator recurse per level.
    fn descend(&mut self, position: usize) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(parse_error(position, "expression nested too deeply"));
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut operands = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.advance();
            operands.push(self.parse_and()?);
        }
        Ok(flatten(operands, Expr::Or))
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut operands = vec![self.parse_unary()?];
        while self.peek() == Some(&Token::And) {
            self.advance();
            operands.push(self.parse_unary()?);
        }
        Ok(flatten(operands, Expr::And))
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek() == Some(&Token::Not) {
            let position = self.position();
            self.advance();
            self.descend(position)?;
            let inner = self.parse_unary()?;
            self.ascend();
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let lhs = self.parse_primary()?;
        let op = match self.peek() {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::Ne) => CompareOp::Ne,
            Some(Token::Lt) => CompareOp::Lt,
            Some(Token::Le) => CompareOp::Le,
            Some(Token::Gt) => CompareOp::Gt,
            Some(Token::Ge) => CompareOp::Ge,
            Some(Token::In) => {
                self.advance();
                let rhs = self.parse_primary()?;
                return Ok(Expr::In(Box::new(lhs), Box::new(rhs)));
            }
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_primary()?;
        Ok(Expr::Compare(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let position = self.position();
        match self.advance() {
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Num(n)) => Ok(Expr::Literal(number(n))),
            Some(Token::LParen) => {
                self.descend(position)?;
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                self.ascend();
                Ok(inner)
            }
            Some(Token::LBracket) => {
                self.descend(position)?;
                let mut items = Vec::new();
                if self.peek() != Some(&Token::RBracket) {
                    loop {
                        items.push(self.parse_or()?);
                        match self.peek() {
                            Some(Token::Comma) => {
                                self.advance();
                            }
                            _ => break,
                        }
                    }
                }
                self.expect(Token::RBracket)?;
                self.ascend();
                Ok(Expr::List(items))
            }
            Some(Token::Ident(first)) => {
                let mut segments = vec![first];
                while self.peek() == Some(&Token::Dot) {
                    self.advance();
                    let position = self.position();
                    match self.advance() {
                        Some(Token::Ident(s)) => segments.push(s),
                        Some(Token::Num(n)) if n >= 0.0 && n.fract() == 0.0 => {
                            segments.push(format!("{}", n as u64))
                        }
                        other => {
                            return Err(parse_error(
                                position,
                                format!("expected path segment, found {:?}", other),
                            ))
                        }
                    }
                }
                Ok(Expr::Path(segments))
            }
            Some(t) => Err(parse_error(position, format!("unexpected token {:?}", t))),
            None => Err(parse_error(position, "unexpected end of input")),
        }
    }
}

fn flatten(mut operands: Vec<Expr>, chain: fn(Vec<Expr>) -> Expr) -> Expr {
    if operands.len() == 1 {
        operands.remove(0)
    } else {
        chain(operands)
    }
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

// ── Evaluation ──────────────────────────────────────────────────────

fn eval(expr: &Expr, ctx: &Value) -> Value {
    match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Path(segments) => resolve_path(ctx, segments),
        Expr::List(items) => Value::Array(items.iter().map(|e| eval(e, ctx)).collect()),
        Expr::Not(inner) => Value::Bool(!truthy(&eval(inner, ctx))),
        Expr::And(operands) => Value::Bool(operands.iter().all(|e| truthy(&eval(e, ctx)))),
        Expr::Or(operands) => Value::Bool(operands.iter().any(|e| truthy(&eval(e, ctx)))),
        Expr::Compare(op, lhs, rhs) => {
            let (a, b) = (eval(lhs, ctx), eval(rhs, ctx));
            Value::Bool(compare(*op, &a, &b))
        }
        Expr::In(needle, haystack) => {
            let (needle, haystack) = (eval(needle, ctx), eval(haystack, ctx));
            let found = match (&needle, &haystack) {
                (_, Value::Array(items)) => items.iter().any(|item| values_equal(&needle, item)),
                (Value::String(n), Value::String(h)) => h.contains(n.as_str()),
                _ => false,
            };
            Value::Bool(found)
        }
    }
}

fn resolve_path(ctx: &Value, segments: &[String]) -> Value {
    let mut current = ctx;
    for segment in segments {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
        Value::Null => false,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare(op: CompareOp, a: &Value, b: &Value) -> bool {
    match op {
        CompareOp::Eq => values_equal(a, b),
        CompareOp::Ne => !values_equal(a, b),
        CompareOp::Lt => ordering(a, b) == Some(Ordering::Less),
        CompareOp::Le => matches!(ordering(a, b), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => ordering(a, b) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(ordering(a, b), Some(Ordering::Greater | Ordering::Equal)),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
