// src/core/view/grammar.rs

//! A restricted expression grammar covering common map-function idioms:
//! `emit(key, value)`, field projections off the single `obj` parameter,
//! and `===`/`!==`/`&&` guards on `obj.type` and similar fields. Nothing
//! here can reach outside the parsed document — there is no function
//! call other than the special-cased `emit`, no assignment, and no loop.

use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// The map function's single parameter.
    Obj,
    /// `<base>.<field>`.
    Field(Box<Expr>, String),
    /// A string or number literal.
    Lit(Value),
    Eq(Box<Expr>, Box<Expr>),
    NotEq(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    If(Expr, Box<Stmt>),
    Emit(Expr, Expr),
    Seq(Vec<Stmt>),
}

#[derive(Debug)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view grammar parse error: {}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Dot,
    Comma,
    LParen,
    RParen,
    Semi,
    EqEqEq,
    NotEqEq,
    AndAnd,
    If,
}

fn tokenize(src: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ';' => {
                tokens.push(Token::Semi);
                i += 1;
            }
            '=' if chars.get(i..i + 3) == Some(&['=', '=', '=']) => {
                tokens.push(Token::EqEqEq);
                i += 3;
            }
            '!' if chars.get(i..i + 3) == Some(&['!', '=', '=']) => {
                tokens.push(Token::NotEqEq);
                i += 3;
            }
            '&' if chars.get(i..i + 2) == Some(&['&', '&']) => {
                tokens.push(Token::AndAnd);
                i += 2;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != quote {
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(ParseError("unterminated string literal".into()));
                }
                tokens.push(Token::Str(chars[start..j].iter().collect()));
                i = j + 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                let mut j = i;
                while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.') {
                    j += 1;
                }
                let text: String = chars[start..j].iter().collect();
                let num: f64 = text
                    .parse()
                    .map_err(|_| ParseError(format!("bad numeric literal '{text}'")))?;
                tokens.push(Token::Num(num));
                i = j;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                let mut j = i;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                let word: String = chars[start..j].iter().collect();
                tokens.push(if word == "if" { Token::If } else { Token::Ident(word) });
                i = j;
            }
            other => return Err(ParseError(format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        match self.next() {
            Some(t) if &t == expected => Ok(()),
            other => Err(ParseError(format!("expected {expected:?}, got {other:?}"))),
        }
    }

    fn parse_program(&mut self) -> Result<Stmt, ParseError> {
        let mut stmts = Vec::new();
        while self.peek().is_some() {
            stmts.push(self.parse_stmt()?);
            while self.peek() == Some(&Token::Semi) {
                self.pos += 1;
            }
        }
        Ok(Stmt::Seq(stmts))
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        if self.peek() == Some(&Token::If) {
            self.pos += 1;
            self.expect(&Token::LParen)?;
            let cond = self.parse_expr()?;
            self.expect(&Token::RParen)?;
            let body = self.parse_stmt()?;
            return Ok(Stmt::If(cond, Box::new(body)));
        }

        // `emit(key, value)`
        match self.next() {
            Some(Token::Ident(name)) if name == "emit" => {
                self.expect(&Token::LParen)?;
                let key = self.parse_expr()?;
                self.expect(&Token::Comma)?;
                let value = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(Stmt::Emit(key, value))
            }
            other => Err(ParseError(format!("expected 'emit(...)' or 'if (...)', got {other:?}"))),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_and()
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_equality()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.pos += 1;
            let rhs = self.parse_equality()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_primary()?;
        match self.peek() {
            Some(Token::EqEqEq) => {
                self.pos += 1;
                let rhs = self.parse_primary()?;
                Ok(Expr::Eq(Box::new(lhs), Box::new(rhs)))
            }
            Some(Token::NotEqEq) => {
                self.pos += 1;
                let rhs = self.parse_primary()?;
                Ok(Expr::NotEq(Box::new(lhs), Box::new(rhs)))
            }
            _ => Ok(lhs),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Lit(Value::String(s))),
            Some(Token::Num(n)) => Ok(Expr::Lit(serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null))),
            Some(Token::Ident(name)) if name == "obj" => {
                let mut expr = Expr::Obj;
                while self.peek() == Some(&Token::Dot) {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Ident(field)) => expr = Expr::Field(Box::new(expr), field),
                        other => return Err(ParseError(format!("expected field name, got {other:?}"))),
                    }
                }
                Ok(expr)
            }
            other => Err(ParseError(format!("expected expression, got {other:?}"))),
        }
    }
}

/// Parses a restricted map-function body into a statement tree.
pub fn parse(src: &str) -> Result<Stmt, ParseError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_program()
}

fn eval_expr(expr: &Expr, doc: &Value) -> Value {
    match expr {
        Expr::Obj => doc.clone(),
        Expr::Field(base, field) => {
            let base_val = eval_expr(base, doc);
            base_val.get(field).cloned().unwrap_or(Value::Null)
        }
        Expr::Lit(v) => v.clone(),
        Expr::Eq(a, b) => Value::Bool(eval_expr(a, doc) == eval_expr(b, doc)),
        Expr::NotEq(a, b) => Value::Bool(eval_expr(a, doc) != eval_expr(b, doc)),
        Expr::And(a, b) => {
            let a_val = eval_expr(a, doc);
            if !truthy(&a_val) {
                Value::Bool(false)
            } else {
                Value::Bool(truthy(&eval_expr(b, doc)))
            }
        }
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(_) => true,
    }
}

/// Runs a parsed map-function body against one document, collecting every
/// `emit(key, value)` call into `(key, value)` pairs.
pub fn run(stmt: &Stmt, doc: &Value) -> Vec<(Value, Value)> {
    let mut rows = Vec::new();
    run_stmt(stmt, doc, &mut rows);
    rows
}

fn run_stmt(stmt: &Stmt, doc: &Value, rows: &mut Vec<(Value, Value)>) {
    match stmt {
        Stmt::Seq(stmts) => {
            for s in stmts {
                run_stmt(s, doc, rows);
            }
        }
        Stmt::If(cond, body) => {
            if truthy(&eval_expr(cond, doc)) {
                run_stmt(body, doc, rows);
            }
        }
        Stmt::Emit(key, value) => {
            rows.push((eval_expr(key, doc), eval_expr(value, doc)));
        }
    }
}
