// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 模板表达式模块
//!
//! 模板中 `<% %>` 与 `<%= %>` 区域内使用的小型宿主语言：
//! - 词法分析：把代码片段切分为带字节偏移的记号。
//! - 语法分析：按运算符优先级构建 `Expr` 语法树。
//! - 求值：在 `Scope` 中对 `serde_json::Value` 进行计算。
//!
//! 真值规则：`null`、`false`、`0`、`""` 为假，其余为真。

use std::collections::HashMap;

use serde_json::{Map, Number, Value};

use crate::exception::Exception;

/// 词法或语法错误，`offset` 是在模板源码中的字节偏移。
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub offset: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Literal(Value),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Dot,
    Comma,
    Semi,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Not,
    And,
    Or,
}

/// 带位置信息的记号
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// 对一段代码进行词法分析，`base` 为该片段在模板中的起始偏移。
pub fn lex(code: &str, base: usize) -> Result<Vec<Spanned>, SyntaxError> {
    let bytes = code.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let offset = base + i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let mut is_float = false;
            if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
                is_float = true;
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text = &code[start..i];
            let value = match (is_float, text.parse::<i64>()) {
                (false, Ok(n)) => Value::from(n),
                _ => text
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| SyntaxError::new(offset, format!("invalid number '{}'", text)))?,
            };
            tokens.push(Spanned {
                token: Token::Literal(value),
                offset,
            });
            continue;
        }

        if c == b'"' || c == b'\'' {
            let (value, next) = lex_string(code, i, base)?;
            tokens.push(Spanned {
                token: Token::Literal(Value::String(value)),
                offset,
            });
            i = next;
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' || c == b'$' {
            let start = i;
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'$')
            {
                i += 1;
            }
            let token = match &code[start..i] {
                "true" => Token::Literal(Value::Bool(true)),
                "false" => Token::Literal(Value::Bool(false)),
                "null" => Token::Literal(Value::Null),
                ident => Token::Ident(ident.to_string()),
            };
            tokens.push(Spanned { token, offset });
            continue;
        }

        let pair = if i + 1 < bytes.len() {
            match (c, bytes[i + 1]) {
                (b'=', b'=') => Some(Token::Eq),
                (b'!', b'=') => Some(Token::Ne),
                (b'<', b'=') => Some(Token::Le),
                (b'>', b'=') => Some(Token::Ge),
                (b'&', b'&') => Some(Token::And),
                (b'|', b'|') => Some(Token::Or),
                _ => None,
            }
        } else {
            None
        };
        if let Some(token) = pair {
            tokens.push(Spanned { token, offset });
            i += 2;
            continue;
        }

        let token = match c {
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b'[' => Token::LBracket,
            b']' => Token::RBracket,
            b'{' => Token::LBrace,
            b'}' => Token::RBrace,
            b'.' => Token::Dot,
            b',' => Token::Comma,
            b';' => Token::Semi,
            b'=' => Token::Assign,
            b'<' => Token::Lt,
            b'>' => Token::Gt,
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'*' => Token::Star,
            b'/' => Token::Slash,
            b'%' => Token::Percent,
            b'!' => Token::Not,
            _ => {
                let ch = code[i..].chars().next().unwrap_or('?');
                return Err(SyntaxError::new(
                    offset,
                    format!("unexpected character '{}'", ch),
                ));
            }
        };
        tokens.push(Spanned { token, offset });
        i += 1;
    }

    Ok(tokens)
}

/// 解析从 `start` 处引号开始的字符串字面量，返回内容与结束后的位置。
fn lex_string(code: &str, start: usize, base: usize) -> Result<(String, usize), SyntaxError> {
    let quote = code.as_bytes()[start] as char;
    let mut value = String::new();
    let mut chars = code[start + 1..].char_indices();

    while let Some((idx, ch)) = chars.next() {
        match ch {
            '\\' => {
                let escaped = match chars.next() {
                    Some((_, 'n')) => '\n',
                    Some((_, 't')) => '\t',
                    Some((_, 'r')) => '\r',
                    Some((_, other)) => other,
                    None => break,
                };
                value.push(escaped);
            }
            c if c == quote => return Ok((value, start + 1 + idx + 1)),
            c => value.push(c),
        }
    }

    Err(SyntaxError::new(base + start, "unterminated string literal"))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    Array(Vec<Expr>),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

/// 表达式解析器读取记号的来源。
///
/// 语句解析器在文本片段处返回 `None`，使表达式在区域边界自然终止。
pub trait TokenSource {
    fn peek(&self) -> Option<&Spanned>;
    fn advance(&mut self) -> Option<Spanned>;
    /// 当前位置的偏移，用于报告“意外结束”类错误
    fn offset(&self) -> usize;
}

/// 基于切片的记号来源，用于 `<%= %>` 区域
pub struct SliceSource<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    end: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(tokens: &'a [Spanned], end: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            end,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

impl TokenSource for SliceSource<'_> {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        match self.tokens.get(self.pos) {
            Some(t) => t.offset,
            None => self.end,
        }
    }
}

fn eat<S: TokenSource>(source: &mut S, token: &Token) -> bool {
    if source.peek().map(|t| &t.token) == Some(token) {
        source.advance();
        true
    } else {
        false
    }
}

pub fn expect<S: TokenSource>(source: &mut S, token: Token, what: &str) -> Result<(), SyntaxError> {
    if eat(source, &token) {
        Ok(())
    } else {
        Err(SyntaxError::new(source.offset(), format!("expected {}", what)))
    }
}

/// 解析一个完整表达式
pub fn parse_expression<S: TokenSource>(source: &mut S) -> Result<Expr, SyntaxError> {
    parse_or(source)
}

fn parse_or<S: TokenSource>(source: &mut S) -> Result<Expr, SyntaxError> {
    let mut left = parse_and(source)?;
    while eat(source, &Token::Or) {
        let right = parse_and(source)?;
        left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_and<S: TokenSource>(source: &mut S) -> Result<Expr, SyntaxError> {
    let mut left = parse_equality(source)?;
    while eat(source, &Token::And) {
        let right = parse_equality(source)?;
        left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
    }
    Ok(left)
}

/// 左结合的二元运算层，`table` 给出本层可接受的运算符
fn parse_binary_level<S: TokenSource>(
    source: &mut S,
    table: &[(Token, BinaryOp)],
    next: fn(&mut S) -> Result<Expr, SyntaxError>,
) -> Result<Expr, SyntaxError> {
    let mut left = next(source)?;
    loop {
        let op = match source.peek() {
            Some(t) => table.iter().find(|(tok, _)| *tok == t.token).map(|(_, op)| *op),
            None => None,
        };
        match op {
            Some(op) => {
                source.advance();
                let right = next(source)?;
                left = Expr::Binary(op, Box::new(left), Box::new(right));
            }
            None => return Ok(left),
        }
    }
}

fn parse_equality<S: TokenSource>(source: &mut S) -> Result<Expr, SyntaxError> {
    parse_binary_level(
        source,
        &[(Token::Eq, BinaryOp::Eq), (Token::Ne, BinaryOp::Ne)],
        parse_comparison,
    )
}

fn parse_comparison<S: TokenSource>(source: &mut S) -> Result<Expr, SyntaxError> {
    parse_binary_level(
        source,
        &[
            (Token::Lt, BinaryOp::Lt),
            (Token::Le, BinaryOp::Le),
            (Token::Gt, BinaryOp::Gt),
            (Token::Ge, BinaryOp::Ge),
        ],
        parse_additive,
    )
}

fn parse_additive<S: TokenSource>(source: &mut S) -> Result<Expr, SyntaxError> {
    parse_binary_level(
        source,
        &[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)],
        parse_multiplicative,
    )
}

fn parse_multiplicative<S: TokenSource>(source: &mut S) -> Result<Expr, SyntaxError> {
    parse_binary_level(
        source,
        &[
            (Token::Star, BinaryOp::Mul),
            (Token::Slash, BinaryOp::Div),
            (Token::Percent, BinaryOp::Rem),
        ],
        parse_unary,
    )
}

fn parse_unary<S: TokenSource>(source: &mut S) -> Result<Expr, SyntaxError> {
    if eat(source, &Token::Not) {
        return Ok(Expr::Unary(UnaryOp::Not, Box::new(parse_unary(source)?)));
    }
    if eat(source, &Token::Minus) {
        return Ok(Expr::Unary(UnaryOp::Neg, Box::new(parse_unary(source)?)));
    }
    parse_postfix(source)
}

fn parse_postfix<S: TokenSource>(source: &mut S) -> Result<Expr, SyntaxError> {
    let mut expr = parse_primary(source)?;
    loop {
        if eat(source, &Token::Dot) {
            match source.advance() {
                Some(Spanned {
                    token: Token::Ident(name),
                    ..
                }) => expr = Expr::Member(Box::new(expr), name),
                Some(t) => return Err(SyntaxError::new(t.offset, "expected property name")),
                None => return Err(SyntaxError::new(source.offset(), "expected property name")),
            }
        } else if eat(source, &Token::LBracket) {
            let index = parse_expression(source)?;
            expect(source, Token::RBracket, "']'")?;
            expr = Expr::Index(Box::new(expr), Box::new(index));
        } else {
            return Ok(expr);
        }
    }
}

fn parse_primary<S: TokenSource>(source: &mut S) -> Result<Expr, SyntaxError> {
    let offset = source.offset();
    match source.advance() {
        Some(Spanned {
            token: Token::Literal(value),
            ..
        }) => Ok(Expr::Literal(value)),
        Some(Spanned {
            token: Token::Ident(name),
            ..
        }) => Ok(Expr::Ident(name)),
        Some(Spanned {
            token: Token::LParen,
            ..
        }) => {
            let expr = parse_expression(source)?;
            expect(source, Token::RParen, "')'")?;
            Ok(expr)
        }
        Some(Spanned {
            token: Token::LBracket,
            ..
        }) => {
            let mut items = Vec::new();
            if !eat(source, &Token::RBracket) {
                loop {
                    items.push(parse_expression(source)?);
                    if eat(source, &Token::Comma) {
                        continue;
                    }
                    expect(source, Token::RBracket, "']'")?;
                    break;
                }
            }
            Ok(Expr::Array(items))
        }
        Some(t) => Err(SyntaxError::new(t.offset, "expected expression")),
        None => Err(SyntaxError::new(offset, "expected expression")),
    }
}

/// 渲染时的名字绑定：最内层帧优先，最后回落到渲染上下文。
pub struct Scope<'a> {
    context: &'a Map<String, Value>,
    frames: Vec<HashMap<String, Value>>,
}

impl<'a> Scope<'a> {
    pub fn new(context: &'a Map<String, Value>) -> Self {
        Self {
            context,
            frames: vec![HashMap::new()],
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name))
            .or_else(|| self.context.get(name))
    }

    pub fn bind(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }
}

fn render_error(message: impl Into<String>) -> Exception {
    Exception::TemplateRender(message.into())
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// 输出区域使用的字符串化规则
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        other => other.to_string(),
    }
}

fn format_number(n: &Number) -> String {
    if n.is_f64() {
        if let Some(f) = n.as_f64() {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                return (f as i64).to_string();
            }
        }
    }
    n.to_string()
}

fn number(value: f64) -> Result<Value, Exception> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| render_error("arithmetic result is not a finite number"))
}

fn as_number(value: &Value, op: &str) -> Result<f64, Exception> {
    match value.as_f64() {
        Some(f) => Ok(f),
        None => Err(render_error(format!(
            "operator '{}' expects numbers, got {}",
            op,
            type_name(value)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) if left.is_number() && right.is_number() => a == b,
        _ => left == right,
    }
}

pub fn evaluate(expr: &Expr, scope: &Scope<'_>) -> Result<Value, Exception> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Ident(name) => scope
            .lookup(name)
            .cloned()
            .ok_or_else(|| render_error(format!("'{}' is not defined", name))),
        Expr::Array(items) => items
            .iter()
            .map(|item| evaluate(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Member(target, name) => match evaluate(target, scope)? {
            Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
            Value::Array(items) if name == "length" => Ok(Value::from(items.len())),
            Value::String(s) if name == "length" => Ok(Value::from(s.chars().count())),
            other => Err(render_error(format!(
                "cannot read property '{}' of {}",
                name,
                type_name(&other)
            ))),
        },
        Expr::Index(target, index) => {
            let target = evaluate(target, scope)?;
            let index = evaluate(index, scope)?;
            match (&target, &index) {
                (Value::Array(items), Value::Number(n)) => Ok(n
                    .as_u64()
                    .and_then(|i| items.get(i as usize))
                    .cloned()
                    .unwrap_or(Value::Null)),
                (Value::Object(map), Value::String(key)) => {
                    Ok(map.get(key).cloned().unwrap_or(Value::Null))
                }
                _ => Err(render_error(format!(
                    "cannot index {} with {}",
                    type_name(&target),
                    type_name(&index)
                ))),
            }
        }
        Expr::Unary(UnaryOp::Not, operand) => {
            Ok(Value::Bool(!is_truthy(&evaluate(operand, scope)?)))
        }
        Expr::Unary(UnaryOp::Neg, operand) => {
            let value = evaluate(operand, scope)?;
            match value.as_i64() {
                Some(i) if i != i64::MIN => Ok(Value::from(-i)),
                _ => number(-as_number(&value, "-")?),
            }
        }
        Expr::Binary(BinaryOp::And, left, right) => {
            let left = evaluate(left, scope)?;
            if is_truthy(&left) {
                evaluate(right, scope)
            } else {
                Ok(left)
            }
        }
        Expr::Binary(BinaryOp::Or, left, right) => {
            let left = evaluate(left, scope)?;
            if is_truthy(&left) {
                Ok(left)
            } else {
                evaluate(right, scope)
            }
        }
        Expr::Binary(op, left, right) => {
            let left = evaluate(left, scope)?;
            let right = evaluate(right, scope)?;
            binary(*op, &left, &right)
        }
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, Exception> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(loosely_equal(left, right))),
        BinaryOp::Ne => return Ok(Value::Bool(!loosely_equal(left, right))),
        BinaryOp::Add if left.is_string() || right.is_string() => {
            return Ok(Value::String(display(left) + &display(right)));
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => a.partial_cmp(b),
                _ => as_number(left, "compare")?.partial_cmp(&as_number(right, "compare")?),
            };
            let result = match ordering {
                Some(ordering) => match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                },
                None => false,
            };
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        let exact = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div if b == 0 => return Err(render_error("division by zero")),
            BinaryOp::Div if a.checked_rem(b) == Some(0) => a.checked_div(b),
            BinaryOp::Rem if b == 0 => return Err(render_error("division by zero")),
            BinaryOp::Rem => a.checked_rem(b),
            _ => None,
        };
        if let Some(result) = exact {
            return Ok(Value::from(result));
        }
    }

    let symbol = match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        _ => "%",
    };
    let a = as_number(left, symbol)?;
    let b = as_number(right, symbol)?;
    match op {
        BinaryOp::Add => number(a + b),
        BinaryOp::Sub => number(a - b),
        BinaryOp::Mul => number(a * b),
        BinaryOp::Div if b == 0.0 => Err(render_error("division by zero")),
        BinaryOp::Div => number(a / b),
        _ if b == 0.0 => Err(render_error("division by zero")),
        _ => number(a % b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval_with(code: &str, context: Value) -> Result<Value, Exception> {
        let tokens = lex(code, 0).unwrap();
        let mut source = SliceSource::new(&tokens, code.len());
        let expr = parse_expression(&mut source).unwrap();
        assert!(source.is_empty(), "trailing tokens in {}", code);
        let map = match context {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let scope = Scope::new(&map);
        evaluate(&expr, &scope)
    }

    fn eval(code: &str) -> Value {
        eval_with(code, json!({})).unwrap()
    }

    #[test]
    fn test_lex_operators_and_literals() {
        let tokens: Vec<Token> = lex("a.b >= 10 && !'x'", 0)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".to_string()),
                Token::Dot,
                Token::Ident("b".to_string()),
                Token::Ge,
                Token::Literal(json!(10)),
                Token::And,
                Token::Not,
                Token::Literal(json!("x")),
            ]
        );
    }

    #[test]
    fn test_lex_offsets_are_absolute() {
        let tokens = lex(" name", 7).unwrap();
        assert_eq!(tokens[0].offset, 8);
    }

    #[test]
    fn test_lex_rejects_unknown_character() {
        let err = lex("a # b", 3).unwrap_err();
        assert_eq!(err.offset, 5);
    }

    #[test]
    fn test_lex_unterminated_string() {
        let err = lex("\"abc", 0).unwrap_err();
        assert_eq!(err.message, "unterminated string literal");
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(eval(r#""a\"b\n""#), json!("a\"b\n"));
        assert_eq!(eval(r"'it\'s'"), json!("it's"));
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(eval("1 + 2 * 3"), json!(7));
        assert_eq!(eval("(1 + 2) * 3"), json!(9));
        assert_eq!(eval("7 % 4 - -1"), json!(4));
        assert_eq!(eval("6 / 3"), json!(2));
        assert_eq!(eval("7 / 2"), json!(3.5));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(eval("'n=' + 3"), json!("n=3"));
        assert_eq!(eval("1.5 + 'x'"), json!("1.5x"));
    }

    #[test]
    fn test_comparison_and_equality() {
        assert_eq!(eval("2 > 1 && 'a' < 'b'"), json!(true));
        assert_eq!(eval("1 == 1.0"), json!(true));
        assert_eq!(eval("'1' == 1"), json!(false));
        assert_eq!(eval("null != false"), json!(true));
    }

    #[test]
    fn test_logical_operators_return_operands() {
        assert_eq!(eval("'' || 'fallback'"), json!("fallback"));
        assert_eq!(eval("0 && missing"), json!(0));
    }

    #[test]
    fn test_member_and_index_access() {
        let context = json!({"user": {"name": "Ann", "tags": ["a", "b"]}});
        assert_eq!(eval_with("user.name", context.clone()).unwrap(), json!("Ann"));
        assert_eq!(eval_with("user.tags[1]", context.clone()).unwrap(), json!("b"));
        assert_eq!(eval_with("user['name']", context.clone()).unwrap(), json!("Ann"));
        assert_eq!(eval_with("user.tags.length", context.clone()).unwrap(), json!(2));
        assert_eq!(eval_with("user.missing", context).unwrap(), Value::Null);
    }

    #[test]
    fn test_unknown_binding_is_error() {
        match eval_with("nobody", json!({})) {
            Err(Exception::TemplateRender(message)) => assert!(message.contains("nobody")),
            other => panic!("expected render error, got {:?}", other),
        }
    }

    #[test]
    fn test_division_by_zero_is_error() {
        assert!(eval_with("1 / 0", json!({})).is_err());
        assert!(eval_with("1 % 0", json!({})).is_err());
    }

    #[test]
    fn test_property_of_null_is_error() {
        assert!(eval_with("a.b.c", json!({"a": {}})).is_err());
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!("0")));
    }

    #[test]
    fn test_display() {
        assert_eq!(display(&json!(null)), "");
        assert_eq!(display(&json!(3.0)), "3");
        assert_eq!(display(&json!(2.5)), "2.5");
        assert_eq!(display(&json!([1, "a"])), r#"[1,"a"]"#);
    }

    #[test]
    fn test_scope_frames_shadow_context() {
        let map = json!({"x": 1}).as_object().cloned().unwrap();
        let mut scope = Scope::new(&map);
        scope.push();
        scope.bind("x", json!(2));
        assert_eq!(scope.lookup("x"), Some(&json!(2)));
        scope.pop();
        assert_eq!(scope.lookup("x"), Some(&json!(1)));
    }

    #[test]
    fn test_array_literal() {
        assert_eq!(eval("[1, 'two', [3]]"), json!([1, "two", [3]]));
        assert_eq!(eval("[]"), json!([]));
    }
}
