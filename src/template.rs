// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 模板编译模块
//!
//! 模板语法：
//! - `<%= expr %>`：表达式区域，求值后追加到输出。
//! - `<% stmt %>`：语句区域，支持 `if / else if / else`、`for (x in list)`、`let x = expr;`，
//!   代码块以 `{` `}` 界定，可以跨越多个区域。
//! - 其余文本原样输出，换行符统一替换为空格。
//!
//! 区域在遇到的第一个 `%>` 处结束，即使它位于字符串字面量之内：
//! `<%= "a%>b" %>` 会截断为未闭合的字符串，编译报语法错误。
//! 需要输出 `%>` 时把它拆开拼接，如 `<%= "%" + ">" %>`。
//!
//! 编译结果是节点树 `Template`，由树遍历渲染器执行，不生成、不求值任何源码文本。

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use crate::{
    exception::Exception,
    expression::{
        self, evaluate, expect, is_truthy, lex, parse_expression, Expr, Scope, SliceSource,
        Spanned, SyntaxError, Token, TokenSource,
    },
};

lazy_static! {
    /// 匹配一个完整的标记区域，捕获组 1 为表达式标记 `=`，捕获组 2 为区域内容
    static ref REGION: Regex = Regex::new(r"(?s)<%(=?)(.*?)%>").unwrap();
}

const OPEN_MARKER: &str = "<%";

/// 编译后的节点
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Output(Expr),
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    },
    For {
        binding: String,
        iterable: Expr,
        body: Vec<Node>,
    },
    Let {
        name: String,
        value: Expr,
    },
}

/// 编译得到的可执行模板
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

/// 词法阶段产物：文本、已解析的输出表达式、语句记号
enum Piece {
    Text(String),
    Output(Expr),
    Code(Spanned),
}

impl Template {
    /// 编译模板源码。相同输入总是得到相同结果，过程中不做任何 I/O。
    pub fn compile(source: &str) -> Result<Self, Exception> {
        let pieces = scan(source).map_err(|e| syntax_exception(source, e))?;
        let mut parser = Parser {
            pieces,
            pos: 0,
            end: source.len(),
        };
        let nodes = parser
            .parse_block(false)
            .map_err(|e| syntax_exception(source, e))?;
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// 以给定上下文执行模板；`None` 表示空上下文。
    pub fn render(&self, context: Option<&Map<String, Value>>) -> Result<String, Exception> {
        let empty = Map::new();
        let mut scope = Scope::new(context.unwrap_or(&empty));
        let mut output = String::new();
        render_nodes(&self.nodes, &mut scope, &mut output)?;
        Ok(output)
    }
}

/// 将字节偏移换算为从 1 开始的行列号
fn position(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(idx) => before[idx + 1..].chars().count() + 1,
        None => before.chars().count() + 1,
    };
    (line, column)
}

fn syntax_exception(source: &str, e: SyntaxError) -> Exception {
    let (line, column) = position(source, e.offset);
    Exception::TemplateSyntax {
        line,
        column,
        message: e.message,
    }
}

fn normalize_text(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// 切分源码：标记之外的文本、`<%= %>` 表达式、`<% %>` 语句记号
fn scan(source: &str) -> Result<Vec<Piece>, SyntaxError> {
    let mut pieces = Vec::new();
    let mut last = 0;

    for caps in REGION.captures_iter(source) {
        let (Some(whole), Some(content)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        push_text(&mut pieces, source, last, whole.start())?;

        let is_expression = caps.get(1).map_or(false, |m| !m.as_str().is_empty());
        let tokens = lex(content.as_str(), content.start())?;
        if is_expression {
            let mut tokens_source = SliceSource::new(&tokens, content.end());
            let expr = parse_expression(&mut tokens_source)?;
            if !tokens_source.is_empty() {
                return Err(SyntaxError::new(
                    tokens_source.offset(),
                    "unexpected token after expression",
                ));
            }
            pieces.push(Piece::Output(expr));
        } else {
            pieces.extend(tokens.into_iter().map(Piece::Code));
        }
        last = whole.end();
    }
    push_text(&mut pieces, source, last, source.len())?;

    Ok(pieces)
}

fn push_text(
    pieces: &mut Vec<Piece>,
    source: &str,
    start: usize,
    end: usize,
) -> Result<(), SyntaxError> {
    let text = &source[start..end];
    if let Some(idx) = text.find(OPEN_MARKER) {
        return Err(SyntaxError::new(start + idx, "unterminated '<%'"));
    }
    if !text.is_empty() {
        pieces.push(Piece::Text(normalize_text(text)));
    }
    Ok(())
}

/// 语句解析器。文本与输出片段对表达式解析器不可见，使表达式止于区域边界。
struct Parser {
    pieces: Vec<Piece>,
    pos: usize,
    end: usize,
}

impl TokenSource for Parser {
    fn peek(&self) -> Option<&Spanned> {
        match self.pieces.get(self.pos) {
            Some(Piece::Code(token)) => Some(token),
            _ => None,
        }
    }

    fn advance(&mut self) -> Option<Spanned> {
        let token = self.peek().cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        self.pieces[self.pos..]
            .iter()
            .find_map(|piece| match piece {
                Piece::Code(token) => Some(token.offset),
                _ => None,
            })
            .unwrap_or(self.end)
    }
}

impl Parser {
    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Spanned { token: Token::Ident(name), .. }) if name == keyword)
    }

    /// 解析一串节点；`nested` 为真时遇到 `}` 返回（不消费），否则 `}` 为错误。
    fn parse_block(&mut self, nested: bool) -> Result<Vec<Node>, SyntaxError> {
        let mut nodes = Vec::new();
        loop {
            match self.pieces.get_mut(self.pos) {
                None => {
                    if nested {
                        return Err(SyntaxError::new(self.end, "missing '}'"));
                    }
                    return Ok(nodes);
                }
                Some(Piece::Text(text)) => {
                    nodes.push(Node::Text(std::mem::take(text)));
                    self.pos += 1;
                }
                Some(Piece::Output(expr)) => {
                    nodes.push(Node::Output(std::mem::replace(
                        expr,
                        Expr::Literal(Value::Null),
                    )));
                    self.pos += 1;
                }
                Some(Piece::Code(token)) => {
                    let offset = token.offset;
                    let keyword = match &token.token {
                        Token::RBrace if nested => return Ok(nodes),
                        Token::RBrace => return Err(SyntaxError::new(offset, "unexpected '}'")),
                        Token::Semi => ";",
                        Token::Ident(name) if name == "if" => "if",
                        Token::Ident(name) if name == "for" => "for",
                        Token::Ident(name) if name == "let" => "let",
                        _ => return Err(SyntaxError::new(offset, "expected statement")),
                    };
                    match keyword {
                        "if" => nodes.push(self.parse_if()?),
                        "for" => nodes.push(self.parse_for()?),
                        "let" => nodes.push(self.parse_let()?),
                        _ => self.pos += 1,
                    }
                }
            }
        }
    }

    /// `{ ... }` 代码块
    fn parse_body(&mut self) -> Result<Vec<Node>, SyntaxError> {
        expect(self, Token::LBrace, "'{'")?;
        let body = self.parse_block(true)?;
        expect(self, Token::RBrace, "'}'")?;
        Ok(body)
    }

    fn parse_if(&mut self) -> Result<Node, SyntaxError> {
        self.advance();
        let mut branches = vec![(parse_expression(self)?, self.parse_body()?)];
        let mut otherwise = None;

        while self.peek_keyword("else") {
            self.advance();
            if self.peek_keyword("if") {
                self.advance();
                let condition = parse_expression(self)?;
                branches.push((condition, self.parse_body()?));
            } else {
                otherwise = Some(self.parse_body()?);
                break;
            }
        }

        Ok(Node::If {
            branches,
            otherwise,
        })
    }

    fn parse_for(&mut self) -> Result<Node, SyntaxError> {
        self.advance();
        let parenthesized = matches!(self.peek(), Some(Spanned { token: Token::LParen, .. }));
        if parenthesized {
            self.advance();
        }
        let binding = self.parse_name()?;
        if !self.peek_keyword("in") {
            return Err(SyntaxError::new(self.offset(), "expected 'in'"));
        }
        self.advance();
        let iterable = parse_expression(self)?;
        if parenthesized {
            expect(self, Token::RParen, "')'")?;
        }
        let body = self.parse_body()?;
        Ok(Node::For {
            binding,
            iterable,
            body,
        })
    }

    fn parse_let(&mut self) -> Result<Node, SyntaxError> {
        self.advance();
        let name = self.parse_name()?;
        expect(self, Token::Assign, "'='")?;
        let value = parse_expression(self)?;
        Ok(Node::Let { name, value })
    }

    fn parse_name(&mut self) -> Result<String, SyntaxError> {
        let offset = self.offset();
        match self.advance() {
            Some(Spanned {
                token: Token::Ident(name),
                ..
            }) => Ok(name),
            _ => Err(SyntaxError::new(offset, "expected a name")),
        }
    }
}

fn render_nodes(
    nodes: &[Node],
    scope: &mut Scope<'_>,
    output: &mut String,
) -> Result<(), Exception> {
    for node in nodes {
        match node {
            Node::Text(text) => output.push_str(text),
            Node::Output(expr) => output.push_str(&expression::display(&evaluate(expr, scope)?)),
            Node::Let { name, value } => {
                let value = evaluate(value, scope)?;
                scope.bind(name, value);
            }
            Node::If {
                branches,
                otherwise,
            } => {
                let mut chosen = otherwise.as_ref();
                for (condition, body) in branches {
                    if is_truthy(&evaluate(condition, scope)?) {
                        chosen = Some(body);
                        break;
                    }
                }
                if let Some(body) = chosen {
                    render_scoped(body, scope, output)?;
                }
            }
            Node::For {
                binding,
                iterable,
                body,
            } => {
                let items = match evaluate(iterable, scope)? {
                    Value::Array(items) => items,
                    other => {
                        return Err(Exception::TemplateRender(format!(
                            "cannot iterate over {}",
                            other
                        )))
                    }
                };
                for item in items {
                    scope.push();
                    scope.bind(binding, item);
                    let result = render_nodes(body, scope, output);
                    scope.pop();
                    result?;
                }
            }
        }
    }
    Ok(())
}

fn render_scoped(
    nodes: &[Node],
    scope: &mut Scope<'_>,
    output: &mut String,
) -> Result<(), Exception> {
    scope.push();
    let result = render_nodes(nodes, scope, output);
    scope.pop();
    result
}
