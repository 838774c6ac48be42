//! Expressions embedded in scripted markup and builder scripts.
//!
//! The grammar is deliberately small: literals, local and instance paths
//! (`user.name`, `@items.0`) and calls to a fixed set of builtins.

use serde_json::{Number, Value};

use crate::context::RenderContext;
use crate::error::{TemplateError, TemplateResult};
use crate::options::RenderOptions;
use crate::value::{escape_html, to_output};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Instance(String),
    Str(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    Comma,
    Dot,
    Colon,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub(crate) fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '"' | '\'' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string literal".to_string()),
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            let escaped = chars
                                .get(i + 1)
                                .ok_or_else(|| "unterminated string literal".to_string())?;
                            text.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => *other,
                            });
                            i += 2;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            '@' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                if end == start || !is_ident_start(chars[start]) {
                    return Err("expected an instance variable name after '@'".to_string());
                }
                tokens.push(Token::Instance(chars[start..end].iter().collect()));
                i = end;
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                // Path indexes (`items.0.name`) never carry a fraction
                let after_dot = matches!(tokens.last(), Some(Token::Dot));
                let is_float = !after_dot
                    && chars.get(i) == Some(&'.')
                    && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
                if is_float {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                if is_float {
                    let value = literal
                        .parse::<f64>()
                        .map_err(|e| format!("invalid number {}: {}", literal, e))?;
                    tokens.push(Token::Float(value));
                } else {
                    let value = literal
                        .parse::<i64>()
                        .map_err(|e| format!("invalid number {}: {}", literal, e))?;
                    tokens.push(Token::Int(value));
                }
            }
            c if is_ident_start(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character {:?}", other)),
        }
    }

    Ok(tokens)
}

/// One step of a value path.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PathSeg {
    Key(String),
    Index(usize),
}

/// Functions callable from templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    Render,
    Partial,
    Collection,
    Escape,
    Raise,
}

impl Builtin {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "render" => Some(Self::Render),
            "partial" => Some(Self::Partial),
            "collection" => Some(Self::Collection),
            "h" => Some(Self::Escape),
            "raise" => Some(Self::Raise),
            _ => None,
        }
    }

    fn arity(self) -> (usize, usize) {
        match self {
            Self::Render | Self::Escape | Self::Raise => (1, 1),
            Self::Partial => (1, 2),
            Self::Collection => (2, 3),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Local { name: String, path: Vec<PathSeg> },
    Instance { name: String, path: Vec<PathSeg> },
    Call { func: Builtin, args: Vec<Expr> },
}

/// Recursive-descent parser over a token stream.
pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub(crate) fn new(src: &str) -> Result<Self, String> {
        Ok(Self {
            tokens: tokenize(src)?,
            pos: 0,
        })
    }

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub(crate) fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn is_done(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub(crate) fn expect(&mut self, expected: &Token) -> Result<(), String> {
        match self.next_token() {
            Some(ref token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {:?}, found {:?}", expected, token)),
            None => Err(format!("expected {:?}, found end of input", expected)),
        }
    }

    pub(crate) fn expect_ident(&mut self) -> Result<String, String> {
        match self.next_token() {
            Some(Token::Ident(name)) => Ok(name),
            Some(token) => Err(format!("expected a name, found {:?}", token)),
            None => Err("expected a name, found end of input".to_string()),
        }
    }

    pub(crate) fn finish(&self) -> Result<(), String> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(format!("unexpected {:?} after expression", token)),
        }
    }

    pub(crate) fn parse_expr(&mut self) -> Result<Expr, String> {
        match self.next_token() {
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::from(n))),
            Some(Token::Float(f)) => Number::from_f64(f)
                .map(|n| Expr::Literal(Value::Number(n)))
                .ok_or_else(|| format!("invalid number {}", f)),
            Some(Token::Instance(name)) => {
                let path = self.parse_path()?;
                Ok(Expr::Instance { name, path })
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "nil" | "null" => Ok(Expr::Literal(Value::Null)),
                _ if self.peek() == Some(&Token::LParen) => self.parse_call(name),
                _ => {
                    let path = self.parse_path()?;
                    Ok(Expr::Local { name, path })
                }
            },
            Some(token) => Err(format!("unexpected {:?}", token)),
            None => Err("expected an expression".to_string()),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, String> {
        let func = Builtin::from_name(&name).ok_or_else(|| format!("undefined function `{}`", name))?;
        self.expect(&Token::LParen)?;

        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.next_token();
        } else {
            loop {
                args.push(self.parse_expr()?);
                match self.next_token() {
                    Some(Token::Comma) => continue,
                    Some(Token::RParen) => break,
                    Some(token) => return Err(format!("expected ',' or ')', found {:?}", token)),
                    None => return Err(format!("unclosed call to `{}`", name)),
                }
            }
        }

        let (min, max) = func.arity();
        if args.len() < min || args.len() > max {
            return Err(format!(
                "wrong number of arguments to `{}` (given {}, expected {})",
                name,
                args.len(),
                if min == max { min.to_string() } else { format!("{}..{}", min, max) }
            ));
        }
        Ok(Expr::Call { func, args })
    }

    fn parse_path(&mut self) -> Result<Vec<PathSeg>, String> {
        let mut path = Vec::new();
        while self.peek() == Some(&Token::Dot) {
            self.next_token();
            match self.next_token() {
                Some(Token::Ident(key)) => path.push(PathSeg::Key(key)),
                Some(Token::Int(index)) if index >= 0 => path.push(PathSeg::Index(index as usize)),
                Some(token) => return Err(format!("invalid path segment {:?}", token)),
                None => return Err("path ends with '.'".to_string()),
            }
        }
        Ok(path)
    }
}

/// Parse a complete expression.
pub(crate) fn parse_expression(src: &str) -> Result<Expr, String> {
    let mut parser = Parser::new(src)?;
    let expr = parser.parse_expr()?;
    parser.finish()?;
    Ok(expr)
}

fn walk(mut value: Value, path: &[PathSeg]) -> Value {
    for segment in path {
        value = match (value, segment) {
            (Value::Object(mut map), PathSeg::Key(key)) => map.remove(key).unwrap_or(Value::Null),
            (Value::Array(mut items), PathSeg::Index(index)) if *index < items.len() => {
                items.swap_remove(*index)
            }
            (Value::Array(items), PathSeg::Key(key)) if key == "length" => Value::from(items.len()),
            _ => Value::Null,
        };
    }
    value
}

fn text_arg(expr: &Expr, ctx: &mut dyn RenderContext) -> TemplateResult<String> {
    Ok(to_output(&expr.eval(ctx)?))
}

impl Expr {
    pub(crate) fn eval(&self, ctx: &mut dyn RenderContext) -> TemplateResult<Value> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Local { name, path } => {
                let value = ctx.local(name).ok_or_else(|| {
                    TemplateError::runtime(format!("undefined local variable `{}`", name))
                })?;
                Ok(walk(value, path))
            }
            Self::Instance { name, path } => {
                Ok(walk(ctx.instance(name).unwrap_or(Value::Null), path))
            }
            Self::Call { func, args } => self.call(*func, args, ctx),
        }
    }

    fn call(&self, func: Builtin, args: &[Expr], ctx: &mut dyn RenderContext) -> TemplateResult<Value> {
        match func {
            Builtin::Render => {
                let path = text_arg(&args[0], ctx)?;
                Ok(Value::String(ctx.render(RenderOptions::path(path))?))
            }
            Builtin::Partial => {
                let mut options = RenderOptions::partial(text_arg(&args[0], ctx)?);
                if let Some(object) = args.get(1) {
                    options = options.object(object.eval(ctx)?);
                }
                Ok(Value::String(ctx.render(options)?))
            }
            Builtin::Collection => {
                let name = text_arg(&args[0], ctx)?;
                let items = match args[1].eval(ctx)? {
                    Value::Array(items) => items,
                    Value::Null => Vec::new(),
                    other => {
                        return Err(TemplateError::runtime(format!(
                            "collection expects an array, got {}",
                            other
                        )))
                    }
                };
                let mut options = RenderOptions::collection(name, items);
                if let Some(spacer) = args.get(2) {
                    options = options.spacer(text_arg(spacer, ctx)?);
                }
                Ok(Value::String(ctx.render(options)?))
            }
            Builtin::Escape => Ok(Value::String(escape_html(&text_arg(&args[0], ctx)?))),
            Builtin::Raise => Err(TemplateError::runtime(text_arg(&args[0], ctx)?)),
        }
    }
}
