//! Structured builder templates: a line-oriented markup building script.
//!
//! ```text
//! instruct!
//! people do
//!   each person in people do
//!     person(id: person.id) person.name
//!   end
//! end
//! ```
//!
//! Scripts are parsed and evaluated against a fresh [`XmlMarkup`] on every
//! render; nothing is cached.

use serde_json::Value;

use crate::context::RenderContext;
use crate::error::{TemplateError, TemplateResult};
use crate::expr::{parse_expression, Expr, Parser, Token};
use crate::scope::Locals;
use crate::value::{escape_html, to_output};

/// Markup writer with optional indentation.
#[derive(Debug, Default)]
pub struct XmlMarkup {
    out: String,
    indent: usize,
    level: usize,
}

impl XmlMarkup {
    pub fn new(indent: usize) -> Self {
        Self {
            out: String::new(),
            indent,
            level: 0,
        }
    }

    fn pad(&mut self) {
        if self.indent > 0 {
            self.out.push_str(&" ".repeat(self.indent * self.level));
        }
    }

    fn newline(&mut self) {
        if self.indent > 0 {
            self.out.push('\n');
        }
    }

    fn write_attrs(&mut self, attrs: &[(String, String)]) {
        for (name, value) in attrs {
            self.out.push_str(&format!(" {}=\"{}\"", name, escape_html(value)));
        }
    }

    pub fn instruct(&mut self) {
        self.pad();
        self.out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
        self.newline();
    }

    pub fn comment(&mut self, text: &str) {
        self.pad();
        self.out.push_str(&format!("<!-- {} -->", text));
        self.newline();
    }

    pub fn text(&mut self, text: &str) {
        self.pad();
        self.out.push_str(&escape_html(text));
        self.newline();
    }

    pub fn cdata(&mut self, text: &str) {
        self.pad();
        self.out.push_str(&format!("<![CDATA[{}]]>", text));
        self.newline();
    }

    /// Element with text content, or self-closing when `content` is `None`.
    pub fn leaf(&mut self, name: &str, attrs: &[(String, String)], content: Option<&str>) {
        self.pad();
        self.out.push('<');
        self.out.push_str(name);
        self.write_attrs(attrs);
        match content {
            Some(text) => self.out.push_str(&format!(">{}</{}>", escape_html(text), name)),
            None => self.out.push_str("/>"),
        }
        self.newline();
    }

    pub fn open(&mut self, name: &str, attrs: &[(String, String)]) {
        self.pad();
        self.out.push('<');
        self.out.push_str(name);
        self.write_attrs(attrs);
        self.out.push('>');
        self.newline();
        self.level += 1;
    }

    pub fn close(&mut self, name: &str) {
        self.level = self.level.saturating_sub(1);
        self.pad();
        self.out.push_str(&format!("</{}>", name));
        self.newline();
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Stmt {
    Instruct,
    Comment(Expr, usize),
    Text(Expr, usize),
    Cdata(Expr, usize),
    Element {
        name: String,
        attrs: Vec<(String, Expr)>,
        content: Option<Expr>,
        children: Option<Vec<Stmt>>,
        line: usize,
    },
    Each {
        var: String,
        iter: Expr,
        body: Vec<Stmt>,
        line: usize,
    },
}

enum Open {
    Element {
        name: String,
        attrs: Vec<(String, Expr)>,
        children: Vec<Stmt>,
        line: usize,
    },
    Each {
        var: String,
        iter: Expr,
        body: Vec<Stmt>,
        line: usize,
    },
}

impl Open {
    fn line(&self) -> usize {
        match self {
            Open::Element { line, .. } | Open::Each { line, .. } => *line,
        }
    }

    fn close(self) -> Stmt {
        match self {
            Open::Element {
                name,
                attrs,
                children,
                line,
            } => Stmt::Element {
                name,
                attrs,
                content: None,
                children: Some(children),
                line,
            },
            Open::Each {
                var,
                iter,
                body,
                line,
            } => Stmt::Each {
                var,
                iter,
                body,
                line,
            },
        }
    }
}

fn current<'a>(stack: &'a mut [Open], root: &'a mut Vec<Stmt>) -> &'a mut Vec<Stmt> {
    match stack.last_mut() {
        None => root,
        Some(Open::Element { children, .. }) => children,
        Some(Open::Each { body, .. }) => body,
    }
}

/// Split a trailing `do` off a statement.
fn split_do(text: &str) -> (&str, bool) {
    match text.strip_suffix("do") {
        Some(head) if head.ends_with(char::is_whitespace) || head.ends_with(')') => {
            (head.trim_end(), true)
        }
        _ => (text, false),
    }
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(keyword)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

fn parse_element(text: &str) -> Result<(String, Vec<(String, Expr)>, Option<Expr>), String> {
    let name_len = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':')))
        .unwrap_or(text.len());
    let name = &text[..name_len];
    if !name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        return Err(format!("expected an element name, found {:?}", text));
    }

    let mut parser = Parser::new(&text[name_len..])?;
    let mut attrs = Vec::new();
    if parser.peek() == Some(&Token::LParen) {
        parser.next_token();
        loop {
            let attr = match parser.next_token() {
                Some(Token::RParen) => break,
                Some(Token::Ident(attr)) | Some(Token::Str(attr)) => attr,
                Some(token) => return Err(format!("expected an attribute name, found {:?}", token)),
                None => return Err(format!("unclosed attribute list on `{}`", name)),
            };
            parser.expect(&Token::Colon)?;
            attrs.push((attr, parser.parse_expr()?));
            match parser.next_token() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                Some(token) => return Err(format!("expected ',' or ')', found {:?}", token)),
                None => return Err(format!("unclosed attribute list on `{}`", name)),
            }
        }
    }

    let content = if parser.is_done() {
        None
    } else {
        Some(parser.parse_expr()?)
    };
    parser.finish()?;
    Ok((name.to_string(), attrs, content))
}

fn parse_each(text: &str) -> Result<(String, Expr), String> {
    let mut parser = Parser::new(text)?;
    let var = parser.expect_ident()?;
    parser.expect(&Token::Ident("in".to_string()))?;
    let iter = parser.parse_expr()?;
    parser.finish()?;
    Ok((var, iter))
}

fn parse_script(source: &str) -> TemplateResult<Vec<Stmt>> {
    let mut root = Vec::new();
    let mut stack: Vec<Open> = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let syntax = |message: String| TemplateError::Syntax { line, message };
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        if text == "end" {
            let open = stack
                .pop()
                .ok_or_else(|| syntax("`end` without an open block".to_string()))?;
            current(&mut stack, &mut root).push(open.close());
            continue;
        }

        let (body, opens_block) = split_do(text);
        let inline_only = |stmt: Stmt| {
            if opens_block {
                Err(syntax(format!("`{}` cannot open a block", body)))
            } else {
                Ok(stmt)
            }
        };

        let stmt = if body == "instruct!" {
            Some(inline_only(Stmt::Instruct)?)
        } else if let Some(rest) = strip_keyword(body, "comment!") {
            Some(inline_only(Stmt::Comment(parse_expression(rest).map_err(syntax)?, line))?)
        } else if let Some(rest) = strip_keyword(body, "text!") {
            Some(inline_only(Stmt::Text(parse_expression(rest).map_err(syntax)?, line))?)
        } else if let Some(rest) = strip_keyword(body, "cdata!") {
            Some(inline_only(Stmt::Cdata(parse_expression(rest).map_err(syntax)?, line))?)
        } else if let Some(rest) = strip_keyword(body, "each") {
            if !opens_block {
                return Err(syntax("`each` needs a `do` block".to_string()));
            }
            let (var, iter) = parse_each(rest).map_err(syntax)?;
            stack.push(Open::Each {
                var,
                iter,
                body: Vec::new(),
                line,
            });
            None
        } else {
            let (name, attrs, content) = parse_element(body).map_err(syntax)?;
            if opens_block {
                if content.is_some() {
                    return Err(syntax(format!("`{}` has both content and a block", name)));
                }
                stack.push(Open::Element {
                    name,
                    attrs,
                    children: Vec::new(),
                    line,
                });
                None
            } else {
                Some(Stmt::Element {
                    name,
                    attrs,
                    content,
                    children: None,
                    line,
                })
            }
        };

        if let Some(stmt) = stmt {
            current(&mut stack, &mut root).push(stmt);
        }
    }

    match stack.last() {
        None => Ok(root),
        Some(open) => Err(TemplateError::Syntax {
            line: open.line(),
            message: "block is never closed with `end`".to_string(),
        }),
    }
}

fn eval_text(expr: &Expr, line: usize, ctx: &mut dyn RenderContext) -> TemplateResult<String> {
    let value = expr.eval(ctx).map_err(|e| e.at_line(line))?;
    Ok(to_output(&value))
}

fn run(stmts: &[Stmt], ctx: &mut dyn RenderContext, xml: &mut XmlMarkup) -> TemplateResult<()> {
    for stmt in stmts {
        match stmt {
            Stmt::Instruct => xml.instruct(),
            Stmt::Comment(expr, line) => xml.comment(&eval_text(expr, *line, ctx)?),
            Stmt::Text(expr, line) => xml.text(&eval_text(expr, *line, ctx)?),
            Stmt::Cdata(expr, line) => xml.cdata(&eval_text(expr, *line, ctx)?),
            Stmt::Element {
                name,
                attrs,
                content,
                children,
                line,
            } => {
                let mut values = Vec::with_capacity(attrs.len());
                for (attr, expr) in attrs {
                    values.push((attr.clone(), eval_text(expr, *line, ctx)?));
                }
                match (children, content) {
                    (Some(children), _) => {
                        xml.open(name, &values);
                        run(children, ctx, xml)?;
                        xml.close(name);
                    }
                    (None, Some(content)) => {
                        let text = eval_text(content, *line, ctx)?;
                        xml.leaf(name, &values, Some(&text));
                    }
                    (None, None) => xml.leaf(name, &values, None),
                }
            }
            Stmt::Each {
                var,
                iter,
                body,
                line,
            } => {
                let items = match iter.eval(ctx).map_err(|e| e.at_line(*line))? {
                    Value::Array(items) => items,
                    Value::Null => Vec::new(),
                    other => {
                        return Err(TemplateError::runtime(format!("cannot iterate over {}", other))
                            .at_line(*line))
                    }
                };
                for (index, item) in items.into_iter().enumerate() {
                    let mut locals = Locals::new();
                    locals.insert(var.clone(), item);
                    locals.insert(format!("{}_index", var), Value::from(index));

                    let frame = ctx.bind(locals);
                    let result = run(body, ctx, xml);
                    ctx.restore(frame);
                    result?;
                }
            }
        }
    }
    Ok(())
}

/// Parse and evaluate a builder script against a fresh markup writer.
pub fn evaluate(source: &str, ctx: &mut dyn RenderContext, indent: usize) -> TemplateResult<String> {
    let script = parse_script(source)?;
    let mut xml = XmlMarkup::new(indent);
    run(&script, ctx, &mut xml)?;
    Ok(xml.finish())
}
