//! Compiles scanned scripted markup into an executable node program.

use std::fmt;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use super::scanner::{generate_source, scan, Segment, TrimMode};
use crate::context::RenderContext;
use crate::error::{TemplateError, TemplateResult};
use crate::expr::{parse_expression, Expr, Parser, Token};
use crate::identity::{CacheKey, TemplateIdentity};
use crate::scope::Locals;
use crate::value::{is_truthy, to_output};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Output {
        expr: Expr,
        line: usize,
    },
    Eval {
        expr: Expr,
        line: usize,
    },
    Assign {
        name: String,
        expr: Expr,
        line: usize,
    },
    If {
        cond: Expr,
        then: Vec<Node>,
        otherwise: Vec<Node>,
        line: usize,
    },
    For {
        var: String,
        iter: Expr,
        body: Vec<Node>,
        line: usize,
    },
}

/// A block opened by `if` or `for` and not yet closed.
enum Block {
    If {
        cond: Expr,
        then: Vec<Node>,
        otherwise: Option<Vec<Node>>,
        line: usize,
    },
    For {
        var: String,
        iter: Expr,
        body: Vec<Node>,
        line: usize,
    },
}

impl Block {
    fn close(self) -> Node {
        match self {
            Block::If {
                cond,
                then,
                otherwise,
                line,
            } => Node::If {
                cond,
                then,
                otherwise: otherwise.unwrap_or_default(),
                line,
            },
            Block::For {
                var,
                iter,
                body,
                line,
            } => Node::For {
                var,
                iter,
                body,
                line,
            },
        }
    }
}

type BuildError = (String, usize);

fn current<'a>(stack: &'a mut [Block], root: &'a mut Vec<Node>) -> &'a mut Vec<Node> {
    match stack.last_mut() {
        None => root,
        Some(Block::If {
            then, otherwise, ..
        }) => match otherwise {
            Some(otherwise) => otherwise,
            None => then,
        },
        Some(Block::For { body, .. }) => body,
    }
}

fn parse_for(rest: &str) -> Result<(String, Expr), String> {
    let mut parser = Parser::new(rest)?;
    let var = parser.expect_ident()?;
    parser.expect(&Token::Ident("in".to_string()))?;
    let iter = parser.parse_expr()?;
    parser.finish()?;
    Ok((var, iter))
}

fn parse_assign(code: &str) -> Option<Result<(String, Expr), String>> {
    let (lhs, rhs) = code.strip_prefix('@')?.split_once('=')?;
    let name = lhs.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some(parse_expression(rhs).map(|expr| (name.to_string(), expr)))
}

fn build_statement(
    code: &str,
    line: usize,
    stack: &mut Vec<Block>,
    root: &mut Vec<Node>,
) -> Result<(), BuildError> {
    let fail = |message: String| (message, line);

    match code {
        "" => return Ok(()),
        "end" => {
            let block = stack
                .pop()
                .ok_or_else(|| fail("`end` without an open block".to_string()))?;
            current(stack, root).push(block.close());
            return Ok(());
        }
        "else" => {
            return match stack.last_mut() {
                Some(Block::If { otherwise, .. }) if otherwise.is_none() => {
                    *otherwise = Some(Vec::new());
                    Ok(())
                }
                _ => Err(fail("`else` without a matching `if`".to_string())),
            };
        }
        "if" | "for" => return Err(fail(format!("`{}` needs an expression", code))),
        _ => {}
    }

    if let Some(cond) = code.strip_prefix("if ") {
        let cond = parse_expression(cond).map_err(fail)?;
        stack.push(Block::If {
            cond,
            then: Vec::new(),
            otherwise: None,
            line,
        });
    } else if let Some(rest) = code.strip_prefix("for ") {
        let (var, iter) = parse_for(rest).map_err(fail)?;
        stack.push(Block::For {
            var,
            iter,
            body: Vec::new(),
            line,
        });
    } else if let Some(assign) = parse_assign(code) {
        let (name, expr) = assign.map_err(fail)?;
        current(stack, root).push(Node::Assign { name, expr, line });
    } else {
        let expr = parse_expression(code).map_err(fail)?;
        current(stack, root).push(Node::Eval { expr, line });
    }
    Ok(())
}

pub(crate) fn build_program(segments: &[Segment]) -> Result<Vec<Node>, BuildError> {
    let mut root = Vec::new();
    let mut stack = Vec::new();

    for segment in segments {
        match segment {
            Segment::Text(text) => current(&mut stack, &mut root).push(Node::Text(text.clone())),
            Segment::Output { code, line } => {
                let expr = parse_expression(code).map_err(|message| (message, *line))?;
                current(&mut stack, &mut root).push(Node::Output { expr, line: *line });
            }
            Segment::Code { code, line } => {
                for statement in code.lines() {
                    build_statement(statement.trim(), *line, &mut stack, &mut root)?;
                }
            }
        }
    }

    match stack.last() {
        None => Ok(root),
        Some(Block::If { line, .. }) => Err(("unclosed `if` block".to_string(), *line)),
        Some(Block::For { line, .. }) => Err(("unclosed `for` block".to_string(), *line)),
    }
}

fn execute(nodes: &[Node], ctx: &mut dyn RenderContext, out: &mut String) -> TemplateResult<()> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Output { expr, line } => {
                let value = expr.eval(ctx).map_err(|e| e.at_line(*line))?;
                out.push_str(&to_output(&value));
            }
            Node::Eval { expr, line } => {
                expr.eval(ctx).map_err(|e| e.at_line(*line))?;
            }
            Node::Assign { name, expr, line } => {
                let value = expr.eval(ctx).map_err(|e| e.at_line(*line))?;
                ctx.set_instance(name, value);
            }
            Node::If {
                cond,
                then,
                otherwise,
                line,
            } => {
                let value = cond.eval(ctx).map_err(|e| e.at_line(*line))?;
                if is_truthy(&value) {
                    execute(then, ctx, out)?;
                } else {
                    execute(otherwise, ctx, out)?;
                }
            }
            Node::For {
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
                    let result = execute(body, ctx, out);
                    ctx.restore(frame);
                    result?;
                }
            }
        }
    }
    Ok(())
}

/// The executable form of a scripted markup template.
pub struct CompiledUnit {
    name: String,
    key: CacheKey,
    identity: TemplateIdentity,
    serial: usize,
    source: String,
    generated_source: String,
    program: Vec<Node>,
    compiled_at: DateTime<Utc>,
}

impl CompiledUnit {
    /// Generated executable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn identity(&self) -> &TemplateIdentity {
        &self.identity
    }

    /// Registry sequence number; distinct for every compilation.
    pub fn serial(&self) -> usize {
        self.serial
    }

    /// Template text this unit was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Listing of the program this unit was compiled from.
    pub fn generated_source(&self) -> &str {
        &self.generated_source
    }

    pub fn compiled_at(&self) -> DateTime<Utc> {
        self.compiled_at
    }

    /// Run the unit against `ctx`, returning the rendered text.
    pub fn call(&self, ctx: &mut dyn RenderContext) -> TemplateResult<String> {
        let mut out = String::new();
        execute(&self.program, ctx, &mut out)?;
        Ok(out)
    }
}

impl fmt::Debug for CompiledUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledUnit")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("serial", &self.serial)
            .field("compiled_at", &self.compiled_at)
            .finish()
    }
}

/// Compiler for scripted markup.
pub struct ScriptedCompiler {
    trim_mode: String,
    trim: TrimMode,
    identifier_pattern: Regex,
}

impl ScriptedCompiler {
    /// Create a compiler using the given trim mode string.
    pub fn new(trim_mode: &str) -> Self {
        Self {
            trim_mode: trim_mode.to_string(),
            trim: TrimMode::parse(trim_mode),
            // Runs of characters that cannot appear in an identifier
            identifier_pattern: Regex::new(r"[^A-Za-z0-9_]+").unwrap(),
        }
    }

    pub fn trim_mode(&self) -> &str {
        &self.trim_mode
    }

    /// Executable name for a template identity.
    pub fn executable_name(&self, identity: &TemplateIdentity) -> String {
        match identity {
            TemplateIdentity::Path(path) => {
                let raw = path.to_string_lossy();
                let sanitized = self.identifier_pattern.replace_all(&raw, "_");
                format!("_run_scripted_{}", sanitized.trim_matches('_'))
            }
            TemplateIdentity::Inline(sequence) => format!("_run_scripted_inline_{}", sequence),
        }
    }

    /// Compile `source` into a unit registered under `key`.
    pub fn compile(
        &self,
        source: &str,
        key: CacheKey,
        identity: TemplateIdentity,
        serial: usize,
    ) -> TemplateResult<CompiledUnit> {
        let name = self.executable_name(&identity);

        let segments = scan(source, self.trim).map_err(|err| TemplateError::Compile {
            key: key.to_string(),
            message: err.message,
            line: Some(err.line),
            generated_source: generate_source(&name, &err.partial),
        })?;
        let generated_source = generate_source(&name, &segments);

        let program = build_program(&segments).map_err(|(message, line)| TemplateError::Compile {
            key: key.to_string(),
            message,
            line: Some(line),
            generated_source: generated_source.clone(),
        })?;

        Ok(CompiledUnit {
            name,
            key,
            identity,
            serial,
            source: source.to_string(),
            generated_source,
            program,
            compiled_at: Utc::now(),
        })
    }
}

impl fmt::Debug for ScriptedCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedCompiler")
            .field("trim_mode", &self.trim_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::RenderOptions;
    use crate::scope::{SavedFrame, Scope};
    use serde_json::json;
    use std::path::PathBuf;

    /// Scope-backed context without nested rendering.
    struct TestContext {
        scope: Scope,
    }

    impl TestContext {
        fn with(pairs: &[(&str, Value)]) -> Self {
            let mut scope = Scope::new();
            let frame = scope.bind(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect());
            std::mem::forget(frame);
            Self { scope }
        }
    }

    impl RenderContext for TestContext {
        fn local(&self, name: &str) -> Option<Value> {
            self.scope.local(name)
        }
        fn instance(&self, name: &str) -> Option<Value> {
            self.scope.instance(name).cloned()
        }
        fn set_instance(&mut self, name: &str, value: Value) {
            self.scope.set_instance(name, value);
        }
        fn bind(&mut self, locals: Locals) -> SavedFrame {
            self.scope.bind(locals)
        }
        fn restore(&mut self, frame: SavedFrame) {
            self.scope.restore(frame);
        }
        fn render(&mut self, options: RenderOptions) -> TemplateResult<String> {
            Err(TemplateError::runtime(format!("no nested renders: {:?}", options)))
        }
    }

    fn compile(source: &str) -> TemplateResult<CompiledUnit> {
        ScriptedCompiler::new("-").compile(
            source,
            CacheKey::Inline(source.to_string()),
            TemplateIdentity::Inline(1),
            1,
        )
    }

    #[test]
    fn test_render_output_and_conditionals() {
        let unit = compile("Hi <%= user.name %>!<% if admin %> (admin)<% else %> (guest)<% end %>").unwrap();
        let mut ctx = TestContext::with(&[("user", json!({"name": "Ann"})), ("admin", json!(false))]);
        assert_eq!(unit.call(&mut ctx).unwrap(), "Hi Ann! (guest)");
    }

    #[test]
    fn test_for_loop_binds_and_restores() {
        let unit = compile("<% for item in items %><%= item_index %>:<%= item %> <% end %>").unwrap();
        let mut ctx = TestContext::with(&[("items", json!(["a", "b"])), ("item", json!("outer"))]);
        assert_eq!(unit.call(&mut ctx).unwrap(), "0:a 1:b ");
        assert_eq!(ctx.scope.local("item"), Some(json!("outer")));
        assert_eq!(ctx.scope.depth(), 1);
    }

    #[test]
    fn test_for_loop_restores_on_failure() {
        let unit = compile("<% for item in items %><%= raise(\"stop\") %><% end %>").unwrap();
        let mut ctx = TestContext::with(&[("items", json!([1]))]);
        let err = unit.call(&mut ctx).unwrap_err();
        assert_eq!(err.line(), Some(1));
        assert_eq!(ctx.scope.depth(), 1);
        assert_eq!(ctx.scope.local("item"), Some(Value::Null));
    }

    #[test]
    fn test_instance_assignment() {
        let unit = compile("<% @title = \"Posts\" %><%= @title %>").unwrap();
        let mut ctx = TestContext::with(&[]);
        assert_eq!(unit.call(&mut ctx).unwrap(), "Posts");
        assert_eq!(ctx.scope.instance("title"), Some(&json!("Posts")));
    }

    #[test]
    fn test_undefined_local_reports_line() {
        let unit = compile("a\nb <%= missing %>").unwrap();
        let err = unit.call(&mut TestContext::with(&[])).unwrap_err();
        assert!(err.to_string().contains("undefined local variable `missing`"));
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn test_compile_error_carries_generated_source() {
        let err = compile("<% if a %>open").unwrap_err();
        match err {
            TemplateError::Compile {
                message,
                generated_source,
                line,
                ..
            } => {
                assert!(message.contains("unclosed `if`"));
                assert!(generated_source.contains("if a"));
                assert_eq!(line, Some(1));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(compile("<% end %>").is_err());
        assert!(compile("<% else %>").is_err());
        assert!(compile("<%= nope(1) %>").is_err());
    }

    #[test]
    fn test_executable_name() {
        let compiler = ScriptedCompiler::new("-");
        let path = TemplateIdentity::Path(PathBuf::from("/app/views/posts/show.erb"));
        assert_eq!(compiler.executable_name(&path), "_run_scripted_app_views_posts_show_erb");
        assert_eq!(
            compiler.executable_name(&TemplateIdentity::Inline(7)),
            "_run_scripted_inline_7"
        );
    }
}
