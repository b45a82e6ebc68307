//! SQL templates with explicit placeholder bindings.
//!
//! Templates use `%s` (next argument) and `%n$s` (n-th argument, 1-based)
//! placeholders; `%%` is a literal percent sign and any other `%` sequence
//! is copied through so `LIKE 'a%'` patterns need no escaping.
//!
//! # Invariants
//!
//! - Every placeholder position is covered by exactly one [`ParamBinding`]
//! - Every binding targets a position the template uses
//! - Used positions run `1..=n` without gaps
//!
//! All three are checked when a [`BoundTemplate`] is built, never at render time.

use crate::error::{ResolverError, ResolverResult};
use joty_protocol::ParamContext;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Arg(usize),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlTemplate {
    source: String,
    pieces: Vec<Piece>,
}

impl SqlTemplate {
    /// Parses a template.
    pub fn parse(source: &str) -> ResolverResult<Self> {
        let mut pieces = Vec::new();
        let mut text = String::new();
        let mut next_sequential = 0usize;
        let mut chars = source.char_indices().peekable();

        while let Some((_, c)) = chars.next() {
            if c != '%' {
                text.push(c);
                continue;
            }
            match chars.peek().map(|&(_, c)| c) {
                Some('%') => {
                    chars.next();
                    text.push('%');
                }
                Some('s') => {
                    chars.next();
                    flush(&mut text, &mut pieces);
                    pieces.push(Piece::Arg(next_sequential));
                    next_sequential += 1;
                }
                Some(d) if d.is_ascii_digit() => {
                    let mut digits = String::new();
                    let mut lookahead = chars.clone();
                    while let Some(&(_, d)) = lookahead.peek() {
                        if d.is_ascii_digit() {
                            digits.push(d);
                            lookahead.next();
                        } else {
                            break;
                        }
                    }
                    let is_positional = lookahead.next().map(|(_, c)| c) == Some('$')
                        && lookahead.next().map(|(_, c)| c) == Some('s');
                    if !is_positional {
                        text.push('%');
                        continue;
                    }
                    let position: usize = digits
                        .parse()
                        .map_err(|_| ResolverError::template(source, "placeholder index overflow"))?;
                    if position == 0 {
                        return Err(ResolverError::template(source, "placeholder %0$s"));
                    }
                    chars = lookahead;
                    flush(&mut text, &mut pieces);
                    pieces.push(Piece::Arg(position - 1));
                }
                _ => text.push('%'),
            }
        }
        flush(&mut text, &mut pieces);
        Ok(Self {
            source: source.to_string(),
            pieces,
        })
    }

    /// The template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 1-based positions referenced by the template.
    pub fn positions(&self) -> BTreeSet<usize> {
        self.pieces
            .iter()
            .filter_map(|p| match p {
                Piece::Arg(i) => Some(i + 1),
                Piece::Text(_) => None,
            })
            .collect()
    }

    /// Renders with positional arguments.
    pub fn render(&self, args: &[String]) -> ResolverResult<String> {
        let mut out = String::with_capacity(self.source.len());
        for piece in &self.pieces {
            match piece {
                Piece::Text(t) => out.push_str(t),
                Piece::Arg(i) => {
                    let value = args.get(*i).ok_or_else(|| {
                        ResolverError::template(
                            self.source.clone(),
                            format!("no argument for placeholder {}", i + 1),
                        )
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

fn flush(text: &mut String, pieces: &mut Vec<Piece>) {
    if !text.is_empty() {
        pieces.push(Piece::Text(std::mem::take(text)));
    }
}

/// Callback computing a value from the parameter context.
pub type ComputeFn = Arc<dyn Fn(&ParamContext) -> String + Send + Sync>;

/// Where a bound value comes from. Evaluated in field order: computed,
/// then context, then literal.
#[derive(Clone, Default)]
pub struct ValueSource {
    computed: Option<ComputeFn>,
    context: Option<String>,
    literal: Option<String>,
}

impl fmt::Debug for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueSource")
            .field("computed", &self.computed.is_some())
            .field("context", &self.context)
            .field("literal", &self.literal)
            .finish()
    }
}

/// One `(position, source)` pair.
#[derive(Debug, Clone)]
pub struct ParamBinding {
    /// 1-based placeholder position.
    pub position: usize,
    source: ValueSource,
}

impl ParamBinding {
    /// Binds a context parameter.
    pub fn context(position: usize, name: impl Into<String>) -> Self {
        Self {
            position,
            source: ValueSource {
                context: Some(name.into()),
                ..ValueSource::default()
            },
        }
    }

    /// Binds a computed value.
    pub fn computed(
        position: usize,
        f: impl Fn(&ParamContext) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            position,
            source: ValueSource {
                computed: Some(Arc::new(f)),
                ..ValueSource::default()
            },
        }
    }

    /// Binds a literal.
    pub fn literal(position: usize, value: impl Into<String>) -> Self {
        Self {
            position,
            source: ValueSource {
                literal: Some(value.into()),
                ..ValueSource::default()
            },
        }
    }

    /// Adds a literal used when the context parameter is absent.
    pub fn or_literal(mut self, value: impl Into<String>) -> Self {
        self.source.literal = Some(value.into());
        self
    }

    /// Evaluates the binding.
    ///
    /// An absent context parameter without a literal fallback yields the
    /// context's missing sentinel.
    pub fn evaluate(&self, ctx: &ParamContext) -> String {
        if let Some(f) = &self.source.computed {
            return f(ctx);
        }
        if let Some(name) = &self.source.context {
            match (ctx.lookup(name), &self.source.literal) {
                (Some(param), _) => return param.value.clone(),
                (None, Some(literal)) => return literal.clone(),
                (None, None) => return ctx.get(name),
            }
        }
        self.source.literal.clone().unwrap_or_default()
    }
}

/// A template plus validated bindings.
#[derive(Debug, Clone)]
pub struct BoundTemplate {
    template: SqlTemplate,
    bindings: Vec<ParamBinding>,
}

impl BoundTemplate {
    /// Builds and validates a bound template for the named statement.
    pub fn new(name: &str, template: &str, mut bindings: Vec<ParamBinding>) -> ResolverResult<Self> {
        let template = SqlTemplate::parse(template)?;
        let positions = template.positions();
        if let Some(gap) = (1..=positions.len()).find(|p| !positions.contains(p)) {
            return Err(ResolverError::binding(
                name,
                format!("positions must run 1..={} without gaps, {gap} is unused", positions.len()),
            ));
        }
        let mut bound = BTreeSet::new();
        for binding in &bindings {
            if !positions.contains(&binding.position) {
                return Err(ResolverError::binding(
                    name,
                    format!("binding for unused position {}", binding.position),
                ));
            }
            if !bound.insert(binding.position) {
                return Err(ResolverError::binding(
                    name,
                    format!("position {} bound twice", binding.position),
                ));
            }
        }
        if let Some(missing) = positions.difference(&bound).next() {
            return Err(ResolverError::binding(
                name,
                format!("position {missing} is not bound"),
            ));
        }
        bindings.sort_by_key(|b| b.position);
        Ok(Self { template, bindings })
    }

    /// The underlying template.
    pub fn template(&self) -> &SqlTemplate {
        &self.template
    }

    /// Whether the template has any placeholder.
    pub fn has_bindings(&self) -> bool {
        !self.bindings.is_empty()
    }

    /// Renders against a parameter context.
    pub fn render(&self, ctx: &ParamContext) -> ResolverResult<String> {
        let width = self.bindings.last().map_or(0, |b| b.position);
        let mut args = vec![String::new(); width];
        for binding in &self.bindings {
            args[binding.position - 1] = binding.evaluate(ctx);
        }
        self.template.render(&args)
    }
}
