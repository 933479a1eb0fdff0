//! The recursive renderer.
//!
//! # Passes
//!
//! Rendering runs up to [`MAX_PASSES`] passes over the text.  Each pass:
//!
//! 1. masks code spans that substitutions introduced (the first pass also
//!    strips comments, once, after masking);
//! 2. parses the text into nodes;
//! 3. registers every definition in source order and removes it from the
//!    text;
//! 4. expands slots right-to-left so earlier offsets stay valid.
//!
//! A pass that changes nothing ends the loop.  Slots still present after the
//! last pass (self-referencing variables, unknown names) stay verbatim.
//! Placeholders are restored once, at the end.

use std::collections::HashMap;
use std::ops::Range;

use futures::future::BoxFuture;
use tracing::{debug, trace};

use crate::error::Result;

use super::builtins;
use super::comment::strip_comments;
use super::context::{Attachment, RenderContext};
use super::expr::{eval_expr, Scope};
use super::grammar::{self, Node, Param, SlotMatch};
use super::mask::Masker;
use super::registry::FunctionRegistry;
use super::symbols::VariableDef;
use super::value::{format_number, Value};

/// Upper bound on expansion passes.
pub const MAX_PASSES: usize = 5;

/// What [`Engine::render`] produces.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutput {
    Text(String),
    /// Slot matches of the preprocessed template; nothing is substituted.
    Matches(Vec<SlotMatch>),
}

impl RenderOutput {
    pub fn into_text(self) -> Option<String> {
        match self {
            RenderOutput::Text(t) => Some(t),
            RenderOutput::Matches(_) => None,
        }
    }

    pub fn into_matches(self) -> Option<Vec<SlotMatch>> {
        match self {
            RenderOutput::Matches(m) => Some(m),
            RenderOutput::Text(_) => None,
        }
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Owns the function registry; renders any number of templates.
#[derive(Debug, Clone)]
pub struct Engine {
    functions: FunctionRegistry,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine with `load`, `loadDir` and `img` registered.
    pub fn new() -> Self {
        let mut functions = FunctionRegistry::new();
        builtins::register_all(&mut functions);
        Self { functions }
    }

    /// An engine with no functions at all.
    pub fn empty() -> Self {
        Self {
            functions: FunctionRegistry::new(),
        }
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn register_function<F>(&mut self, name: &str, params: &[&str], f: F) -> Result<()>
    where
        F: Fn(&mut RenderContext, Vec<Value>) -> Result<String> + Send + Sync + 'static,
    {
        self.functions.register(name, params, f)
    }

    pub fn register_async_function<F>(&mut self, name: &str, params: &[&str], f: F) -> Result<()>
    where
        F: for<'a> Fn(&'a mut RenderContext, Vec<Value>) -> BoxFuture<'a, Result<String>>
            + Send
            + Sync
            + 'static,
    {
        self.functions.register_async(name, params, f)
    }

    /// Remove a function.  Absent names are ignored.
    pub fn unregister_function(&mut self, name: &str) {
        if !self.functions.unregister(name) {
            trace!(name, "unregister: no such function");
        }
    }

    /// Render `text` with a fresh default context.
    pub async fn render_str(&self, text: &str) -> Result<String> {
        let mut ctx = RenderContext::default();
        Ok(self.render(text, &mut ctx).await?.into_text().unwrap_or_default())
    }

    /// Render `text`.  Definitions land in `ctx.variables` and attachments in
    /// `ctx.attachments`.
    pub async fn render(&self, text: &str, ctx: &mut RenderContext) -> Result<RenderOutput> {
        let mut masker = Masker::new();
        let mut text = strip_comments(&masker.mask(text));

        if ctx.options.return_parser_matches {
            return Ok(RenderOutput::Matches(grammar::parse_matches(&text)?));
        }

        for pass in 1..=MAX_PASSES {
            if pass > 1 {
                text = masker.mask(&text);
            }
            let changed = self.run_pass(pass, &mut text, ctx, &mut masker).await?;
            debug!(pass, changed, len = text.len(), "render pass");
            if !changed {
                break;
            }
        }
        Ok(RenderOutput::Text(masker.unmask(&text)))
    }

    async fn run_pass(
        &self,
        pass: usize,
        text: &mut String,
        ctx: &mut RenderContext,
        masker: &mut Masker,
    ) -> Result<bool> {
        let nodes = grammar::parse(text)?;
        let mut edits: Vec<(Range<usize>, String)> = Vec::new();
        let mut slots = Vec::new();

        for node in nodes {
            match node {
                Node::Define { def, span, .. } => {
                    // After the first pass every definition came out of an
                    // expansion; the same body expanded again is not a
                    // redefinition.
                    if pass > 1 && ctx.variables.get(&def.name) == Some(&def) {
                        trace!(name = %def.name, "already defined by an earlier expansion");
                    } else {
                        trace!(name = %def.name, raw = def.is_raw, "define");
                        ctx.variables.define(def, &self.functions)?;
                    }
                    edits.push((span, String::new()));
                }
                Node::Slot(slot) => slots.push(slot),
                Node::Text(_) => {}
            }
        }

        // Attachments of each function slot, collected right-to-left.
        let mut produced: Vec<Vec<Attachment>> = Vec::new();
        for slot in slots.iter().rev() {
            if let Some(replacement) = self.expand_slot(slot, ctx, masker, &mut produced).await? {
                trace!(slot = %slot.name, offset = slot.offset, "substitute");
                edits.push((slot.span(), replacement));
            }
        }
        for batch in produced.into_iter().rev() {
            ctx.attachments.extend(batch);
        }

        if edits.is_empty() {
            return Ok(false);
        }
        apply_edits(text, edits);
        Ok(true)
    }

    /// Replacement text for one slot; `None` leaves it verbatim.
    async fn expand_slot(
        &self,
        slot: &SlotMatch,
        ctx: &mut RenderContext,
        masker: &mut Masker,
        produced: &mut Vec<Vec<Attachment>>,
    ) -> Result<Option<String>> {
        if let Some(expr) = &slot.expr {
            let names = expr.names();
            if let Some(missing) = names.iter().find(|n| ctx.variables.lookup(n).is_none()) {
                trace!(expr = %slot.name, name = %missing, "unbound name; left verbatim");
                return Ok(None);
            }
            let n = eval_expr(expr, &ctx.variables)?;
            return Ok(Some(format_number(n)));
        }

        if let Some(def) = ctx.variables.get(&slot.name) {
            let expanded = expand_variable(def, &slot.params, masker)?;
            let raw = def.is_raw || slot.raw_requested;
            return Ok(Some(if raw { masker.protect(&expanded) } else { expanded }));
        }

        if let Some(function) = self.functions.get(&slot.name) {
            // Arguments carry the original bytes of any code span, not placeholders.
            let args = function
                .arrange(&slot.params)
                .into_iter()
                .map(|v| match v {
                    Value::Str(s) => Value::Str(masker.unmask(&s)),
                    v => v,
                })
                .collect();
            let saved = std::mem::take(&mut ctx.attachments);
            let result = function.call(ctx, args).await;
            let batch = std::mem::replace(&mut ctx.attachments, saved);
            let out = result?;
            produced.push(batch);
            return Ok(Some(if slot.raw_requested { masker.protect(&out) } else { out }));
        }

        trace!(slot = %slot.name, "unresolved; left verbatim");
        Ok(None)
    }
}

// ── Variable expansion ────────────────────────────────────────────────────────

/// Bind `args` and substitute the bound values into `def`'s content.
fn expand_variable(def: &VariableDef, args: &[Param], masker: &mut Masker) -> Result<String> {
    let bindings = def.bind(args)?;
    if def.is_raw {
        return Ok(def.content.clone());
    }
    substitute(&def.content, &bindings, masker)
}

/// Replace references to bound parameters in `content`.
///
/// * `{{p}}` becomes the value (`{{@p}}` the protected value);
/// * arithmetic slots whose names are all bound are evaluated;
/// * string arguments of call slots are substituted recursively;
/// * bodies of nested definitions are substituted, minus the names those
///   definitions declare themselves.
fn substitute(
    content: &str,
    bindings: &HashMap<String, Value>,
    masker: &mut Masker,
) -> Result<String> {
    if bindings.is_empty() {
        return Ok(content.to_owned());
    }
    let mut edits: Vec<(Range<usize>, String)> = Vec::new();

    for node in grammar::parse(content)? {
        match node {
            Node::Text(_) => {}
            Node::Slot(slot) => {
                if let Some(expr) = &slot.expr {
                    if expr.names().iter().all(|n| bindings.contains_key(n)) {
                        let n = eval_expr(expr, bindings)?;
                        edits.push((slot.span(), format_number(n)));
                    }
                } else if slot.params.is_empty() {
                    if let Some(value) = bindings.get(&slot.name) {
                        let text = value.to_string();
                        let text = if slot.raw_requested { masker.protect(&text) } else { text };
                        edits.push((slot.span(), text));
                    }
                } else if let Some(rewritten) = substitute_args(&slot, bindings, masker)? {
                    edits.push((slot.span(), rewritten));
                }
            }
            Node::Define { def, body: Some(body), .. } if !def.is_raw => {
                let inner: HashMap<String, Value> = bindings
                    .iter()
                    .filter(|(k, _)| !def.has_param(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let text = substitute(&content[body.clone()], &inner, masker)?;
                if text != content[body.clone()] {
                    edits.push((body, text));
                }
            }
            Node::Define { .. } => {}
        }
    }

    let mut out = content.to_owned();
    apply_edits(&mut out, edits);
    Ok(out)
}

/// Substitute inside the string arguments of a call slot.  Returns the
/// re-serialized slot when anything changed.
fn substitute_args(
    slot: &SlotMatch,
    bindings: &HashMap<String, Value>,
    masker: &mut Masker,
) -> Result<Option<String>> {
    let mut changed = false;
    let mut params = Vec::with_capacity(slot.params.len());
    for p in &slot.params {
        let value = match &p.value {
            Value::Str(s) if s.contains("{{") => {
                let v = substitute(s, bindings, masker)?;
                changed |= &v != s;
                Value::Str(v)
            }
            v => v.clone(),
        };
        params.push(Param { name: p.name.clone(), value });
    }
    if !changed {
        return Ok(None);
    }
    let rewritten = SlotMatch {
        params,
        ..slot.clone()
    };
    Ok(Some(rewritten.to_source()))
}

/// Apply non-overlapping edits, last offset first.
fn apply_edits(text: &mut String, mut edits: Vec<(Range<usize>, String)>) {
    edits.sort_by(|a, b| b.0.start.cmp(&a.0.start));
    for (range, replacement) in edits {
        text.replace_range(range, &replacement);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
