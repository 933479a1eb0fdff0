//! Variable definitions and the per-render symbol table.

use std::collections::HashMap;

use tracing::warn;

use crate::error::{Error, Result};

use super::expr::Scope;
use super::grammar::Param;
use super::registry::FunctionRegistry;
use super::value::Value;

// ── VariableDef ───────────────────────────────────────────────────────────────

/// A named, optionally parameterised body of template text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VariableDef {
    pub name: String,
    /// Bound positionally, in order.
    pub required_params: Vec<String>,
    /// Bound by name or by the positional arguments left over.
    pub optional_params: Vec<(String, Value)>,
    pub content: String,
    /// Substituted without being parsed again.
    pub is_raw: bool,
}

impl VariableDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    /// A parameterless variable holding `content`.
    pub fn simple(name: &str, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::new(name)
        }
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.required_params.iter().any(|p| p == name)
            || self.optional_params.iter().any(|(p, _)| p == name)
    }

    /// Bind slot arguments to this variable's parameters.
    ///
    /// Required parameters take positional arguments in order, falling back
    /// to a named argument of the same name.  Optional parameters take a
    /// named argument, then any positional argument left over, then their
    /// default.  Unknown names and surplus positionals are ignored.
    pub fn bind(&self, args: &[Param]) -> Result<HashMap<String, Value>> {
        let mut positional = args
            .iter()
            .filter(|a| a.name.is_none())
            .map(|a| &a.value);
        let named = |n: &str| {
            args.iter()
                .rev()
                .find(|a| a.name.as_deref() == Some(n))
                .map(|a| &a.value)
        };

        let mut bound = HashMap::new();
        for param in &self.required_params {
            let value = positional
                .next()
                .or_else(|| named(param))
                .ok_or_else(|| Error::MissingParam {
                    name: self.name.clone(),
                    param: param.clone(),
                })?;
            bound.insert(param.clone(), value.clone());
        }
        for (param, default) in &self.optional_params {
            let value = match named(param) {
                Some(v) => v,
                None => positional.next().unwrap_or(default),
            };
            bound.insert(param.clone(), value.clone());
        }

        for name in args.iter().filter_map(|a| a.name.as_deref()) {
            if !self.has_param(name) {
                warn!(variable = %self.name, param = name, "ignoring unknown named argument");
            }
        }
        let surplus = positional.count();
        if surplus > 0 {
            warn!(variable = %self.name, surplus, "ignoring extra positional arguments");
        }
        Ok(bound)
    }

    /// Numeric value of a parameterless, non-raw variable.
    pub fn numeric_value(&self) -> Option<f64> {
        if self.is_raw || !self.required_params.is_empty() {
            return None;
        }
        Value::Str(self.content.trim().to_owned()).as_number()
    }
}

// ── SymbolTable ───────────────────────────────────────────────────────────────

/// Variables defined during one render.  Names are write-once.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    vars: HashMap<String, VariableDef>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `def`, rejecting redefinitions and names owned by a function.
    pub fn define(&mut self, def: VariableDef, functions: &FunctionRegistry) -> Result<()> {
        if self.vars.contains_key(&def.name) {
            return Err(Error::NameConflict(def.name));
        }
        if functions.contains(&def.name) {
            return Err(Error::FunctionConflict(def.name));
        }
        self.vars.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&VariableDef> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Defined names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.vars.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Top-level arithmetic sees parameterless variables with numeric content.
impl Scope for SymbolTable {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name)?.numeric_value().map(Value::Num)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn def() -> VariableDef {
        VariableDef {
            name: "card".into(),
            required_params: vec!["title".into(), "body".into()],
            optional_params: vec![
                ("size".into(), Value::Str("m".into())),
                ("tone".into(), Value::Str("plain".into())),
            ],
            content: String::new(),
            is_raw: false,
        }
    }

    #[test]
    fn positional_binding() {
        let b = def()
            .bind(&[Param::positional("T"), Param::positional("B"), Param::positional("l")])
            .unwrap();
        assert_eq!(b["title"], Value::Str("T".into()));
        assert_eq!(b["body"], Value::Str("B".into()));
        assert_eq!(b["size"], Value::Str("l".into()));
        assert_eq!(b["tone"], Value::Str("plain".into()));
    }

    #[test]
    fn named_overrides_default() {
        let b = def()
            .bind(&[
                Param::positional("T"),
                Param::positional("B"),
                Param::named("tone", "loud"),
            ])
            .unwrap();
        assert_eq!(b["size"], Value::Str("m".into()));
        assert_eq!(b["tone"], Value::Str("loud".into()));
    }

    #[test]
    fn named_argument_fills_required() {
        let b = def()
            .bind(&[Param::positional("T"), Param::named("body", "B")])
            .unwrap();
        assert_eq!(b["body"], Value::Str("B".into()));
    }

    #[test]
    fn missing_required() {
        let err = def().bind(&[Param::positional("T")]).unwrap_err();
        assert_eq!(err.to_string(), "Required param for `card` not found: `body`");
    }

    #[test]
    fn unknown_and_surplus_arguments_ignored() {
        let d = VariableDef::new("v");
        let b = d
            .bind(&[Param::positional(1i64), Param::named("nope", "x")])
            .unwrap();
        assert!(b.is_empty());
    }

    #[test]
    fn define_rejects_duplicates_and_function_names() {
        let mut functions = FunctionRegistry::new();
        functions
            .register("shout", &["text"], |_, _| Ok(String::new()))
            .unwrap();
        let mut table = SymbolTable::new();
        table.define(VariableDef::simple("a", "1"), &functions).unwrap();
        assert!(matches!(
            table.define(VariableDef::simple("a", "2"), &functions),
            Err(Error::NameConflict(n)) if n == "a"
        ));
        assert!(matches!(
            table.define(VariableDef::simple("shout", "x"), &functions),
            Err(Error::FunctionConflict(n)) if n == "shout"
        ));
        assert_eq!(table.get("a").map(|d| d.content.as_str()), Some("1"));
        assert_eq!(table.names(), vec!["a"]);
    }

    #[test]
    fn scope_sees_numeric_parameterless_variables() {
        let functions = FunctionRegistry::new();
        let mut table = SymbolTable::new();
        table.define(VariableDef::simple("n", " 4 "), &functions).unwrap();
        table.define(VariableDef::simple("w", "four"), &functions).unwrap();
        let mut p = def();
        p.name = "p".into();
        p.content = "3".into();
        table.define(p, &functions).unwrap();

        assert_eq!(table.lookup("n"), Some(Value::Num(4.0)));
        assert_eq!(table.lookup("w"), None);
        assert_eq!(table.lookup("p"), None);
        assert_eq!(table.lookup("missing"), None);
    }
}
