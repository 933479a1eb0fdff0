//! Function registry.
//!
//! A function is a name, its declared parameter names (so named slot
//! arguments can be placed), and a callable.  Sync and async callables share
//! one signature: the callable returns an [`FnOutput`] that is either a
//! finished result or a boxed future, and the renderer awaits both the same
//! way.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::warn;

use crate::error::{Error, Result};

use super::context::RenderContext;
use super::grammar::Param;
use super::value::Value;

/// What a callable hands back.
pub enum FnOutput<'a> {
    Ready(Result<String>),
    Pending(BoxFuture<'a, Result<String>>),
}

impl FnOutput<'_> {
    pub async fn resolve(self) -> Result<String> {
        match self {
            FnOutput::Ready(r) => r,
            FnOutput::Pending(fut) => fut.await,
        }
    }
}

/// Type-erased callable stored in the registry.
pub type Callable =
    Arc<dyn for<'a> Fn(&'a mut RenderContext, Vec<Value>) -> FnOutput<'a> + Send + Sync>;

fn callable<F>(f: F) -> Callable
where
    F: for<'a> Fn(&'a mut RenderContext, Vec<Value>) -> FnOutput<'a> + Send + Sync + 'static,
{
    Arc::new(f)
}

// ── Function ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Function {
    name: String,
    params: Vec<String>,
    callable: Callable,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Lay slot arguments out in declared order: positionals fill the first
    /// free positions, named arguments go to their declared index.  Gaps are
    /// empty strings.
    pub fn arrange(&self, args: &[Param]) -> Vec<Value> {
        let mut slots: Vec<Option<Value>> = Vec::new();
        for arg in args.iter().filter(|a| a.name.is_some()) {
            let name = arg.name.as_deref().unwrap_or_default();
            match self.params.iter().position(|p| p == name) {
                Some(i) => {
                    if slots.len() <= i {
                        slots.resize(i + 1, None);
                    }
                    slots[i] = Some(arg.value.clone());
                }
                None => warn!(function = %self.name, param = name, "ignoring unknown named argument"),
            }
        }
        let mut next = 0;
        for arg in args.iter().filter(|a| a.name.is_none()) {
            while slots.get(next).is_some_and(Option::is_some) {
                next += 1;
            }
            if slots.len() <= next {
                slots.resize(next + 1, None);
            }
            slots[next] = Some(arg.value.clone());
        }
        slots.into_iter().map(Option::unwrap_or_default).collect()
    }

    pub async fn call(&self, ctx: &mut RenderContext, args: Vec<Value>) -> Result<String> {
        (self.callable)(ctx, args).resolve().await
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

// ── FunctionRegistry ──────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    fns: HashMap<String, Function>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous function.
    pub fn register<F>(&mut self, name: &str, params: &[&str], f: F) -> Result<()>
    where
        F: Fn(&mut RenderContext, Vec<Value>) -> Result<String> + Send + Sync + 'static,
    {
        self.insert(name, params, callable(move |ctx, args| FnOutput::Ready(f(ctx, args))))
    }

    /// Register a function whose result is produced by a future.
    pub fn register_async<F>(&mut self, name: &str, params: &[&str], f: F) -> Result<()>
    where
        F: for<'a> Fn(&'a mut RenderContext, Vec<Value>) -> BoxFuture<'a, Result<String>>
            + Send
            + Sync
            + 'static,
    {
        self.insert(name, params, callable(move |ctx, args| FnOutput::Pending(f(ctx, args))))
    }

    /// Register an async function, replacing any function already under
    /// `name`.  Returns the replaced function.
    pub fn replace_async<F>(&mut self, name: &str, params: &[&str], f: F) -> Option<Function>
    where
        F: for<'a> Fn(&'a mut RenderContext, Vec<Value>) -> BoxFuture<'a, Result<String>>
            + Send
            + Sync
            + 'static,
    {
        self.put(name, params, callable(move |ctx, args| FnOutput::Pending(f(ctx, args))))
    }

    fn insert(&mut self, name: &str, params: &[&str], callable: Callable) -> Result<()> {
        if self.fns.contains_key(name) {
            return Err(Error::FunctionExists(name.to_owned()));
        }
        self.put(name, params, callable);
        Ok(())
    }

    fn put(&mut self, name: &str, params: &[&str], callable: Callable) -> Option<Function> {
        let function = Function {
            name: name.to_owned(),
            params: params.iter().map(|p| (*p).to_owned()).collect(),
            callable,
        };
        self.fns.insert(name.to_owned(), function)
    }

    /// Remove `name`.  Returns whether it was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.fns.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.fns.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fns.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fns.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.fns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fns.is_empty()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn join_args(_: &mut RenderContext, args: Vec<Value>) -> Result<String> {
        Ok(args.iter().map(Value::to_string).collect::<Vec<_>>().join("|"))
    }

    fn registry() -> FunctionRegistry {
        let mut r = FunctionRegistry::new();
        r.register("join", &["a", "b", "c"], join_args).unwrap();
        r
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut r = registry();
        let err = r.register("join", &[], join_args).unwrap_err();
        assert_eq!(err.to_string(), "Function `join` is already registered");
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut r = registry();
        assert!(r.unregister("join"));
        assert!(!r.unregister("join"));
        assert!(r.is_empty());
    }

    #[test]
    fn arrange_places_named_arguments() {
        let r = registry();
        let f = r.get("join").unwrap();
        let args = f.arrange(&[Param::named("b", "B"), Param::positional("A"), Param::positional("C")]);
        assert_eq!(
            args,
            vec![Value::Str("A".into()), Value::Str("B".into()), Value::Str("C".into())]
        );
        let args = f.arrange(&[Param::named("c", 3i64)]);
        assert_eq!(args, vec![Value::default(), Value::default(), Value::Num(3.0)]);
        let args = f.arrange(&[Param::named("zzz", "x"), Param::positional(1i64)]);
        assert_eq!(args, vec![Value::Num(1.0)]);
    }

    #[tokio::test]
    async fn sync_and_async_calls() {
        let mut r = registry();
        r.register_async("later", &["x"], |ctx, args| {
            Box::pin(async move {
                ctx.attachments.push(crate::template::Attachment::url("https://a"));
                Ok(format!("later:{}", args.first().cloned().unwrap_or_default()))
            })
        })
        .unwrap();

        let mut ctx = RenderContext::default();
        let f = r.get("join").unwrap().clone();
        assert_eq!(
            f.call(&mut ctx, vec![Value::Num(1.0), Value::Str("x".into())]).await.unwrap(),
            "1|x"
        );
        let f = r.get("later").unwrap().clone();
        assert_eq!(f.call(&mut ctx, vec![Value::Num(2.0)]).await.unwrap(), "later:2");
        assert_eq!(ctx.attachments.len(), 1);
        assert_eq!(r.names(), vec!["join", "later"]);
    }

    #[tokio::test]
    async fn replace_async_overrides_existing() {
        let mut r = registry();
        let old = r.replace_async("join", &["a"], |_, args| {
            Box::pin(async move { Ok(format!("new:{}", args.len())) })
        });
        assert_eq!(old.map(|f| f.params().len()), Some(3));
        assert!(r.replace_async("fresh", &[], |_, _| Box::pin(async { Ok(String::new()) })).is_none());

        let mut ctx = RenderContext::default();
        let f = r.get("join").unwrap().clone();
        assert_eq!(f.params(), ["a".to_string()]);
        assert_eq!(f.call(&mut ctx, vec![Value::Num(1.0)]).await.unwrap(), "new:1");
    }
}
