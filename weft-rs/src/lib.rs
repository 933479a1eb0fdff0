//! weft: a small text-templating language.
//!
//! Templates declare variables with single braces and reference them with
//! double braces:
//!
//! ```text
//! {greeting = "Hello"}
//! {card(title, tone="plain")}
//! ## {{title}} ({{tone}})
//! {/card}
//! {{greeting}}! {{card("Intro", tone="warm")}} {{2 * 21}}
//! ```
//!
//! Code spans and fenced blocks pass through untouched; `//` and `/* */`
//! comments are stripped.  See [`template`] for the engine.

pub mod cli;
pub mod config;
pub mod error;
pub mod template;

pub use error::{Error, EvalError, Result, SyntaxError};
pub use template::{Engine, RenderContext, RenderOptions, RenderOutput, Value};
