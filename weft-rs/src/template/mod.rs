//! The template engine.
//!
//! ```text
//! text ─► mask ─► comment ─► grammar ─► symbols ─► render ─► text + attachments
//!                                                    │
//!                                          expr ◄────┴────► registry / builtins
//! ```
//!
//! ```no_run
//! # async fn demo() -> weft::Result<()> {
//! use weft::template::{Engine, RenderContext};
//!
//! let engine = Engine::new();
//! let mut ctx = RenderContext::default();
//! let out = engine
//!     .render("{who = \"world\"}\nHello, {{who}}!", &mut ctx)
//!     .await?;
//! assert_eq!(out.into_text().as_deref(), Some("Hello, world!"));
//! # Ok(())
//! # }
//! ```

pub mod builtins;
pub mod comment;
pub mod context;
pub mod expr;
pub mod grammar;
pub mod mask;
pub mod registry;
pub mod render;
pub mod symbols;
pub mod value;

pub use context::{Attachment, AttachmentSource, RenderContext, RenderOptions};
pub use grammar::{Node, Param, SlotMatch};
pub use registry::{FnOutput, Function, FunctionRegistry};
pub use render::{Engine, RenderOutput, MAX_PASSES};
pub use symbols::{SymbolTable, VariableDef};
pub use value::Value;
