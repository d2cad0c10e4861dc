//! patchloom: a component template engine with caller-filled placeholders.
//!
//! This crate does one job well: render a named component template
//! against a set of locals and return the produced text, resolving
//! nested components, caller-supplied placeholder replacements, and
//! synchronous or asynchronous helper tools along the way.
//!
//! Statement set:
//! - `$print(expr)` and the short form `$(expr)`.
//! - `$log(expr)` to the diagnostic channel, never into the output.
//! - `$if(cond) ... $elseif(cond) ... $else ... $endif`.
//! - `$foreach(item, collection)` and `$foreach(item, index, collection)`.
//! - `$render('name', key=expr, ...) $replace('slot') ... $endreplace $endrender`.
//! - `$place('slot')` inside a component, filled by the caller's `$replace`.
//! - `$include('name')` splices raw source verbatim, never executed.
//!
//! Everything outside a recognized statement is literal text, emitted
//! exactly as authored: the engine never injects or trims whitespace or
//! newlines, and a `$word` that is not a statement keyword stays text.
//!
//! Scoping rules worth knowing:
//! - Loop variables shadow outer bindings and restore them after the loop.
//! - A nested `$render` sees only the bindings passed in its argument
//!   list, plus globals and tools; caller locals are not inherited.
//! - `$replace` bodies evaluate in the caller's scope, before the callee
//!   runs.
//!
//! Unset locals and globals are not errors: they resolve to
//! [`Value::Undefined`], which prints as the literal text `undefined`
//! and is falsy in conditions.
//!
//! ```no_run
//! use patchloom::{Engine, Environment, MapLoader, Value};
//! use std::collections::HashMap;
//!
//! # async fn demo() -> Result<(), patchloom::EngineError> {
//! let loader = MapLoader::new().insert("greeting", "<b>$(title)</b>");
//! let engine = Engine::new(Environment::builder(loader).build());
//!
//! let mut locals = HashMap::new();
//! locals.insert("title".to_string(), Value::from("Hi"));
//! let html = engine.render("greeting", locals).await?;
//! assert_eq!(html, "<b>Hi</b>");
//! # Ok(())
//! # }
//! ```

mod ast;
mod env;
mod error;
mod eval;
mod lexer;
mod loader;
mod parser;
mod scope;
mod value;

pub use env::{async_tool_fn, tool_fn, AsyncFnTool, Environment, EnvironmentBuilder, FnTool, Tool};
pub use error::{EngineError, ErrorKind};
pub use eval::Engine;
pub use loader::{DirLoader, MapLoader, SourceLoader};
pub use value::Value;
