use crate::loader::SourceLoader;
use crate::value::Value;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

/// A named callable usable from template expressions.
///
/// A tool may complete immediately or return a future that resolves
/// later; the evaluator suspends the current render path until the
/// result is available. Tools report failures by returning a value the
/// template can inspect (for example `Value::Null`), they cannot abort
/// a render.
pub trait Tool: Send + Sync {
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, Value>;
}

/// Wraps a synchronous closure as a [`Tool`].
pub struct FnTool<F>(F);

/// Wraps a future-returning closure as a [`Tool`].
pub struct AsyncFnTool<F>(F);

/// Tool from a synchronous closure: the result is ready immediately.
pub fn tool_fn<F>(f: F) -> FnTool<F>
where
    F: Fn(Vec<Value>) -> Value + Send + Sync + 'static,
{
    FnTool(f)
}

/// Tool from a closure returning a boxed future.
pub fn async_tool_fn<F>(f: F) -> AsyncFnTool<F>
where
    F: Fn(Vec<Value>) -> BoxFuture<'static, Value> + Send + Sync + 'static,
{
    AsyncFnTool(f)
}

impl<F> Tool for FnTool<F>
where
    F: Fn(Vec<Value>) -> Value + Send + Sync + 'static,
{
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, Value> {
        let value = (self.0)(args);
        Box::pin(std::future::ready(value))
    }
}

impl<F> Tool for AsyncFnTool<F>
where
    F: Fn(Vec<Value>) -> BoxFuture<'static, Value> + Send + Sync + 'static,
{
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, Value> {
        (self.0)(args)
    }
}

/// Immutable engine configuration: the source loader, the global-value
/// table, the tool table, and the caching mode. Built once at startup
/// and shared by reference, which keeps every render a pure function of
/// (component source, locals, tables).
pub struct Environment {
    pub(crate) loader: Arc<dyn SourceLoader>,
    pub(crate) globals: HashMap<String, Value>,
    pub(crate) tools: HashMap<String, Arc<dyn Tool>>,
    pub(crate) caching: bool,
}

impl Environment {
    pub fn builder(loader: impl SourceLoader + 'static) -> EnvironmentBuilder {
        EnvironmentBuilder {
            loader: Arc::new(loader),
            globals: HashMap::new(),
            tools: HashMap::new(),
            caching: true,
        }
    }
}

pub struct EnvironmentBuilder {
    loader: Arc<dyn SourceLoader>,
    globals: HashMap<String, Value>,
    tools: HashMap<String, Arc<dyn Tool>>,
    caching: bool,
}

impl EnvironmentBuilder {
    pub fn global(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.globals.insert(name.into(), value.into());
        self
    }

    pub fn tool(mut self, name: impl Into<String>, tool: impl Tool + 'static) -> Self {
        self.tools.insert(name.into(), Arc::new(tool));
        self
    }

    /// Caching is on by default; turn it off to re-fetch and re-parse
    /// component source on every render.
    pub fn caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    pub fn build(self) -> Environment {
        Environment {
            loader: self.loader,
            globals: self.globals,
            tools: self.tools,
            caching: self.caching,
        }
    }
}
