use crate::ast::{BinOp, Body, Expr, Node};
use crate::env::Environment;
use crate::error::EngineError;
use crate::parser;
use crate::scope::Scope;
use crate::value::Value;
use futures_util::future::BoxFuture;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Guard against cyclic component references (A renders B renders A).
const MAX_RENDER_DEPTH: usize = 64;

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The rendering engine.
///
/// Holds the immutable [`Environment`] and, in caching mode, the parsed
/// component trees keyed by identifier. The cache is append-only; a
/// concurrent duplicate parse of the same identifier is harmless. An
/// `Engine` is safe to share across tasks, and independent renders may
/// run concurrently.
pub struct Engine {
    env: Environment,
    cache: RwLock<HashMap<String, Arc<Body>>>,
}

impl Engine {
    pub fn new(env: Environment) -> Self {
        Self {
            env,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Render a component by its dot-separated identifier with the given
    /// locals seeding the root scope.
    ///
    /// Output is assembled in document order: each statement fully
    /// completes, including any suspensions on deferred tools or nested
    /// renders, before the next sibling begins. A failure anywhere
    /// aborts the whole render; no partial output is returned.
    pub async fn render(
        &self,
        component: &str,
        locals: HashMap<String, Value>,
    ) -> Result<String, EngineError> {
        debug!(target: "patchloom", component, "render start");
        let tree = self.resolve(component)?;
        let invocation = Invocation {
            engine: self,
            component: component.to_string(),
            replacements: HashMap::new(),
            depth: 0,
        };
        let mut scope = Scope::root(locals);
        let mut out = String::new();
        invocation.eval_body(&tree, &mut scope, &mut out).await?;
        debug!(target: "patchloom", component, bytes = out.len(), "render done");
        Ok(out)
    }

    /// Drop all cached parse trees. The only way to pick up changed
    /// component source while caching is enabled.
    pub fn clear_cache(&self) {
        write_lock(&self.cache).clear();
    }

    fn resolve(&self, component: &str) -> Result<Arc<Body>, EngineError> {
        if self.env.caching {
            if let Some(tree) = read_lock(&self.cache).get(component) {
                debug!(target: "patchloom", component, "parse cache hit");
                return Ok(Arc::clone(tree));
            }
        }
        let source = self.load_source(component)?;
        let tree = Arc::new(parser::parse(&source)?);
        if self.env.caching {
            write_lock(&self.cache).insert(component.to_string(), Arc::clone(&tree));
        }
        Ok(tree)
    }

    fn load_source(&self, component: &str) -> Result<String, EngineError> {
        self.env
            .loader
            .load(component)
            .map_err(|e| EngineError::MissingSource {
                component: component.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Evaluation state for one component invocation: which component is
/// running, the replacement fragments its caller supplied, and the
/// nesting depth for the recursion guard.
struct Invocation<'e> {
    engine: &'e Engine,
    component: String,
    replacements: HashMap<String, String>,
    depth: usize,
}

impl<'e> Invocation<'e> {
    fn eval_body<'a>(
        &'a self,
        body: &'a [Node],
        scope: &'a mut Scope,
        out: &'a mut String,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(async move {
            for node in body {
                match node {
                    Node::Text(text) => out.push_str(text),
                    Node::Print { expr } => {
                        let value = self.eval_expr(expr, scope).await?;
                        out.push_str(&value.to_string());
                    }
                    Node::Log { expr } => {
                        let value = self.eval_expr(expr, scope).await?;
                        info!(
                            target: "patchloom::template",
                            component = %self.component,
                            "{}", value
                        );
                    }
                    Node::If {
                        branches,
                        else_body,
                    } => {
                        let mut taken = false;
                        for (condition, branch_body) in branches {
                            let cond = self.eval_expr(condition, scope).await?;
                            if cond.is_truthy() {
                                self.eval_body(branch_body, scope, out).await?;
                                taken = true;
                                break;
                            }
                        }
                        if !taken {
                            if let Some(else_body) = else_body {
                                self.eval_body(else_body, scope, out).await?;
                            }
                        }
                    }
                    Node::Foreach {
                        item,
                        index,
                        collection,
                        body: loop_body,
                    } => {
                        let value = self.eval_expr(collection, scope).await?;
                        // Anything that is not an array iterates zero times.
                        if let Value::Array(items) = value {
                            for (i, element) in items.into_iter().enumerate() {
                                let mut frame = HashMap::new();
                                frame.insert(item.clone(), element);
                                if let Some(index_name) = index {
                                    frame.insert(index_name.clone(), Value::from(i));
                                }
                                scope.push(frame);
                                let result = self.eval_body(loop_body, scope, out).await;
                                scope.pop();
                                result?;
                            }
                        }
                    }
                    Node::Render {
                        component,
                        bindings,
                        replacements,
                    } => {
                        let name_value = self.eval_expr(component, scope).await?;
                        let target = name_value.to_string();
                        if self.depth + 1 > MAX_RENDER_DEPTH {
                            return Err(EngineError::RecursionLimit {
                                component: target,
                                limit: MAX_RENDER_DEPTH,
                            });
                        }

                        // Bindings evaluate in the caller's scope and become
                        // the callee's entire root scope; nothing else is
                        // inherited.
                        let mut child_locals = HashMap::new();
                        for (name, expr) in bindings {
                            let value = self.eval_expr(expr, scope).await?;
                            child_locals.insert(name.clone(), value);
                        }

                        let tree = self.engine.resolve(&target)?;

                        // Replacement bodies run against the caller's scope,
                        // before the callee starts.
                        let mut fragments = HashMap::new();
                        for (name, replacement_body) in replacements {
                            let mut fragment = String::new();
                            self.eval_body(replacement_body, scope, &mut fragment)
                                .await?;
                            fragments.insert(name.clone(), fragment);
                        }

                        let child = Invocation {
                            engine: self.engine,
                            component: target,
                            replacements: fragments,
                            depth: self.depth + 1,
                        };
                        let mut child_scope = Scope::root(child_locals);
                        child.eval_body(&tree, &mut child_scope, out).await?;
                    }
                    Node::Include { component } => {
                        // Spliced verbatim; statement syntax in the included
                        // source is emitted, never executed.
                        let source = self.engine.load_source(component)?;
                        out.push_str(&source);
                    }
                    Node::Place { name } => match self.replacements.get(name) {
                        Some(fragment) => out.push_str(fragment),
                        None => {
                            return Err(EngineError::MissingPlaceholder {
                                name: name.clone(),
                                component: self.component.clone(),
                            })
                        }
                    },
                }
            }
            Ok(())
        })
    }

    fn eval_expr<'a>(
        &'a self,
        expr: &'a Expr,
        scope: &'a Scope,
    ) -> BoxFuture<'a, Result<Value, EngineError>> {
        Box::pin(async move {
            match expr {
                Expr::Str(value) => Ok(Value::String(value.clone())),
                Expr::Number(value) => Ok(Value::Number(*value)),
                Expr::Bool(value) => Ok(Value::Bool(*value)),
                Expr::Null => Ok(Value::Null),
                Expr::Local(name) => Ok(match scope.lookup(name) {
                    Some(value) => value.clone(),
                    None => self
                        .engine
                        .env
                        .globals
                        .get(name)
                        .cloned()
                        .unwrap_or(Value::Undefined),
                }),
                Expr::Global(name) => Ok(self
                    .engine
                    .env
                    .globals
                    .get(name)
                    .cloned()
                    .unwrap_or(Value::Undefined)),
                Expr::ToolCall { name, args, line } => {
                    let tool = self.engine.env.tools.get(name).ok_or_else(|| {
                        EngineError::UnresolvedTool {
                            name: name.clone(),
                            line: *line,
                        }
                    })?;
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args {
                        values.push(self.eval_expr(arg, scope).await?);
                    }
                    Ok(tool.call(values).await)
                }
                Expr::Member(base, field) => {
                    let base = self.eval_expr(base, scope).await?;
                    Ok(member(&base, field))
                }
                Expr::Index(base, index) => {
                    let base = self.eval_expr(base, scope).await?;
                    let index = self.eval_expr(index, scope).await?;
                    Ok(index_into(&base, &index))
                }
                Expr::Not(operand) => {
                    let value = self.eval_expr(operand, scope).await?;
                    Ok(Value::Bool(!value.is_truthy()))
                }
                Expr::Binary(lhs, op, rhs) => match op {
                    BinOp::And => {
                        let left = self.eval_expr(lhs, scope).await?;
                        if !left.is_truthy() {
                            return Ok(left);
                        }
                        self.eval_expr(rhs, scope).await
                    }
                    BinOp::Or => {
                        let left = self.eval_expr(lhs, scope).await?;
                        if left.is_truthy() {
                            return Ok(left);
                        }
                        self.eval_expr(rhs, scope).await
                    }
                    op => {
                        let left = self.eval_expr(lhs, scope).await?;
                        let right = self.eval_expr(rhs, scope).await?;
                        let truth = match op {
                            BinOp::StrictEq => left == right,
                            BinOp::StrictNe => left != right,
                            BinOp::Eq => left.loose_eq(&right),
                            BinOp::Ne => !left.loose_eq(&right),
                            BinOp::Lt => matches!(left.compare(&right), Some(Ordering::Less)),
                            BinOp::Le => matches!(
                                left.compare(&right),
                                Some(Ordering::Less | Ordering::Equal)
                            ),
                            BinOp::Gt => {
                                matches!(left.compare(&right), Some(Ordering::Greater))
                            }
                            BinOp::Ge => matches!(
                                left.compare(&right),
                                Some(Ordering::Greater | Ordering::Equal)
                            ),
                            BinOp::And => left.is_truthy() && right.is_truthy(),
                            BinOp::Or => left.is_truthy() || right.is_truthy(),
                        };
                        Ok(Value::Bool(truth))
                    }
                },
            }
        })
    }
}

/// Member access never fails; missing fields and non-object bases
/// resolve to `Undefined`, matching the defensive nested-if pattern.
fn member(base: &Value, field: &str) -> Value {
    match base {
        Value::Object(map) => map.get(field).cloned().unwrap_or(Value::Undefined),
        Value::Array(items) if field == "length" => Value::from(items.len()),
        Value::String(s) if field == "length" => Value::from(s.chars().count()),
        _ => Value::Undefined,
    }
}

fn index_into(base: &Value, index: &Value) -> Value {
    match base {
        Value::Array(items) => match index.as_number() {
            Some(n) if n >= 0.0 && n.fract() == 0.0 => {
                items.get(n as usize).cloned().unwrap_or(Value::Undefined)
            }
            _ => Value::Undefined,
        },
        Value::Object(map) => match index {
            Value::String(key) => map.get(key).cloned().unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        },
        _ => Value::Undefined,
    }
}
