#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    /// `===`
    StrictEq,
    /// `!==`
    StrictNe,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Str(String),
    Number(f64),
    Bool(bool),
    Null,
    /// Bare identifier, resolved against locals first, then globals.
    Local(String),
    /// `global.name`, resolved against the global table only.
    Global(String),
    ToolCall {
        name: String,
        args: Vec<Expr>,
        line: usize,
    },
    /// `base.field`
    Member(Box<Expr>, String),
    /// `base[index]`
    Index(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
}

/// An ordered run of nodes; a component's parsed tree is its root body.
pub(crate) type Body = Vec<Node>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Print {
        expr: Expr,
    },
    Log {
        expr: Expr,
    },
    If {
        /// `$if` and `$elseif` branches in source order.
        branches: Vec<(Expr, Body)>,
        else_body: Option<Body>,
    },
    Foreach {
        item: String,
        index: Option<String>,
        collection: Expr,
        body: Body,
    },
    Render {
        component: Expr,
        /// `name=expr` pairs passed as the callee's initial locals.
        bindings: Vec<(String, Expr)>,
        /// Replacement bodies keyed by placeholder name, source order.
        replacements: Vec<(String, Body)>,
    },
    Include {
        component: String,
    },
    Place {
        name: String,
    },
}
