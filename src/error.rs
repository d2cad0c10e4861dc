use thiserror::Error;

/// Coarse error taxonomy, for hosts that map failures onto their own
/// surface (HTTP status, CLI exit code) without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Reference,
    Composition,
    Source,
    Recursion,
}

/// Errors produced while loading, parsing, or rendering a component.
///
/// Any of these aborts the render in progress; the engine never returns
/// partial output. Unset locals and globals are not errors, they resolve
/// to [`Value::Undefined`](crate::Value::Undefined) instead.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("syntax error at line {line}: {message}")]
    Syntax { message: String, line: usize },

    #[error("unknown tool '{name}' called at line {line}")]
    UnresolvedTool { name: String, line: usize },

    #[error("component '{component}' uses placeholder '{name}' but the caller supplied no $replace for it")]
    MissingPlaceholder { name: String, component: String },

    #[error("placeholder '{name}' declared inside a $replace body at line {line}")]
    PlaceInReplacement { name: String, line: usize },

    #[error("cannot load component '{component}': {reason}")]
    MissingSource { component: String, reason: String },

    #[error("render depth exceeded {limit} while entering component '{component}'")]
    RecursionLimit { component: String, limit: usize },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Syntax { .. } => ErrorKind::Syntax,
            EngineError::UnresolvedTool { .. } => ErrorKind::Reference,
            EngineError::MissingPlaceholder { .. } => ErrorKind::Composition,
            EngineError::PlaceInReplacement { .. } => ErrorKind::Composition,
            EngineError::MissingSource { .. } => ErrorKind::Source,
            EngineError::RecursionLimit { .. } => ErrorKind::Recursion,
        }
    }

    /// Line number the error points at, where one is determinable.
    pub fn line(&self) -> Option<usize> {
        match self {
            EngineError::Syntax { line, .. }
            | EngineError::UnresolvedTool { line, .. }
            | EngineError::PlaceInReplacement { line, .. } => Some(*line),
            _ => None,
        }
    }
}
