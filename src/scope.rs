use crate::value::Value;
use std::collections::HashMap;

/// Chain of lexical frames for one component invocation.
///
/// A fresh chain is created per render call; loop iterations push and
/// pop frames on top of it. Lookups walk innermost-first, so loop
/// bindings shadow outer bindings without destroying them.
pub(crate) struct Scope {
    frames: Vec<HashMap<String, Value>>,
}

impl Scope {
    pub fn root(bindings: HashMap<String, Value>) -> Self {
        Self {
            frames: vec![bindings],
        }
    }

    pub fn push(&mut self, bindings: HashMap<String, Value>) {
        self.frames.push(bindings);
    }

    pub fn pop(&mut self) {
        // The root frame stays for the lifetime of the invocation.
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }
}
