//! Runtime values and scopes for the evaluation context.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::parser::{ArrowBody, Stmt};

/// Insertion-ordered property map. Modules are small; linear scans are fine
/// and keep export iteration in source order.
#[derive(Debug, Default, Clone)]
pub struct ObjectData {
    entries: Vec<(String, Value)>,
}

impl ObjectData {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &(String, Value)> {
        self.entries.iter()
    }
}

pub type ObjectRef = Arc<Mutex<ObjectData>>;

pub fn new_object() -> ObjectRef {
    Arc::new(Mutex::new(ObjectData::default()))
}

/// Which of the three injected import functions a native value stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Namespace,
    Named,
    Default,
}

/// Built-in callables seeded into the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeFn {
    /// Accepts any arguments, returns `undefined`. Backs the inert ambient
    /// globals (`setInterval`, `addEventListener`, ...).
    Noop,
    /// The tagging function in the evaluated copy: interleaves quasis and
    /// stringified interpolation values back into plain CSS text.
    TemplateTagNoop,
    /// One of the injected module-import functions.
    Import(ImportKind),
}

pub struct UserFunction {
    pub params: Vec<String>,
    pub body: ArrowBody,
    pub is_async: bool,
    pub closure: ScopeRef,
}

impl fmt::Debug for UserFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserFunction")
            .field("params", &self.params)
            .field("is_async", &self.is_async)
            .finish_non_exhaustive()
    }
}

impl UserFunction {
    pub fn declared(params: Vec<String>, body: Vec<Stmt>, closure: ScopeRef) -> Self {
        Self {
            params,
            body: ArrowBody::Block(body),
            is_async: false,
            closure,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Object(ObjectRef),
    Array(Arc<Mutex<Vec<Value>>>),
    Function(Arc<UserFunction>),
    Native(NativeFn),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::Function(_) | Value::Native(_) => "function",
        }
    }

    /// String conversion for template-literal interpolation.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Num(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Value::Str(s) => s.clone(),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Array(items) => items
                .lock()
                .iter()
                .map(|v| v.to_display_string())
                .collect::<Vec<_>>()
                .join(","),
            Value::Function(_) | Value::Native(_) => "[function]".to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Scope {
    vars: Vec<(String, Value)>,
    parent: Option<ScopeRef>,
}

pub type ScopeRef = Arc<Mutex<Scope>>;

impl Scope {
    pub fn root() -> ScopeRef {
        Arc::new(Mutex::new(Scope::default()))
    }

    pub fn child(parent: &ScopeRef) -> ScopeRef {
        Arc::new(Mutex::new(Scope {
            vars: Vec::new(),
            parent: Some(parent.clone()),
        }))
    }
}

pub fn scope_get(scope: &ScopeRef, name: &str) -> Option<Value> {
    let mut current = scope.clone();
    loop {
        let next = {
            let guard = current.lock();
            if let Some((_, v)) = guard.vars.iter().find(|(n, _)| n == name) {
                return Some(v.clone());
            }
            guard.parent.clone()
        };
        match next {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}

pub fn scope_define(scope: &ScopeRef, name: impl Into<String>, value: Value) {
    let name = name.into();
    let mut guard = scope.lock();
    if let Some(slot) = guard.vars.iter_mut().find(|(n, _)| *n == name) {
        slot.1 = value;
    } else {
        guard.vars.push((name, value));
    }
}

/// Assign to an existing binding in the nearest enclosing scope that has
/// one. Assigning to an undeclared name defines it at the root, matching
/// sloppy-mode behavior the rewriter relies on for its `main = ...` wrapper.
pub fn scope_assign(scope: &ScopeRef, name: &str, value: Value) {
    let mut current = scope.clone();
    loop {
        let next = {
            let mut guard = current.lock();
            if let Some(slot) = guard.vars.iter_mut().find(|(n, _)| n == name) {
                slot.1 = value;
                return;
            }
            guard.parent.clone()
        };
        match next {
            Some(parent) => current = parent,
            None => {
                scope_define(&current, name, value);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_preserves_insertion_order_and_overwrites() {
        let obj = new_object();
        obj.lock().set("b", Value::Num(1.0));
        obj.lock().set("a", Value::Num(2.0));
        obj.lock().set("b", Value::Num(3.0));
        let keys: Vec<String> = obj
            .lock()
            .entries()
            .map(|(k, _)| k.clone())
            .collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert!(matches!(obj.lock().get("b"), Some(Value::Num(n)) if n == 3.0));
    }

    #[test]
    fn scope_lookup_walks_parents() {
        let root = Scope::root();
        scope_define(&root, "x", Value::Num(1.0));
        let inner = Scope::child(&root);
        assert!(matches!(scope_get(&inner, "x"), Some(Value::Num(n)) if n == 1.0));
        assert!(scope_get(&inner, "y").is_none());
    }

    #[test]
    fn assignment_to_undeclared_defines_at_root() {
        let root = Scope::root();
        let inner = Scope::child(&root);
        scope_assign(&inner, "main", Value::Num(7.0));
        assert!(matches!(scope_get(&root, "main"), Some(Value::Num(n)) if n == 7.0));
    }

    #[test]
    fn assignment_targets_nearest_declaring_scope() {
        let root = Scope::root();
        scope_define(&root, "x", Value::Num(1.0));
        let inner = Scope::child(&root);
        scope_assign(&inner, "x", Value::Num(2.0));
        assert!(matches!(scope_get(&root, "x"), Some(Value::Num(n)) if n == 2.0));
        assert!(inner.lock().vars.is_empty());
    }

    #[test]
    fn number_display_trims_integral_fraction() {
        assert_eq!(Value::Num(4.0).to_display_string(), "4");
        assert_eq!(Value::Num(4.5).to_display_string(), "4.5");
    }
}
