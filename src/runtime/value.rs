//! Value types for the runtime core
//!
//! The object model proper is an external collaborator; this module only
//! carries what the scheduler and module loader need to move around:
//! primitives, callable functions, promises, module namespaces, and error
//! objects raised by the runtime itself.

use super::async_runtime::{AsyncBody, FrameState, Resume, Step};
use super::promise::{PromiseRef, PromiseState};
use super::Runtime;
use crate::error::Error;
use rustc_hash::FxHashMap as HashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Result of running script code: `Ok` for a normal completion, `Err` for a
/// thrown value.
pub type Completion = std::result::Result<Value, Value>;

/// Signature of host-implemented functions
pub type NativeFn = dyn Fn(&mut Runtime, &[Value]) -> Completion;

/// A JavaScript value as seen by the scheduler
#[derive(Clone, Default)]
pub enum Value {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean primitive
    Boolean(bool),
    /// Number primitive
    Number(f64),
    /// String primitive
    String(String),
    /// Callable function object
    Function(Rc<Function>),
    /// Promise object
    Promise(PromiseRef),
    /// Module namespace object
    Namespace(Rc<Namespace>),
    /// Error object raised by the runtime
    Error(Rc<Error>),
}

/// A callable function object
pub struct Function {
    /// Function name (`"<anonymous>"` for arrows)
    pub name: String,
    /// How the function is invoked
    pub kind: FunctionKind,
}

/// Function implementation kinds
pub enum FunctionKind {
    /// Runs to completion synchronously
    Native(Box<NativeFn>),
    /// Runs as a suspendable async frame and returns a promise
    Async(Rc<dyn AsyncBody>),
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FunctionKind::Native(_) => "native",
            FunctionKind::Async(_) => "async",
        };
        write!(f, "[Function {} ({})]", self.name, kind)
    }
}

impl Value {
    /// Create a native function value
    pub fn native<F>(name: impl Into<String>, f: F) -> Value
    where
        F: Fn(&mut Runtime, &[Value]) -> Completion + 'static,
    {
        Value::Function(Rc::new(Function {
            name: name.into(),
            kind: FunctionKind::Native(Box::new(f)),
        }))
    }

    /// Create an async function value from a resumable body
    pub fn async_function<F>(name: impl Into<String>, body: F) -> Value
    where
        F: Fn(&mut Runtime, &mut FrameState, Resume) -> std::result::Result<Step, Value> + 'static,
    {
        Self::async_body(name, Rc::new(body))
    }

    /// Create an async function value from a shared body
    pub fn async_body(name: impl Into<String>, body: Rc<dyn AsyncBody>) -> Value {
        Value::Function(Rc::new(Function {
            name: name.into(),
            kind: FunctionKind::Async(body),
        }))
    }

    /// Create a string value
    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    /// Check if value is callable
    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// Check if value is undefined
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Get the promise behind this value, if it is one
    pub fn as_promise(&self) -> Option<&PromiseRef> {
        match self {
            Value::Promise(p) => Some(p),
            _ => None,
        }
    }

    /// Get the number behind this value, if it is one
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the string behind this value, if it is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// `typeof` result
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Promise(_) | Value::Namespace(_) | Value::Error(_) => "object",
        }
    }

    /// Convert to a JavaScript string (what `String(value)` would print)
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.clone(),
            Value::Function(f) => format!("function {}() {{ [native code] }}", f.name),
            Value::Promise(_) => "[object Promise]".to_string(),
            Value::Namespace(_) => "[object Module]".to_string(),
            Value::Error(e) => e.to_string(),
        }
    }

    /// Strict equality (`===`); objects compare by identity
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Promise(a), Value::Promise(b)) => Rc::ptr_eq(a, b),
            (Value::Namespace(a), Value::Namespace(b)) => Rc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Convert a thrown value into a host-side error
    pub fn to_error(&self) -> Error {
        match self {
            Value::Error(e) => (**e).clone(),
            other => Error::evaluation(format!("Uncaught {}", other.to_js_string())),
        }
    }
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Function(func) => write!(f, "{:?}", func),
            Value::Promise(p) => {
                let p = p.borrow();
                match p.state {
                    PromiseState::Pending => write!(f, "Promise#{} {{ <pending> }}", p.id),
                    _ => write!(
                        f,
                        "Promise#{} {{ <{}> {:?} }}",
                        p.id,
                        p.state,
                        p.result.clone().unwrap_or_default()
                    ),
                }
            }
            Value::Namespace(ns) => write!(f, "[Module {}]", ns.url()),
            other => write!(f, "{}", other.to_js_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_js_string())
    }
}

impl From<Error> for Value {
    fn from(err: Error) -> Self {
        Value::Error(Rc::new(err))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<PromiseRef> for Value {
    fn from(p: PromiseRef) -> Self {
        Value::Promise(p)
    }
}

/// Module namespace object: export name to bound value
///
/// Shared by reference between every importer of a module.
#[derive(Debug)]
pub struct Namespace {
    url: String,
    bindings: RefCell<HashMap<String, Value>>,
}

impl Namespace {
    /// Create an empty namespace for the module at `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bindings: RefCell::new(HashMap::default()),
        }
    }

    /// URL of the owning module
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Look up an exported binding
    pub fn get(&self, name: &str) -> Option<Value> {
        self.bindings.borrow().get(name).cloned()
    }

    /// Bind (or rebind) an export
    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Check whether an export exists
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.borrow().contains_key(name)
    }

    /// Export names, sorted the way namespace keys are enumerated
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of exports
    pub fn len(&self) -> usize {
        self.bindings.borrow().len()
    }

    /// Whether the namespace has no exports
    pub fn is_empty(&self) -> bool {
        self.bindings.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(Value::Number(100.0).to_js_string(), "100");
        assert_eq!(Value::Number(1.5).to_js_string(), "1.5");
        assert_eq!(Value::Number(f64::NAN).to_js_string(), "NaN");
        assert_eq!(Value::Number(f64::NEG_INFINITY).to_js_string(), "-Infinity");
    }

    #[test]
    fn test_strict_equality_uses_identity() {
        let f = Value::native("f", |_, _| Ok(Value::Undefined));
        let g = Value::native("f", |_, _| Ok(Value::Undefined));
        assert_eq!(f, f.clone());
        assert_ne!(f, g);
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_eq!(Value::from("a"), Value::string("a"));
    }

    #[test]
    fn test_error_round_trip() {
        let value = Value::from(Error::type_error("nope"));
        assert_eq!(value.to_error(), Error::type_error("nope"));
        assert_eq!(
            Value::from("boom").to_error(),
            Error::evaluation("Uncaught boom")
        );
    }

    #[test]
    fn test_namespace_bindings() {
        let ns = Namespace::new("/code/lib.js");
        assert!(ns.is_empty());
        ns.set("b", Value::Number(2.0));
        ns.set("a", Value::Number(1.0));
        assert_eq!(ns.names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(ns.get("a"), Some(Value::Number(1.0)));
        assert!(ns.get("missing").is_none());
    }

    #[test]
    fn test_type_of() {
        assert_eq!(Value::Undefined.type_of(), "undefined");
        assert_eq!(Value::native("f", |_, _| Ok(Value::Null)).type_of(), "function");
        assert_eq!(Value::Null.type_of(), "object");
    }
}
