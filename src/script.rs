//! Scripting-side values
//!
//! `ScriptValue` is what scripting code holds: primitives, wrapped native
//! instances, synthesized constructors, callable functions, and plain records
//! (the scripting form of a structure passed by value).

use crate::errors::BridgeError;
use crate::registry::Wrapper;
use crate::synth::SynthesizedClass;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

type Body = dyn Fn(&[ScriptValue]) -> Result<ScriptValue, BridgeError> + Send + Sync;

/// Callable scripting function
#[derive(Clone)]
pub struct ScriptFunction {
    name: Option<Arc<str>>,
    arity: Option<usize>,
    body: Arc<Body>,
}

impl ScriptFunction {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&[ScriptValue]) -> Result<ScriptValue, BridgeError> + Send + Sync + 'static,
    {
        Self {
            name: None,
            arity: None,
            body: Arc::new(body),
        }
    }

    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Require exactly `arity` arguments on every call
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    pub fn call(&self, args: &[ScriptValue]) -> Result<ScriptValue, BridgeError> {
        if let Some(expected) = self.arity {
            if args.len() != expected {
                return Err(BridgeError::ArityMismatch {
                    member: self.name().unwrap_or("anonymous function").to_string(),
                    expected,
                    got: args.len(),
                    signature: format!("function({} argument(s))", expected),
                });
            }
        }
        (self.body)(args)
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for ScriptFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Value held by scripting code
#[derive(Debug, Clone, Default)]
pub enum ScriptValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    /// Integers outside the exactly representable `Number` range
    BigInt(i128),
    String(String),
    /// Wrapped native instance
    Object(Wrapper),
    /// Synthesized class, callable as a constructor
    Constructor(Arc<SynthesizedClass>),
    Function(ScriptFunction),
    /// Plain object, the scripting form of a structure
    Record(BTreeMap<String, ScriptValue>),
}

impl ScriptValue {
    /// `typeof`-style name of the value
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::BigInt(_) => "bigint",
            Self::String(_) => "string",
            Self::Object(_) | Self::Record(_) => "object",
            Self::Constructor(_) | Self::Function(_) => "function",
        }
    }

    /// Description used in error messages, e.g. `Circle instance`
    pub fn describe_kind(&self) -> String {
        match self {
            Self::Object(wrapper) => format!("{} instance", wrapper.class().name()),
            Self::Constructor(class) => format!("{} constructor", class.name()),
            Self::Number(n) => format!("number {}", format_number(*n)),
            Self::BigInt(n) => format!("bigint {}", n),
            other => other.type_name().to_string(),
        }
    }

    #[inline]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn as_wrapper(&self) -> Option<&Wrapper> {
        match self {
            Self::Object(wrapper) => Some(wrapper),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match *self {
            Self::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn record<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, ScriptValue)>,
        K: Into<String>,
    {
        Self::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl PartialEq for ScriptValue {
    /// Primitives compare by value; objects, constructors, and functions by identity
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::BigInt(a), Self::BigInt(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Constructor(a), Self::Constructor(b)) => Arc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            (Self::Record(a), Self::Record(b)) => a == b,
            _ => false,
        }
    }
}

/// Scripting-style number formatting: integral values print without a fraction
fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{}", n as i128)
    } else {
        format!("{}", n)
    }
}

/// Stringification used by the console
impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::BigInt(n) => write!(f, "{}n", n),
            Self::String(s) => f.write_str(s),
            Self::Object(wrapper) => write!(f, "<{}: {}>", wrapper.class().name(), wrapper.ptr()),
            Self::Constructor(class) => write!(f, "function {}() {{ [native code] }}", class.name()),
            Self::Function(func) => write!(
                f,
                "function {}() {{ [native code] }}",
                func.name().unwrap_or_default()
            ),
            Self::Record(fields) => {
                if fields.is_empty() {
                    return f.write_str("{}");
                }
                f.write_str("{ ")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match value {
                        Self::String(s) => write!(f, "{}: {:?}", key, s)?,
                        other => write!(f, "{}: {}", key, other)?,
                    }
                }
                f.write_str(" }")
            }
        }
    }
}

impl From<bool> for ScriptValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for ScriptValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for ScriptValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for ScriptValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Wrapper> for ScriptValue {
    fn from(value: Wrapper) -> Self {
        Self::Object(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(ScriptValue::Number(42.0).to_string(), "42");
        assert_eq!(ScriptValue::Number(-0.5).to_string(), "-0.5");
        assert_eq!(ScriptValue::Number(f64::NAN).to_string(), "NaN");
        assert_eq!(ScriptValue::Number(f64::NEG_INFINITY).to_string(), "-Infinity");
        assert_eq!(ScriptValue::BigInt(1 << 60).to_string(), "1152921504606846976n");
    }

    #[test]
    fn test_record_formatting() {
        let point = ScriptValue::record([("x", 1.into()), ("label", "a".into())]);
        assert_eq!(point.to_string(), r#"{ label: "a", x: 1 }"#);
        assert_eq!(ScriptValue::record(Vec::<(String, ScriptValue)>::new()).to_string(), "{}");
    }

    #[test]
    fn test_function_identity() {
        let f = ScriptFunction::new(|_| Ok(ScriptValue::Undefined));
        let g = ScriptFunction::new(|_| Ok(ScriptValue::Undefined));
        assert_eq!(ScriptValue::Function(f.clone()), ScriptValue::Function(f));
        assert_ne!(
            ScriptValue::Function(g),
            ScriptValue::Function(ScriptFunction::new(|_| Ok(ScriptValue::Null)))
        );
    }

    #[test]
    fn test_function_arity() {
        let add = ScriptFunction::new(|args| {
            let sum: f64 = args.iter().filter_map(ScriptValue::as_number).sum();
            Ok(ScriptValue::Number(sum))
        })
        .named("add")
        .with_arity(2);

        assert_eq!(add.call(&[1.into(), 2.into()]).unwrap(), ScriptValue::Number(3.0));
        let err = add.call(&[1.into()]).unwrap_err();
        assert!(matches!(err, BridgeError::ArityMismatch { expected: 2, got: 1, .. }));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(ScriptValue::Undefined.type_name(), "undefined");
        assert_eq!(ScriptValue::BigInt(1).type_name(), "bigint");
        assert_eq!(ScriptValue::record([("a", ScriptValue::Null)]).type_name(), "object");
        assert!(ScriptValue::Null.is_nullish());
        assert!(!ScriptValue::Bool(false).is_nullish());
    }
}
