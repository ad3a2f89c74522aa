//! Domain values exchanged with sessions.
//!
//! Domain types are defined by the deployed release, not by the server, so facts
//! are carried as dynamically typed values. An object names its type; the type's
//! shape is looked up in the owning container's namespace while decoding.

use std::collections::BTreeMap;
use std::fmt;

/// A dynamically typed domain value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Object(DomainObject),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&DomainObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut DomainObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Short type label used in fact handles and diagnostics.
    pub fn type_label(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "int",
            Value::Float(_) => "double",
            Value::Text(_) => "string",
            Value::List(_) => "list",
            Value::Object(o) => &o.type_name,
        }
    }
}

impl From<DomainObject> for Value {
    fn from(o: DomainObject) -> Self {
        Value::Object(o)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Object(o) => write!(f, "{}", o),
        }
    }
}

/// An instance of a release-defined type.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainObject {
    pub type_name: String,
    pub fields: BTreeMap<String, Value>,
}

impl DomainObject {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }
}

impl fmt::Display for DomainObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.type_name)?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_builder_and_display() {
        let message = DomainObject::new("org.pkg1.Message").with_field("text", "Hello World");
        assert_eq!(
            message.get("text").and_then(Value::as_text),
            Some("Hello World")
        );
        assert_eq!(message.to_string(), "org.pkg1.Message{text: Hello World}");
        assert_eq!(Value::from(message).type_label(), "org.pkg1.Message");
    }
}
