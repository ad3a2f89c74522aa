//! Type resolution for release-defined domain types.
//!
//! Each deployed release owns an isolated [`TypeNamespace`]. Marshallers receive
//! the namespace of the container a payload is addressed to and never consult a
//! global table, so two containers may define same-named types with different
//! shapes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

/// Scalar or nested kind of a declared field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Int,
    Float,
    Bool,
    /// Nested object of the named type (resolved in the same namespace).
    Object(String),
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Text => f.write_str("text"),
            FieldKind::Int => f.write_str("int"),
            FieldKind::Float => f.write_str("float"),
            FieldKind::Bool => f.write_str("bool"),
            FieldKind::Object(name) => write!(f, "object({})", name),
        }
    }
}

/// A declared field of a domain type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

/// Shape of a domain type: its name and ordered fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Capability to look up domain types by name.
pub trait TypeResolver: Send + Sync {
    /// Namespace label used in diagnostics (usually the release id).
    fn namespace(&self) -> &str;

    /// Resolve a type by its fully qualified name.
    fn resolve(&self, type_name: &str) -> Option<Arc<TypeDescriptor>>;
}

/// Isolated set of types declared by one release.
#[derive(Debug, Clone, Default)]
pub struct TypeNamespace {
    namespace: String,
    types: HashMap<String, Arc<TypeDescriptor>>,
}

impl TypeNamespace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            types: HashMap::new(),
        }
    }

    pub fn with_type(mut self, descriptor: TypeDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    pub fn register(&mut self, descriptor: TypeDescriptor) {
        self.types
            .insert(descriptor.name.clone(), Arc::new(descriptor));
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Names of nested object kinds that are not declared in this namespace.
    pub fn dangling_references(&self) -> Vec<String> {
        let mut missing: Vec<String> = self
            .types
            .values()
            .flat_map(|t| t.fields.iter())
            .filter_map(|f| match &f.kind {
                FieldKind::Object(name) if !self.types.contains_key(name) => Some(name.clone()),
                _ => None,
            })
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }
}

impl TypeResolver for TypeNamespace {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn resolve(&self, type_name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.get(type_name).cloned()
    }
}

/// Resolver for server-level envelopes, which carry no domain types.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDomainTypes;

impl TypeResolver for NoDomainTypes {
    fn namespace(&self) -> &str {
        "server"
    }

    fn resolve(&self, _type_name: &str) -> Option<Arc<TypeDescriptor>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_type() -> TypeDescriptor {
        TypeDescriptor::new("org.pkg1.Message").with_field("text", FieldKind::Text)
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let first = TypeNamespace::new("foo.bar:baz:1").with_type(message_type());
        let second = TypeNamespace::new("other:app:1").with_type(
            TypeDescriptor::new("org.pkg1.Message").with_field("count", FieldKind::Int),
        );

        let a = first.resolve("org.pkg1.Message").unwrap();
        let b = second.resolve("org.pkg1.Message").unwrap();
        assert!(a.field("text").is_some());
        assert!(b.field("text").is_none());
        assert_eq!(b.field("count").unwrap().kind, FieldKind::Int);
    }

    #[test]
    fn test_no_domain_types_resolves_nothing() {
        assert!(NoDomainTypes.resolve("org.pkg1.Message").is_none());
        assert_eq!(NoDomainTypes.namespace(), "server");
    }

    #[test]
    fn test_dangling_references() {
        let ns = TypeNamespace::new("ns").with_type(
            TypeDescriptor::new("a.Order")
                .with_field("customer", FieldKind::Object("a.Customer".into())),
        );
        assert_eq!(ns.dangling_references(), vec!["a.Customer".to_string()]);
    }
}
