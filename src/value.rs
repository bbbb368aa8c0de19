//! The runtime-typed value domain.

use crate::db::Db;

/// Result of a store: whether the key was new or overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The key did not exist; a new binding was created.
    Inserted,
    /// The key existed; its binding was overwritten.
    Replaced,
}

/// A value the engine can store or return.
///
/// On store, `Map` and `List` seed a fresh child composite with their
/// entries, and `Handle` re-inserts an existing composite of the same
/// file by reference (which may create an on-disk cycle). On fetch,
/// scalars come back as `Bytes` or `Null` and child composites as
/// `Handle`.
#[derive(Debug, Clone)]
pub enum Value {
    /// Scalar bytes.
    Bytes(Vec<u8>),
    /// The null value, distinct from an absent key.
    Null,
    /// A map seed: entries to store into a new child map.
    Map(Vec<(Vec<u8>, Value)>),
    /// A list seed: items to store into a new child list.
    List(Vec<Value>),
    /// A live composite inside a database file.
    Handle(Db),
}

impl Value {
    /// The scalar bytes, if this is `Bytes`.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Consumes the value, returning the scalar bytes if it is `Bytes`.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The composite handle, if this is `Handle`.
    pub fn as_handle(&self) -> Option<&Db> {
        match self {
            Value::Handle(db) => Some(db),
            _ => None,
        }
    }

    /// Consumes the value, returning the handle if it is `Handle`.
    pub fn into_handle(self) -> Option<Db> {
        match self {
            Value::Handle(db) => Some(db),
            _ => None,
        }
    }

    /// True for the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Handle(a), Value::Handle(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Bytes(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Bytes(s.into_bytes())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Value {
    fn from(b: &[u8; N]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Db> for Value {
    fn from(db: Db) -> Self {
        Value::Handle(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(Value::from("abc"), Value::Bytes(b"abc".to_vec()));
        assert_eq!(Value::from(String::from("abc")), Value::Bytes(b"abc".to_vec()));
        assert_eq!(Value::from(b"abc"), Value::Bytes(b"abc".to_vec()));
        assert_eq!(Value::from(vec![1u8, 2]), Value::Bytes(vec![1, 2]));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::from("x").as_bytes(), Some(&b"x"[..]));
        assert!(Value::Null.is_null());
        assert!(Value::Null.as_bytes().is_none());
        assert!(Value::from("x").into_bytes().is_some());
    }

    #[test]
    fn test_eq_across_kinds() {
        assert_ne!(Value::Bytes(vec![]), Value::Null);
        assert_eq!(
            Value::Map(vec![(b"k".to_vec(), Value::Null)]),
            Value::Map(vec![(b"k".to_vec(), Value::Null)])
        );
    }
}
