//! Import and export of foreign in-memory trees.

use std::collections::HashSet;

use crate::config::DbKind;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::value::Value;

impl Db {
    /// Stores every entry of `tree` into this composite through the
    /// ordinary insert path. The tree's shape must match the handle's
    /// kind. Existing entries are kept; colliding keys are replaced.
    pub fn import(&self, tree: &Value) -> Result<()> {
        let r = self.import_inner(tree);
        self.record(r)
    }

    fn import_inner(&self, tree: &Value) -> Result<()> {
        match (self.kind(), tree) {
            (DbKind::Map, Value::Map(entries)) => {
                for (key, value) in entries {
                    self.put(key, value.clone())?;
                }
                Ok(())
            }
            (DbKind::List, Value::List(items)) => {
                self.push(items.iter().cloned())?;
                Ok(())
            }
            _ => Err(Error::unsupported("import tree does not match the handle kind")),
        }
    }

    /// Materializes this composite as an owned [`Value`] tree, fetching
    /// every entry recursively.
    ///
    /// A structure containing an on-disk cycle cannot be exported and
    /// fails instead of looping.
    pub fn export(&self) -> Result<Value> {
        let mut visiting = HashSet::new();
        let r = self.export_inner(&mut visiting);
        self.record(r)
    }

    fn export_inner(&self, visiting: &mut HashSet<u64>) -> Result<Value> {
        if !visiting.insert(self.base()) {
            return Err(Error::unsupported("cannot export a cyclic structure"));
        }

        let out = match self.kind() {
            DbKind::Map => {
                let mut entries = Vec::new();
                let mut key = self.first_key()?;
                while let Some(k) = key {
                    match self.get(&k)? {
                        Some(Value::Handle(child)) => {
                            entries.push((k.clone(), child.export_inner(visiting)?));
                        }
                        Some(value) => entries.push((k.clone(), value)),
                        None => {}
                    }
                    key = self.next_key(&k)?;
                }
                Value::Map(entries)
            }
            DbKind::List => {
                let len = self.len()?;
                let mut items = Vec::with_capacity(len as usize);
                for i in 0..len {
                    let item = match self.get_at(i as i64)? {
                        Some(Value::Handle(child)) => child.export_inner(visiting)?,
                        Some(value) => value,
                        None => Value::Null,
                    };
                    items.push(item);
                }
                Value::List(items)
            }
        };

        // Allow DAG sharing: only the ancestor chain counts as a cycle.
        visiting.remove(&self.base());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use tempfile::TempDir;

    #[test]
    fn test_import_export_roundtrip() {
        let dir = TempDir::new().unwrap();
        let db = Db::open(dir.path().join("test.db"), Options::default()).unwrap();

        let tree = Value::Map(vec![
            (b"scalar".to_vec(), Value::from("s")),
            (b"null".to_vec(), Value::Null),
            (
                b"nested".to_vec(),
                Value::Map(vec![(
                    b"list".to_vec(),
                    Value::List(vec![Value::from("a"), Value::from("b")]),
                )]),
            ),
        ]);

        db.import(&tree).unwrap();

        let exported = db.export().unwrap();
        let Value::Map(mut entries) = exported else {
            panic!("expected a map");
        };
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(entries[0].0, b"nested");
        assert_eq!(entries[1], (b"null".to_vec(), Value::Null));
        assert_eq!(entries[2], (b"scalar".to_vec(), Value::from("s")));

        let Value::Map(nested) = &entries[0].1 else {
            panic!("expected nested map");
        };
        assert_eq!(
            nested[0],
            (
                b"list".to_vec(),
                Value::List(vec![Value::from("a"), Value::from("b")])
            )
        );
    }

    #[test]
    fn test_import_kind_mismatch() {
        let dir = TempDir::new().unwrap();
        let db = Db::open(dir.path().join("test.db"), Options::default()).unwrap();

        let err = db.import(&Value::List(vec![])).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn test_export_detects_cycle() {
        let dir = TempDir::new().unwrap();
        let db = Db::open(dir.path().join("test.db"), Options::default()).unwrap();

        db.put("child", Value::Map(vec![])).unwrap();
        let child = db.get("child").unwrap().unwrap().into_handle().unwrap();
        child.put("up", child.clone()).unwrap();

        let err = db.export().unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
