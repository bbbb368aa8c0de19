//! Key iteration for map handles.

use crate::db::Db;
use crate::error::Result;

/// An iterator over the keys of a map, in digest order.
///
/// Wraps [`Db::first_key`] / [`Db::next_key`], so the order is the
/// lexicographic order of key digests: unpredictable, but stable for a
/// given key set. The iterator holds its own handle on the database.
///
/// # Example
///
/// ```rust,no_run
/// use deepdb::{Db, Options};
///
/// # fn main() -> Result<(), deepdb::Error> {
/// let db = Db::open("data.db", Options::default())?;
/// for key in db.keys() {
///     println!("{:?}", key?);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Keys {
    db: Db,
    prev: Option<Vec<u8>>,
    done: bool,
}

impl Db {
    /// Returns an iterator over this map's keys.
    pub fn keys(&self) -> Keys {
        Keys { db: self.clone(), prev: None, done: false }
    }
}

impl Iterator for Keys {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let step = match &self.prev {
            None => self.db.first_key(),
            Some(prev) => self.db.next_key(prev),
        };
        match step {
            Ok(Some(key)) => {
                self.prev = Some(key.clone());
                Some(Ok(key))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Options;
    use crate::db::Db;
    use tempfile::TempDir;

    #[test]
    fn test_keys_yields_each_key_once() {
        let dir = TempDir::new().unwrap();
        let db = Db::open(dir.path().join("test.db"), Options::default()).unwrap();

        for i in 0..20 {
            db.put(format!("key{}", i), "v").unwrap();
        }

        let mut keys: Vec<Vec<u8>> = db.keys().collect::<crate::Result<_>>().unwrap();
        keys.sort();
        let mut expected: Vec<Vec<u8>> =
            (0..20).map(|i| format!("key{}", i).into_bytes()).collect();
        expected.sort();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_keys_empty_map() {
        let dir = TempDir::new().unwrap();
        let db = Db::open(dir.path().join("test.db"), Options::default()).unwrap();
        assert_eq!(db.keys().count(), 0);
    }
}
