//! The database handle and the uniform store/fetch path behind it.
//!
//! A [`Db`] points at one composite (map or list) inside an open file.
//! The root handle comes from [`Db::open`]; child handles come from
//! fetching a nested composite. All handles on one file share a single
//! reference-counted [`Root`], so they see the same end-of-file offset,
//! lock state and filters. The file closes when the last handle drops.

mod iter;
mod list;
mod optimize;
pub(crate) mod root;
mod tree;

pub use iter::Keys;
pub use root::LockMode;

use std::collections::VecDeque;
use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::bucket::{self, Placed};
use crate::config::{DbKind, Filters, Options};
use crate::error::{Error, Result};
use crate::format::tag::{Tag, TagFile, TagKind};
use crate::format::{pack_uint, LENGTH_KEY, ROOT_OFFSET, SIGNATURE};
use crate::index;
use crate::record::{self, RawValue};
use crate::value::{PutOutcome, Value};

use root::{Flags, Root, State};

/// A handle to one composite inside a database file.
///
/// # Example
///
/// ```rust,no_run
/// use deepdb::{Db, Options, Value};
///
/// # fn main() -> Result<(), deepdb::Error> {
/// let db = Db::open("data.db", Options::default())?;
/// db.put("key1", "value1")?;
/// if let Some(Value::Bytes(v)) = db.get("key1")? {
///     println!("found {:?}", v);
/// }
/// # Ok(())
/// # }
/// ```
///
/// # Thread safety
///
/// Operations on a single handle are externally synchronized: the
/// engine serializes file access through its `Root`, but performs no
/// threading of its own. Cross-process sharing requires the `locking`
/// (and usually `autoflush`) options.
pub struct Db {
    base: u64,
    kind: TagKind,
    root: Arc<Root>,
}

/// One borrowed view of the open file, held for the duration of a
/// single public operation.
pub(crate) struct Session<'a> {
    pub f: TagFile<'a>,
    pub filters: &'a Filters,
}

impl Db {
    /// Opens the database at `path`, creating it if absent.
    ///
    /// A new file is stamped with the `DPDB` signature and an empty
    /// root of `options.kind`. For an existing file the signature is
    /// verified and the on-disk root kind wins over `options.kind`.
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Db> {
        options.validate()?;
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| Error::cannot_open(format!("{}: {}", path.display(), e)))?;
        Self::open_file(path, file, options)
    }

    fn open_file(path: PathBuf, mut file: std::fs::File, options: Options) -> Result<Db> {
        let cfg = options.file_config();
        let mut end = file.metadata()?.len();

        let kind = if end == 0 {
            let mut tf = TagFile { file: &mut file, end: &mut end, cfg: &cfg };
            tf.write_at(0, SIGNATURE)?;
            let kind = tag_kind(options.kind);
            let zeros = vec![0u8; cfg.index_size()];
            tf.create_tag(ROOT_OFFSET, kind, &zeros)?;
            kind
        } else {
            let end_snapshot = end;
            let mut tf = TagFile { file: &mut file, end: &mut end, cfg: &cfg };
            let found = tf.read_at(0, SIGNATURE.len().min(end_snapshot as usize))?;
            if found != SIGNATURE[..] {
                return Err(Error::SignatureMismatch { found });
            }
            let root_tag = tf
                .load_tag(ROOT_OFFSET)?
                .ok_or_else(|| Error::corruption("file has no root tag"))?;
            if !root_tag.kind.is_composite() {
                return Err(Error::corruption("root tag is not a map or list"));
            }
            root_tag.kind
        };

        let root = Arc::new(Root {
            path,
            cfg,
            flags: Flags {
                locking: options.locking,
                autoflush: options.autoflush,
                volatile: options.volatile,
                debug: options.debug,
            },
            filters: options.filters,
            kind,
            handles: AtomicUsize::new(1),
            state: parking_lot::Mutex::new(State {
                file: Some(file),
                end,
                lock_depth: 0,
                last_error: None,
            }),
        });

        Ok(Db { base: ROOT_OFFSET, kind, root })
    }

    /// The kind of the composite this handle points at.
    pub fn kind(&self) -> DbKind {
        db_kind(self.kind)
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &Path {
        &self.root.path
    }

    /// Current size of the database file in bytes.
    pub fn file_size(&self) -> Result<u64> {
        let r = self.with_session(false, |s| Ok(*s.f.end));
        self.record(r)
    }

    /// Message of the most recently recorded error, if any.
    pub fn last_error(&self) -> Option<String> {
        self.root.state.lock().last_error.clone()
    }

    /// Clears the recorded error message.
    pub fn clear_error(&self) {
        self.root.state.lock().last_error = None;
    }

    /// Takes the advisory file lock. Reentrant: nested calls only
    /// bump a depth counter; the OS lock is taken on the first.
    pub fn lock(&self, mode: LockMode) -> Result<()> {
        let mut st = self.root.state.lock();
        let r = self.root.lock_os(&mut st, mode);
        drop(st);
        self.record(r)
    }

    /// Releases one level of the advisory file lock.
    pub fn unlock(&self) {
        let mut st = self.root.state.lock();
        self.root.unlock_os(&mut st);
    }

    /// Stores `value` under `key`. Map handles only.
    ///
    /// `Value::Map` and `Value::List` seed a fresh child composite;
    /// `Value::Handle` re-inserts an existing composite of this file by
    /// reference, which may create an on-disk cycle.
    pub fn put(&self, key: impl AsRef<[u8]>, value: impl Into<Value>) -> Result<PutOutcome> {
        let r = self.put_inner(key.as_ref(), value.into());
        self.record(r)
    }

    fn put_inner(&self, key: &[u8], value: Value) -> Result<PutOutcome> {
        self.expect_kind(DbKind::Map)?;
        self.check_links(&value)?;
        let stored_key = self.root.filters.apply_store_key(key);
        self.with_session(true, |s| store_tree(s, self.base, stored_key, value, true))
    }

    /// Fetches the value under `key`. Map handles only.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Value>> {
        let r = self.get_inner(key.as_ref());
        self.record(r)
    }

    fn get_inner(&self, key: &[u8]) -> Result<Option<Value>> {
        self.expect_kind(DbKind::Map)?;
        let stored_key = self.root.filters.apply_store_key(key);
        let tag = self.with_session(false, |s| fetch_raw(s, self.base, &stored_key))?;
        match tag {
            Some(tag) => self.tag_to_value(&tag, true).map(Some),
            None => Ok(None),
        }
    }

    /// Whether `key` has a binding, null included. Map handles only.
    pub fn exists(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        let r = self.exists_inner(key.as_ref());
        self.record(r)
    }

    fn exists_inner(&self, key: &[u8]) -> Result<bool> {
        self.expect_kind(DbKind::Map)?;
        let stored_key = self.root.filters.apply_store_key(key);
        self.with_session(false, |s| exists_raw(s, self.base, &stored_key))
    }

    /// Removes `key`, returning its prior value. Map handles only.
    ///
    /// Only the bucket slot is removed; the record's bytes stay in the
    /// file until the next [`optimize`](Db::optimize).
    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<Option<Value>> {
        let r = self.delete_inner(key.as_ref());
        self.record(r)
    }

    fn delete_inner(&self, key: &[u8]) -> Result<Option<Value>> {
        self.expect_kind(DbKind::Map)?;
        let stored_key = self.root.filters.apply_store_key(key);
        let tag = self.with_session(true, |s| delete_raw(s, self.base, &stored_key))?;
        match tag {
            Some(tag) => self.tag_to_value(&tag, true).map(Some),
            None => Ok(None),
        }
    }

    /// Removes every entry of this composite by zeroing its own index
    /// node in place. Succeeds trivially on an empty composite.
    pub fn clear(&self) -> Result<()> {
        let r = self.with_session(true, |s| {
            let tag = s
                .f
                .load_tag(self.base)?
                .ok_or_else(|| Error::corruption("composite tag missing"))?;
            let zeros = vec![0u8; s.f.cfg.index_size()];
            s.f.write_at(tag.content_offset, &zeros)
        });
        self.record(r)
    }

    /// First key in digest order, or `None` for an empty map.
    /// Map handles only.
    pub fn first_key(&self) -> Result<Option<Vec<u8>>> {
        let r = self.first_key_inner();
        self.record(r)
    }

    fn first_key_inner(&self) -> Result<Option<Vec<u8>>> {
        self.expect_kind(DbKind::Map)?;
        let key = self.with_session(false, |s| index::first_key(&mut s.f, self.base))?;
        Ok(key.map(|k| self.root.filters.apply_fetch_key(&k)))
    }

    /// Key following `prev` in digest order, or `None` once enumeration
    /// is exhausted. Map handles only.
    pub fn next_key(&self, prev: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        let r = self.next_key_inner(prev.as_ref());
        self.record(r)
    }

    fn next_key_inner(&self, prev: &[u8]) -> Result<Option<Vec<u8>>> {
        self.expect_kind(DbKind::Map)?;
        let stored_prev = self.root.filters.apply_store_key(prev);
        let digest = self.root.cfg.digester.digest(&stored_prev);
        let key = self.with_session(false, |s| index::next_key(&mut s.f, self.base, &digest))?;
        Ok(key.map(|k| self.root.filters.apply_fetch_key(&k)))
    }

    // ------------------------------------------------------------------
    // Internals shared by the map, list, tree and optimize paths.
    // ------------------------------------------------------------------

    pub(crate) fn base(&self) -> u64 {
        self.base
    }

    pub(crate) fn root(&self) -> &Arc<Root> {
        &self.root
    }

    pub(crate) fn child(&self, base: u64, kind: TagKind) -> Db {
        self.root.handles.fetch_add(1, Ordering::SeqCst);
        Db { base, kind, root: Arc::clone(&self.root) }
    }

    pub(crate) fn expect_kind(&self, want: DbKind) -> Result<()> {
        let found = self.kind();
        if found == want {
            Ok(())
        } else {
            Err(Error::WrongKind { expected: want, found })
        }
    }

    /// Rejects values containing handles from another file.
    pub(crate) fn check_links(&self, value: &Value) -> Result<()> {
        let mut stack = vec![value];
        while let Some(v) = stack.pop() {
            match v {
                Value::Handle(h) => {
                    if !Arc::ptr_eq(&h.root, &self.root) {
                        return Err(Error::unsupported(
                            "cannot store a handle from another database file",
                        ));
                    }
                }
                Value::Map(entries) => stack.extend(entries.iter().map(|(_, v)| v)),
                Value::List(items) => stack.extend(items.iter()),
                _ => {}
            }
        }
        Ok(())
    }

    /// Converts a loaded value tag into a `Value`, materializing child
    /// handles for composites.
    pub(crate) fn tag_to_value(&self, tag: &Tag, filter: bool) -> Result<Value> {
        match tag.kind {
            TagKind::Data => {
                let bytes = if filter {
                    self.root.filters.apply_fetch_value(&tag.content)
                } else {
                    tag.content.to_vec()
                };
                Ok(Value::Bytes(bytes))
            }
            TagKind::Null => Ok(Value::Null),
            TagKind::Map | TagKind::List => {
                Ok(Value::Handle(self.child(tag.offset, tag.kind)))
            }
            _ => Err(Error::corruption("bucket slot points to a non-value tag")),
        }
    }

    /// Runs `op` against the open file under the advisory lock
    /// appropriate for `write`, refreshing the end-of-file offset first
    /// when locking or volatile mode demands it.
    pub(crate) fn with_session<T>(
        &self,
        write: bool,
        op: impl FnOnce(&mut Session<'_>) -> Result<T>,
    ) -> Result<T> {
        let root = &*self.root;
        let mode = if write { LockMode::Exclusive } else { LockMode::Shared };
        let mut st = root.state.lock();
        root.lock_os(&mut st, mode)?;

        let out = (|| {
            let State { file, end, .. } = &mut *st;
            let file = file
                .as_mut()
                .ok_or_else(|| Error::cannot_open("database file is closed"))?;
            if root.flags.locking || root.flags.volatile {
                *end = file.metadata()?.len();
            }
            let mut session = Session {
                f: TagFile { file, end, cfg: &root.cfg },
                filters: &root.filters,
            };
            let result = op(&mut session)?;
            if write && root.flags.autoflush {
                session.f.file.sync_data()?;
            }
            Ok(result)
        })();

        root.unlock_os(&mut st);
        out
    }

    /// Parks the message of a failed operation on the `Root`.
    pub(crate) fn record<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            let msg = err.to_string();
            if self.root.flags.debug {
                log::debug!("{}: {}", self.root.path.display(), msg);
            }
            self.root.state.lock().last_error = Some(msg);
        }
        result
    }

    /// Store straight through the insert path, bypassing kind checks
    /// and filters. Used by the compaction rebuild.
    pub(crate) fn raw_store(&self, base: u64, key: &[u8], raw: RawValue) -> Result<Placed> {
        self.with_session(true, |s| store_raw(s, base, key, &raw))
    }

    /// fsync the whole file.
    pub(crate) fn sync(&self) -> Result<()> {
        self.with_session(false, |s| {
            s.f.file.sync_all()?;
            Ok(())
        })
    }
}

impl Clone for Db {
    /// Returns a new handle on the same composite. Shares the `Root`
    /// (bumping the handle count); copies no data.
    fn clone(&self) -> Self {
        self.root.handles.fetch_add(1, Ordering::SeqCst);
        Db { base: self.base, kind: self.kind, root: Arc::clone(&self.root) }
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        if self.root.handles.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Last handle: close the file.
            self.root.state.lock().file = None;
        }
    }
}

impl PartialEq for Db {
    /// Handles are equal when they address the same composite of the
    /// same open file. Fetching the same child twice yields handles
    /// that are equal by this measure but distinct objects.
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base && Arc::ptr_eq(&self.root, &other.root)
    }
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("path", &self.root.path)
            .field("kind", &self.kind())
            .field("base", &self.base)
            .finish()
    }
}

fn tag_kind(kind: DbKind) -> TagKind {
    match kind {
        DbKind::Map => TagKind::Map,
        DbKind::List => TagKind::List,
    }
}

fn db_kind(kind: TagKind) -> DbKind {
    match kind {
        TagKind::Map => DbKind::Map,
        TagKind::List => DbKind::List,
        _ => unreachable!("handles only point at composite tags"),
    }
}

// ----------------------------------------------------------------------
// The uniform store/fetch path.
// ----------------------------------------------------------------------

/// One pending entry of a seeded store.
struct Seed {
    base: u64,
    key: Vec<u8>,
    value: Value,
    filter_value: bool,
}

/// Stores `value` under `key` in the composite at `base`, walking any
/// nested seeds with an explicit worklist so arbitrarily deep trees
/// cannot overflow the stack. Returns the outcome for the root entry.
pub(crate) fn store_tree(
    s: &mut Session<'_>,
    base: u64,
    key: Vec<u8>,
    value: Value,
    filter_value: bool,
) -> Result<PutOutcome> {
    let mut queue = VecDeque::new();
    queue.push_back(Seed { base, key, value, filter_value });

    let mut first = None;
    while let Some(seed) = queue.pop_front() {
        let outcome = store_seed(s, seed, &mut queue)?;
        first.get_or_insert(outcome);
    }
    Ok(first.expect("store worklist starts non-empty"))
}

fn store_seed(s: &mut Session<'_>, seed: Seed, queue: &mut VecDeque<Seed>) -> Result<PutOutcome> {
    let Seed { base, key, value, filter_value } = seed;
    let w = s.f.cfg.w();

    let placed = match value {
        Value::Bytes(bytes) => {
            let bytes = if filter_value {
                s.filters.apply_store_value(&bytes)
            } else {
                bytes
            };
            store_raw(s, base, &key, &RawValue::Bytes(bytes))?
        }
        Value::Null => store_raw(s, base, &key, &RawValue::Null)?,
        Value::Handle(handle) => store_raw(s, base, &key, &RawValue::LinkTo(handle.base()))?,
        Value::Map(entries) => {
            let placed = store_raw(s, base, &key, &RawValue::Empty(TagKind::Map))?;
            for (child_key, child_value) in entries {
                let child_key = s.filters.apply_store_key(&child_key);
                queue.push_back(Seed {
                    base: placed.target,
                    key: child_key,
                    value: child_value,
                    filter_value: true,
                });
            }
            placed
        }
        Value::List(items) => {
            let placed = store_raw(s, base, &key, &RawValue::Empty(TagKind::List))?;
            let count = items.len() as u64;
            for (i, item) in items.into_iter().enumerate() {
                queue.push_back(Seed {
                    base: placed.target,
                    key: pack_uint(i as u64, w),
                    value: item,
                    filter_value: true,
                });
            }
            queue.push_back(Seed {
                base: placed.target,
                key: LENGTH_KEY.to_vec(),
                value: Value::Bytes(pack_uint(count, w)),
                filter_value: false,
            });
            placed
        }
    };
    Ok(placed.outcome)
}

/// Settles a slot for `key` and writes its record if one is needed.
pub(crate) fn store_raw(
    s: &mut Session<'_>,
    base: u64,
    key: &[u8],
    raw: &RawValue,
) -> Result<Placed> {
    let digest = s.f.cfg.digester.digest(key);
    let path = index::find_bucket(&mut s.f, base, &digest, true)?
        .ok_or_else(|| Error::corruption("insert path could not be materialized"))?;
    let shape = raw.shape(s.f.cfg);
    let placed = bucket::add(&mut s.f, &path, &digest, &shape)?;
    if placed.write_record {
        record::write_raw(&mut s.f, placed.target, raw, key)?;
    }
    Ok(placed)
}

/// Loads the value tag bound to `key`, or `None`.
pub(crate) fn fetch_raw(s: &mut Session<'_>, base: u64, key: &[u8]) -> Result<Option<Tag>> {
    let digest = s.f.cfg.digester.digest(key);
    let path = match index::find_bucket(&mut s.f, base, &digest, false)? {
        Some(path) => path,
        None => return Ok(None),
    };
    match bucket::lookup(&path.bucket, s.f.cfg, &digest) {
        Some(offset) => {
            let tag = s
                .f
                .load_tag(offset)?
                .ok_or_else(|| Error::corruption("bucket slot points past end of file"))?;
            Ok(Some(tag))
        }
        None => Ok(None),
    }
}

/// Whether `key` has a binding.
pub(crate) fn exists_raw(s: &mut Session<'_>, base: u64, key: &[u8]) -> Result<bool> {
    let digest = s.f.cfg.digester.digest(key);
    match index::find_bucket(&mut s.f, base, &digest, false)? {
        Some(path) => Ok(bucket::lookup(&path.bucket, s.f.cfg, &digest).is_some()),
        None => Ok(false),
    }
}

/// Removes the binding for `key`, returning the value tag it held.
pub(crate) fn delete_raw(s: &mut Session<'_>, base: u64, key: &[u8]) -> Result<Option<Tag>> {
    let digest = s.f.cfg.digester.digest(key);
    let path = match index::find_bucket(&mut s.f, base, &digest, false)? {
        Some(path) => path,
        None => return Ok(None),
    };
    let offset = match bucket::lookup(&path.bucket, s.f.cfg, &digest) {
        Some(offset) => offset,
        None => return Ok(None),
    };
    let tag = s
        .f
        .load_tag(offset)?
        .ok_or_else(|| Error::corruption("bucket slot points past end of file"))?;
    bucket::delete(&mut s.f, &path.bucket, &digest)?;
    Ok(Some(tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn open_map(dir: &TempDir) -> Db {
        Db::open(dir.path().join("test.db"), Options::default()).unwrap()
    }

    #[test]
    fn test_put_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let db = open_map(&dir);

        assert_eq!(db.put("key1", "value1").unwrap(), PutOutcome::Inserted);
        assert_eq!(db.get("key1").unwrap(), Some(Value::from("value1")));
        assert_eq!(db.get("missing").unwrap(), None);
    }

    #[test]
    fn test_replace_returns_replaced() {
        let dir = TempDir::new().unwrap();
        let db = open_map(&dir);

        assert_eq!(db.put("k", "v1").unwrap(), PutOutcome::Inserted);
        assert_eq!(db.put("k", "v2").unwrap(), PutOutcome::Replaced);
        assert_eq!(db.get("k").unwrap(), Some(Value::from("v2")));
    }

    #[test]
    fn test_in_place_replace_keeps_file_size() {
        let dir = TempDir::new().unwrap();
        let db = open_map(&dir);

        db.put("k", "a-long-first-value").unwrap();
        let before = db.file_size().unwrap();
        db.put("k", "short").unwrap();
        assert_eq!(db.file_size().unwrap(), before);
    }

    #[test]
    fn test_null_is_distinct_from_absent() {
        let dir = TempDir::new().unwrap();
        let db = open_map(&dir);

        db.put("k", Value::Null).unwrap();
        assert!(db.exists("k").unwrap());
        assert_eq!(db.get("k").unwrap(), Some(Value::Null));

        assert!(!db.exists("missing").unwrap());
        assert_eq!(db.get("missing").unwrap(), None);
    }

    #[test]
    fn test_delete_returns_prior_value() {
        let dir = TempDir::new().unwrap();
        let db = open_map(&dir);

        db.put("k", "v").unwrap();
        assert_eq!(db.delete("k").unwrap(), Some(Value::from("v")));
        assert_eq!(db.get("k").unwrap(), None);
        assert_eq!(db.delete("k").unwrap(), None);

        // Delete then re-insert.
        db.put("k", "v2").unwrap();
        assert_eq!(db.get("k").unwrap(), Some(Value::from("v2")));
    }

    #[test]
    fn test_nested_map_seed() {
        let dir = TempDir::new().unwrap();
        let db = open_map(&dir);

        db.put(
            "outer",
            Value::Map(vec![
                (b"inner".to_vec(), Value::from("deep")),
                (b"n".to_vec(), Value::Null),
            ]),
        )
        .unwrap();

        let child = db.get("outer").unwrap().unwrap().into_handle().unwrap();
        assert_eq!(child.kind(), DbKind::Map);
        assert_eq!(child.get("inner").unwrap(), Some(Value::from("deep")));
        assert_eq!(child.get("n").unwrap(), Some(Value::Null));
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let dir = TempDir::new().unwrap();
        let db = Db::open(
            dir.path().join("list.db"),
            Options::new().kind(DbKind::List),
        )
        .unwrap();

        let err = db.put("k", "v").unwrap_err();
        assert!(matches!(err, Error::WrongKind { .. }));
        assert!(db.last_error().unwrap().contains("Wrong handle kind"));
    }

    #[test]
    fn test_signature_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bogus.db");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"GIF89a not a database")
            .unwrap();

        let err = Db::open(&path, Options::default()).unwrap_err();
        assert!(matches!(err, Error::SignatureMismatch { .. }));
    }

    #[test]
    fn test_existing_root_kind_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        {
            let db = Db::open(&path, Options::default()).unwrap();
            db.put("k", "v").unwrap();
        }
        let reopened = Db::open(&path, Options::new().kind(DbKind::List)).unwrap();
        assert_eq!(reopened.kind(), DbKind::Map);
        assert_eq!(reopened.get("k").unwrap(), Some(Value::from("v")));
    }

    #[test]
    fn test_first_next_key_enumeration() {
        let dir = TempDir::new().unwrap();
        let db = open_map(&dir);

        let mut expected: Vec<Vec<u8>> = Vec::new();
        for i in 0..50 {
            let key = format!("key{:02}", i).into_bytes();
            db.put(&key, format!("v{}", i)).unwrap();
            expected.push(key);
        }

        let mut seen = Vec::new();
        let mut key = db.first_key().unwrap();
        while let Some(k) = key {
            seen.push(k.clone());
            key = db.next_key(&k).unwrap();
        }

        seen.sort();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_clear_empties_map() {
        let dir = TempDir::new().unwrap();
        let db = open_map(&dir);

        // Clearing a never-written map succeeds trivially.
        db.clear().unwrap();

        db.put("a", "1").unwrap();
        db.put("b", "2").unwrap();
        db.clear().unwrap();
        assert_eq!(db.first_key().unwrap(), None);
        assert!(!db.exists("a").unwrap());
    }

    #[test]
    fn test_self_referential_handle() {
        let dir = TempDir::new().unwrap();
        let db = open_map(&dir);

        db.put("child", Value::Map(vec![])).unwrap();
        let child = db.get("child").unwrap().unwrap().into_handle().unwrap();

        // Insert the child under itself: an on-disk cycle.
        child.put("loop", child.clone()).unwrap();
        let looped = child.get("loop").unwrap().unwrap().into_handle().unwrap();
        assert_eq!(looped, child);
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let dir = TempDir::new().unwrap();
        let db1 = Db::open(dir.path().join("one.db"), Options::default()).unwrap();
        let db2 = Db::open(dir.path().join("two.db"), Options::default()).unwrap();

        db2.put("child", Value::Map(vec![])).unwrap();
        let foreign = db2.get("child").unwrap().unwrap().into_handle().unwrap();

        let err = db1.put("k", foreign).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn test_handle_count_closes_file() {
        let dir = TempDir::new().unwrap();
        let db = open_map(&dir);
        db.put("k", "v").unwrap();

        let child_handle = db.clone();
        drop(db);
        // The clone keeps the file open.
        assert_eq!(child_handle.get("k").unwrap(), Some(Value::from("v")));
    }

    #[test]
    fn test_filters_roundtrip() {
        let dir = TempDir::new().unwrap();
        let opts = Options::new()
            .filter_store_key(Arc::new(|k: &[u8]| k.to_ascii_uppercase()))
            .filter_fetch_key(Arc::new(|k: &[u8]| k.to_ascii_lowercase()))
            .filter_store_value(Arc::new(|v: &[u8]| {
                let mut out = v.to_vec();
                out.reverse();
                out
            }))
            .filter_fetch_value(Arc::new(|v: &[u8]| {
                let mut out = v.to_vec();
                out.reverse();
                out
            }));
        let db = Db::open(dir.path().join("filtered.db"), opts).unwrap();

        db.put("key", "value").unwrap();
        assert_eq!(db.get("key").unwrap(), Some(Value::from("value")));
        assert_eq!(db.first_key().unwrap(), Some(b"key".to_vec()));
        assert_eq!(db.next_key(b"key").unwrap(), None);
    }

    #[test]
    fn test_empty_key_and_empty_value() {
        let dir = TempDir::new().unwrap();
        let db = open_map(&dir);

        db.put("", "").unwrap();
        assert!(db.exists("").unwrap());
        assert_eq!(db.get("").unwrap(), Some(Value::Bytes(vec![])));
        assert_eq!(db.first_key().unwrap(), Some(Vec::new()));
    }
}
