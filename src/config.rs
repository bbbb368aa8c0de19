//! Configuration options for DeepDB.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::format::{INDEX_SLOTS, MAX_BUCKETS};
use crate::index::Digester;

/// The logical kind of a composite: a map or an ordered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    /// Unordered key/value map.
    Map,
    /// 0-based ordered list.
    List,
}

/// Width of the big-endian offsets and lengths stored in a file.
///
/// Fixed when a file is created and must be supplied unchanged on every
/// subsequent open; the file itself does not record it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetWidth {
    /// 4-byte offsets (files up to 4 GiB).
    U32,
    /// 8-byte offsets.
    U64,
}

impl OffsetWidth {
    /// Number of bytes one packed integer occupies on disk.
    pub fn bytes(self) -> usize {
        match self {
            OffsetWidth::U32 => 4,
            OffsetWidth::U64 => 8,
        }
    }

    /// Largest offset representable at this width.
    pub fn max_offset(self) -> u64 {
        match self {
            OffsetWidth::U32 => u32::MAX as u64,
            OffsetWidth::U64 => u64::MAX,
        }
    }
}

/// Per-file format parameters, fixed for the lifetime of the file.
#[derive(Debug, Clone)]
pub struct FileConfig {
    /// Width of packed offsets and lengths.
    pub offset_width: OffsetWidth,
    /// Digest function used to index keys.
    pub digester: Digester,
}

impl FileConfig {
    /// Offset width in bytes.
    pub(crate) fn w(&self) -> usize {
        self.offset_width.bytes()
    }

    /// Payload size of an index node: 256 slots of one offset each.
    pub(crate) fn index_size(&self) -> usize {
        INDEX_SLOTS * self.w()
    }

    /// Payload size of a bucket list.
    pub(crate) fn bucket_size(&self) -> usize {
        MAX_BUCKETS * self.slot_size()
    }

    /// Size of one bucket slot: digest followed by one offset.
    pub(crate) fn slot_size(&self) -> usize {
        self.digester.size() + self.w()
    }
}

/// A user-supplied transform applied to keys or scalar values.
pub type FilterFn = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// The four optional filter callbacks.
///
/// Filters apply to map keys and scalar values only. Packed list index
/// keys and the reserved list length entry always bypass them. Filters
/// are process-local; nothing about them is persisted.
#[derive(Clone, Default)]
pub struct Filters {
    /// Applied to a map key before it is digested and stored.
    pub store_key: Option<FilterFn>,
    /// Applied to a scalar value before it is stored.
    pub store_value: Option<FilterFn>,
    /// Applied to a map key as it is returned from enumeration.
    pub fetch_key: Option<FilterFn>,
    /// Applied to a scalar value as it is fetched.
    pub fetch_value: Option<FilterFn>,
}

impl Filters {
    pub(crate) fn apply_store_key(&self, key: &[u8]) -> Vec<u8> {
        match &self.store_key {
            Some(f) => f(key),
            None => key.to_vec(),
        }
    }

    pub(crate) fn apply_store_value(&self, value: &[u8]) -> Vec<u8> {
        match &self.store_value {
            Some(f) => f(value),
            None => value.to_vec(),
        }
    }

    pub(crate) fn apply_fetch_key(&self, key: &[u8]) -> Vec<u8> {
        match &self.fetch_key {
            Some(f) => f(key),
            None => key.to_vec(),
        }
    }

    pub(crate) fn apply_fetch_value(&self, value: &[u8]) -> Vec<u8> {
        match &self.fetch_value {
            Some(f) => f(value),
            None => value.to_vec(),
        }
    }
}

impl fmt::Debug for Filters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filters")
            .field("store_key", &self.store_key.is_some())
            .field("store_value", &self.store_value.is_some())
            .field("fetch_key", &self.fetch_key.is_some())
            .field("fetch_value", &self.fetch_value.is_some())
            .finish()
    }
}

/// Open-time options for a database.
#[derive(Debug, Clone)]
pub struct Options {
    /// Root kind for a newly created file. Ignored when the file already
    /// exists; the on-disk root tag is authoritative.
    /// Default: `DbKind::Map`
    pub kind: DbKind,

    /// Take advisory OS file locks around every operation.
    /// Default: false
    pub locking: bool,

    /// fsync the file after every completed write operation.
    /// Default: false
    pub autoflush: bool,

    /// Re-read the file size before operations without taking OS locks.
    /// Default: false
    pub volatile: bool,

    /// Log every recorded error to the diagnostic channel.
    /// Default: false
    pub debug: bool,

    /// Width of on-disk offsets. Must match the width the file was
    /// created with.
    /// Default: `OffsetWidth::U32`
    pub offset_width: OffsetWidth,

    /// Digest function used to index keys. Must match the function the
    /// file was created with.
    /// Default: MD5
    pub digester: Digester,

    /// Optional key/value transform callbacks.
    pub filters: Filters,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            kind: DbKind::Map,
            locking: false,
            autoflush: false,
            volatile: false,
            debug: false,
            offset_width: OffsetWidth::U32,
            digester: Digester::md5(),
            filters: Filters::default(),
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the root kind for a newly created file.
    pub fn kind(mut self, kind: DbKind) -> Self {
        self.kind = kind;
        self
    }

    /// Enables or disables advisory file locking.
    pub fn locking(mut self, value: bool) -> Self {
        self.locking = value;
        self
    }

    /// Enables or disables fsync-per-write.
    pub fn autoflush(mut self, value: bool) -> Self {
        self.autoflush = value;
        self
    }

    /// Enables or disables lockless end-of-file refresh.
    pub fn volatile(mut self, value: bool) -> Self {
        self.volatile = value;
        self
    }

    /// Enables or disables diagnostic logging of recorded errors.
    pub fn debug(mut self, value: bool) -> Self {
        self.debug = value;
        self
    }

    /// Sets the on-disk offset width.
    pub fn offset_width(mut self, width: OffsetWidth) -> Self {
        self.offset_width = width;
        self
    }

    /// Sets the key digest function.
    pub fn digester(mut self, digester: Digester) -> Self {
        self.digester = digester;
        self
    }

    /// Sets the filter applied to map keys on store.
    pub fn filter_store_key(mut self, f: FilterFn) -> Self {
        self.filters.store_key = Some(f);
        self
    }

    /// Sets the filter applied to scalar values on store.
    pub fn filter_store_value(mut self, f: FilterFn) -> Self {
        self.filters.store_value = Some(f);
        self
    }

    /// Sets the filter applied to map keys on fetch.
    pub fn filter_fetch_key(mut self, f: FilterFn) -> Self {
        self.filters.fetch_key = Some(f);
        self
    }

    /// Sets the filter applied to scalar values on fetch.
    pub fn filter_fetch_value(mut self, f: FilterFn) -> Self {
        self.filters.fetch_value = Some(f);
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> Result<()> {
        let size = self.digester.size();
        if size < 2 {
            return Err(Error::unsupported("digest size must be at least 2 bytes"));
        }
        if size > 64 {
            return Err(Error::unsupported("digest size must be at most 64 bytes"));
        }
        Ok(())
    }

    pub(crate) fn file_config(&self) -> FileConfig {
        FileConfig {
            offset_width: self.offset_width,
            digester: self.digester.clone(),
        }
    }
}
