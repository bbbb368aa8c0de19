//! Value records: the tagged payload plus plain-key trailer written for
//! every stored entry.
//!
//! ```text
//! [kind: D|N|H|A][payload_len: W][payload][key_len: W][plain key]
//! ```
//!
//! The plain key trails the value because reads return values; the key
//! is only read back during enumeration.

use crate::bucket::ValueShape;
use crate::error::{Error, Result};
use crate::format::tag::{TagFile, TagKind};
use crate::format::{pack_uint, unpack_uint};

/// A value in its lowest on-disk form: no nesting, no filtering.
#[derive(Debug, Clone)]
pub(crate) enum RawValue {
    /// Scalar bytes, stored exactly as given.
    Bytes(Vec<u8>),
    /// Null.
    Null,
    /// A fresh, empty child composite of the given kind.
    Empty(TagKind),
    /// A reference to the existing value record at this offset.
    LinkTo(u64),
}

impl RawValue {
    pub fn shape(&self, cfg: &crate::config::FileConfig) -> ValueShape {
        match self {
            RawValue::Bytes(b) => ValueShape::Data { len: b.len() as u64 },
            RawValue::Null => ValueShape::Null,
            RawValue::Empty(_) => ValueShape::Composite,
            RawValue::LinkTo(target) => ValueShape::Link { target: *target },
        }
    }
}

/// Writes the record for `raw` at `offset`, trailer included.
///
/// Links write nothing; their record already exists.
pub(crate) fn write_raw(
    f: &mut TagFile<'_>,
    offset: u64,
    raw: &RawValue,
    plain_key: &[u8],
) -> Result<()> {
    match raw {
        RawValue::Bytes(bytes) => write_record(f, offset, TagKind::Data, bytes, plain_key),
        RawValue::Null => write_record(f, offset, TagKind::Null, &[], plain_key),
        RawValue::Empty(kind) => {
            let zeros = vec![0u8; f.cfg.index_size()];
            write_record(f, offset, *kind, &zeros, plain_key)
        }
        RawValue::LinkTo(_) => Ok(()),
    }
}

fn write_record(
    f: &mut TagFile<'_>,
    offset: u64,
    kind: TagKind,
    payload: &[u8],
    plain_key: &[u8],
) -> Result<()> {
    let w = f.cfg.w();
    let tag = f.create_tag(offset, kind, payload)?;

    let mut trailer = Vec::with_capacity(w + plain_key.len());
    trailer.extend_from_slice(&pack_uint(plain_key.len() as u64, w));
    trailer.extend_from_slice(plain_key);
    f.write_at(tag.content_offset + tag.size, &trailer)
}

/// Reads the plain key stored after the value record at `offset`.
pub(crate) fn plain_key(f: &mut TagFile<'_>, offset: u64) -> Result<Vec<u8>> {
    let w = f.cfg.w();
    let tag = f
        .load_tag(offset)?
        .ok_or_else(|| Error::corruption("value record offset points past end of file"))?;

    let key_at = tag.content_offset + tag.size;
    let len = unpack_uint(&f.read_at(key_at, w)?, w);
    if key_at + w as u64 + len > *f.end {
        return Err(Error::corruption("plain key trailer extends past end of file"));
    }
    f.read_at(key_at + w as u64, len as usize)
}
