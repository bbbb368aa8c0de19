//! List semantics, emulated over the map machinery.
//!
//! A list is a map whose keys are packed big-endian integer indices,
//! plus one reserved entry under the literal key `"length"` holding the
//! logical length. Index keys and the length entry bypass the filter
//! callbacks.

use crate::config::DbKind;
use crate::db::{delete_raw, exists_raw, fetch_raw, store_raw, store_tree, Db, Session};
use crate::error::{Error, Result};
use crate::format::tag::TagKind;
use crate::format::{pack_uint, unpack_uint, LENGTH_KEY};
use crate::record::RawValue;
use crate::value::{PutOutcome, Value};

/// Reads the logical length; an absent entry means zero.
fn read_len(s: &mut Session<'_>, base: u64) -> Result<u64> {
    match fetch_raw(s, base, LENGTH_KEY)? {
        Some(tag) if tag.kind == TagKind::Data => {
            let w = s.f.cfg.w();
            if (tag.size as usize) < w {
                return Err(Error::corruption("list length entry is too short"));
            }
            Ok(unpack_uint(&tag.content, w))
        }
        Some(_) => Err(Error::corruption("list length entry is not scalar")),
        None => Ok(0),
    }
}

fn write_len(s: &mut Session<'_>, base: u64, len: u64) -> Result<()> {
    let w = s.f.cfg.w();
    store_raw(s, base, LENGTH_KEY, &RawValue::Bytes(pack_uint(len, w)))?;
    Ok(())
}

/// Resolves a possibly negative index for a read. Out of range means
/// the element is simply absent.
fn resolve_read(index: i64, len: u64) -> Option<u64> {
    if index >= 0 {
        Some(index as u64)
    } else {
        let back = index.unsigned_abs();
        if back <= len {
            Some(len - back)
        } else {
            None
        }
    }
}

/// Resolves a possibly negative index for a write. Falling below
/// element zero is an error: there is no subscript to create there.
fn resolve_write(index: i64, len: u64) -> Result<u64> {
    resolve_read(index, len).ok_or(Error::NonCreatableSubscript(index))
}

/// Copies the element at `from` over the element at `to`, preserving
/// composite identity: scalars are rewritten, composites are re-linked
/// by offset.
fn copy_slot(s: &mut Session<'_>, base: u64, from: u64, to: u64) -> Result<()> {
    let w = s.f.cfg.w();
    let raw = match fetch_raw(s, base, &pack_uint(from, w))? {
        None => RawValue::Null,
        Some(tag) => match tag.kind {
            TagKind::Data => RawValue::Bytes(tag.content.to_vec()),
            TagKind::Null => RawValue::Null,
            TagKind::Map | TagKind::List => RawValue::LinkTo(tag.offset),
            _ => return Err(Error::corruption("list slot points to a non-value tag")),
        },
    };
    store_raw(s, base, &pack_uint(to, w), &raw)?;
    Ok(())
}

impl Db {
    /// The logical length of the list.
    pub fn len(&self) -> Result<u64> {
        let r = self.len_inner();
        self.record(r)
    }

    fn len_inner(&self) -> Result<u64> {
        self.expect_kind(DbKind::List)?;
        self.with_session(false, |s| read_len(s, self.base()))
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Fetches the element at `index`. Negative indices count back from
    /// the end; out-of-range indices are absent.
    pub fn get_at(&self, index: i64) -> Result<Option<Value>> {
        let r = self.get_at_inner(index);
        self.record(r)
    }

    fn get_at_inner(&self, index: i64) -> Result<Option<Value>> {
        self.expect_kind(DbKind::List)?;
        let tag = self.with_session(false, |s| {
            let len = read_len(s, self.base())?;
            let idx = match resolve_read(index, len) {
                Some(idx) => idx,
                None => return Ok(None),
            };
            let w = s.f.cfg.w();
            fetch_raw(s, self.base(), &pack_uint(idx, w))
        })?;
        match tag {
            Some(tag) => self.tag_to_value(&tag, true).map(Some),
            None => Ok(None),
        }
    }

    /// Stores `value` at `index`, growing the length when a new element
    /// lands at or past the current end. A negative index resolving
    /// below element zero fails.
    pub fn put_at(&self, index: i64, value: impl Into<Value>) -> Result<PutOutcome> {
        let r = self.put_at_inner(index, value.into());
        self.record(r)
    }

    fn put_at_inner(&self, index: i64, value: Value) -> Result<PutOutcome> {
        self.expect_kind(DbKind::List)?;
        self.check_links(&value)?;
        self.with_session(true, |s| {
            let len = read_len(s, self.base())?;
            let idx = resolve_write(index, len)?;
            let w = s.f.cfg.w();
            let outcome = store_tree(s, self.base(), pack_uint(idx, w), value, true)?;
            if outcome == PutOutcome::Inserted && idx >= len {
                write_len(s, self.base(), idx + 1)?;
            }
            Ok(outcome)
        })
    }

    /// Whether the element at `index` exists.
    pub fn exists_at(&self, index: i64) -> Result<bool> {
        let r = self.exists_at_inner(index);
        self.record(r)
    }

    fn exists_at_inner(&self, index: i64) -> Result<bool> {
        self.expect_kind(DbKind::List)?;
        self.with_session(false, |s| {
            let len = read_len(s, self.base())?;
            let idx = match resolve_read(index, len) {
                Some(idx) => idx,
                None => return Ok(false),
            };
            let w = s.f.cfg.w();
            exists_raw(s, self.base(), &pack_uint(idx, w))
        })
    }

    /// Removes the element at `index`, returning it. Leaves a hole; the
    /// length and the other elements are untouched.
    pub fn delete_at(&self, index: i64) -> Result<Option<Value>> {
        let r = self.delete_at_inner(index);
        self.record(r)
    }

    fn delete_at_inner(&self, index: i64) -> Result<Option<Value>> {
        self.expect_kind(DbKind::List)?;
        let tag = self.with_session(true, |s| {
            let len = read_len(s, self.base())?;
            let idx = match resolve_read(index, len) {
                Some(idx) => idx,
                None => return Ok(None),
            };
            let w = s.f.cfg.w();
            delete_raw(s, self.base(), &pack_uint(idx, w))
        })?;
        match tag {
            Some(tag) => self.tag_to_value(&tag, true).map(Some),
            None => Ok(None),
        }
    }

    /// Appends `values`, returning the new length.
    pub fn push<I>(&self, values: I) -> Result<u64>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let r = self.push_inner(values);
        self.record(r)
    }

    fn push_inner(&self, values: Vec<Value>) -> Result<u64> {
        self.expect_kind(DbKind::List)?;
        for value in &values {
            self.check_links(value)?;
        }
        self.with_session(true, |s| {
            let mut len = read_len(s, self.base())?;
            let w = s.f.cfg.w();
            for value in values {
                store_tree(s, self.base(), pack_uint(len, w), value, true)?;
                len += 1;
            }
            write_len(s, self.base(), len)?;
            Ok(len)
        })
    }

    /// Removes and returns the last element.
    pub fn pop(&self) -> Result<Option<Value>> {
        let r = self.pop_inner();
        self.record(r)
    }

    fn pop_inner(&self) -> Result<Option<Value>> {
        self.expect_kind(DbKind::List)?;
        let tag = self.with_session(true, |s| {
            let len = read_len(s, self.base())?;
            if len == 0 {
                return Ok(None);
            }
            let w = s.f.cfg.w();
            let tag = delete_raw(s, self.base(), &pack_uint(len - 1, w))?;
            write_len(s, self.base(), len - 1)?;
            Ok(tag)
        })?;
        match tag {
            Some(tag) => self.tag_to_value(&tag, true).map(Some),
            None => Ok(None),
        }
    }

    /// Removes and returns the first element, shifting the rest down.
    pub fn shift(&self) -> Result<Option<Value>> {
        let r = self.shift_inner();
        self.record(r)
    }

    fn shift_inner(&self) -> Result<Option<Value>> {
        self.expect_kind(DbKind::List)?;
        let tag = self.with_session(true, |s| {
            let len = read_len(s, self.base())?;
            if len == 0 {
                return Ok(None);
            }
            let w = s.f.cfg.w();
            let first = fetch_raw(s, self.base(), &pack_uint(0, w))?;
            for i in 0..len - 1 {
                copy_slot(s, self.base(), i + 1, i)?;
            }
            delete_raw(s, self.base(), &pack_uint(len - 1, w))?;
            write_len(s, self.base(), len - 1)?;
            Ok(first)
        })?;
        match tag {
            Some(tag) => self.tag_to_value(&tag, true).map(Some),
            None => Ok(None),
        }
    }

    /// Prepends `values`, shifting existing elements up. Returns the
    /// new length.
    pub fn unshift<I>(&self, values: I) -> Result<u64>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let r = self.unshift_inner(values);
        self.record(r)
    }

    fn unshift_inner(&self, values: Vec<Value>) -> Result<u64> {
        self.expect_kind(DbKind::List)?;
        for value in &values {
            self.check_links(value)?;
        }
        self.with_session(true, |s| {
            let len = read_len(s, self.base())?;
            let count = values.len() as u64;
            if count == 0 {
                return Ok(len);
            }
            for i in (0..len).rev() {
                copy_slot(s, self.base(), i, i + count)?;
            }
            let w = s.f.cfg.w();
            for (j, value) in values.into_iter().enumerate() {
                store_tree(s, self.base(), pack_uint(j as u64, w), value, true)?;
            }
            write_len(s, self.base(), len + count)?;
            Ok(len + count)
        })
    }

    /// Replaces `remove` elements starting at `offset` with `insert`,
    /// shifting the tail as needed. Returns the removed elements.
    /// A negative `offset` counts back from the end; one resolving
    /// below element zero fails.
    pub fn splice<I>(&self, offset: i64, remove: u64, insert: I) -> Result<Vec<Value>>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let insert: Vec<Value> = insert.into_iter().map(Into::into).collect();
        let r = self.splice_inner(offset, remove, insert);
        self.record(r)
    }

    fn splice_inner(&self, offset: i64, remove: u64, insert: Vec<Value>) -> Result<Vec<Value>> {
        self.expect_kind(DbKind::List)?;
        for value in &insert {
            self.check_links(value)?;
        }
        let tags = self.with_session(true, |s| {
            let len = read_len(s, self.base())?;
            let start = if offset >= 0 {
                (offset as u64).min(len)
            } else {
                let back = offset.unsigned_abs();
                if back > len {
                    return Err(Error::NonCreatableSubscript(offset));
                }
                len - back
            };
            let remove = remove.min(len - start);
            let added = insert.len() as u64;
            let w = s.f.cfg.w();

            // Gather the removed range before anything moves.
            let mut removed = Vec::with_capacity(remove as usize);
            for i in start..start + remove {
                removed.push(fetch_raw(s, self.base(), &pack_uint(i, w))?);
            }

            if added > remove {
                let delta = added - remove;
                for i in (start + remove..len).rev() {
                    copy_slot(s, self.base(), i, i + delta)?;
                }
            } else if added < remove {
                let delta = remove - added;
                for i in start + remove..len {
                    copy_slot(s, self.base(), i, i - delta)?;
                }
                for i in len - delta..len {
                    delete_raw(s, self.base(), &pack_uint(i, w))?;
                }
            }

            for (j, value) in insert.into_iter().enumerate() {
                store_tree(s, self.base(), pack_uint(start + j as u64, w), value, true)?;
            }
            write_len(s, self.base(), len + added - remove)?;
            Ok(removed)
        })?;

        tags.into_iter()
            .map(|tag| match tag {
                Some(tag) => self.tag_to_value(&tag, true),
                None => Ok(Value::Null),
            })
            .collect()
    }
}
