//! Tag framing: the header shared by every record in a database file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use bytes::Bytes;

use crate::config::FileConfig;
use crate::error::{Error, Result};
use crate::format::{pack_uint, unpack_uint};

/// Kind byte of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TagKind {
    /// Map root or child map. Payload is an index node.
    Map = b'H',
    /// List root or child list. Payload is an index node.
    List = b'A',
    /// Interior index node of the digest trie.
    Index = b'I',
    /// Bucket list: the leaf of the digest trie.
    Buckets = b'B',
    /// Scalar bytes value.
    Data = b'D',
    /// Null value. Payload is empty.
    Null = b'N',
}

impl TagKind {
    /// Convert from the on-disk kind byte.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            b'H' => Ok(TagKind::Map),
            b'A' => Ok(TagKind::List),
            b'I' => Ok(TagKind::Index),
            b'B' => Ok(TagKind::Buckets),
            b'D' => Ok(TagKind::Data),
            b'N' => Ok(TagKind::Null),
            _ => Err(Error::corruption(format!("invalid tag kind: {:#04x}", value))),
        }
    }

    /// Whether this tag roots a composite (map or list).
    pub fn is_composite(self) -> bool {
        matches!(self, TagKind::Map | TagKind::List)
    }
}

/// A loaded tag: the universal framing record.
#[derive(Debug, Clone)]
pub struct Tag {
    /// Kind byte.
    pub kind: TagKind,
    /// Absolute offset of the kind byte.
    pub offset: u64,
    /// Payload length.
    pub size: u64,
    /// Absolute offset of the first payload byte (`offset + 1 + W`).
    pub content_offset: u64,
    /// The payload.
    pub content: Bytes,
}

/// Raw tag-level access to an open database file.
///
/// Tracks the end-of-file offset: any write that extends the file
/// advances `end`, so `end` always equals the on-disk size.
pub(crate) struct TagFile<'a> {
    pub file: &'a mut File,
    pub end: &'a mut u64,
    pub cfg: &'a FileConfig,
}

impl TagFile<'_> {
    /// Writes `data` at `offset`, advancing `end` past any new bytes.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let extent = offset + data.len() as u64;
        if extent > self.cfg.offset_width.max_offset() {
            return Err(Error::corruption(
                "write would exceed the file's offset width",
            ));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        if extent > *self.end {
            *self.end = extent;
        }
        Ok(())
    }

    /// Reads exactly `len` bytes at `offset`.
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Writes a tag at `offset` and returns it.
    pub fn create_tag(&mut self, offset: u64, kind: TagKind, content: &[u8]) -> Result<Tag> {
        let w = self.cfg.w();
        let mut buf = Vec::with_capacity(1 + w + content.len());
        buf.push(kind as u8);
        buf.extend_from_slice(&pack_uint(content.len() as u64, w));
        buf.extend_from_slice(content);
        self.write_at(offset, &buf)?;

        Ok(Tag {
            kind,
            offset,
            size: content.len() as u64,
            content_offset: offset + 1 + w as u64,
            content: Bytes::copy_from_slice(content),
        })
    }

    /// Loads the tag at `offset`, or `None` if the offset is at or past
    /// the end of the file.
    pub fn load_tag(&mut self, offset: u64) -> Result<Option<Tag>> {
        if offset >= *self.end {
            return Ok(None);
        }
        let w = self.cfg.w();
        let header = self.read_at(offset, 1 + w)?;
        let kind = TagKind::from_u8(header[0])?;
        let size = unpack_uint(&header[1..], w);
        let content = self.read_at(offset + 1 + w as u64, size as usize)?;

        Ok(Some(Tag {
            kind,
            offset,
            size,
            content_offset: offset + 1 + w as u64,
            content: Bytes::from(content),
        }))
    }
}
