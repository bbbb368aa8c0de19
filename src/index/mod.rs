//! The digest index: a trie of 256-way index nodes keyed by successive
//! bytes of a key's digest, terminating in bucket lists.
//!
//! Every composite tag (`H`, `A`) doubles as the root index node of its
//! own trie. Interior nodes are `I` tags; leaves are `B` bucket lists.
//! A slot value of zero means the subtree is absent.

pub mod digest;

pub use digest::Digester;

use crate::bucket;
use crate::error::{Error, Result};
use crate::format::tag::{Tag, TagFile, TagKind};
use crate::format::{pack_uint, unpack_uint, INDEX_SLOTS};
use crate::record;

/// One step of a trie walk: the index node whose slot was consumed.
#[derive(Debug, Clone)]
pub(crate) struct Step {
    /// The index node (root `H`/`A` tag or interior `I` tag).
    pub node: Tag,
    /// The digest byte that selected the slot.
    pub byte: u8,
    /// Absolute file offset of the consumed slot, for later rewrites.
    pub ref_loc: u64,
}

/// Result of walking a digest from a composite root.
#[derive(Debug)]
pub(crate) struct Walk {
    /// Index nodes consumed, outermost first. Never empty.
    pub steps: Vec<Step>,
    /// The bucket list reached, if the walk did not hit a zero slot.
    pub bucket: Option<Tag>,
}

/// A walk that reached (or materialized) a bucket list.
#[derive(Debug)]
pub(crate) struct BucketPath {
    pub steps: Vec<Step>,
    pub bucket: Tag,
}

impl BucketPath {
    /// Index depth at which the bucket list lives: the number of digest
    /// bytes consumed minus one.
    pub fn depth(&self) -> usize {
        self.steps.len() - 1
    }
}

/// Reads the offset stored in slot `byte` of an index node.
fn slot_value(node: &Tag, byte: usize, w: usize) -> u64 {
    unpack_uint(&node.content[byte * w..], w)
}

/// Walks `digest` from the composite rooted at `base`.
pub(crate) fn walk(f: &mut TagFile<'_>, base: u64, digest: &[u8]) -> Result<Walk> {
    let w = f.cfg.w();
    let mut node = f
        .load_tag(base)?
        .ok_or_else(|| Error::corruption("composite tag missing"))?;
    if !node.kind.is_composite() {
        return Err(Error::corruption("walk must start at a map or list tag"));
    }

    let mut steps = Vec::new();
    for &byte in digest {
        let child_offset = slot_value(&node, byte as usize, w);
        steps.push(Step {
            ref_loc: node.content_offset + (byte as usize * w) as u64,
            node,
            byte,
        });

        if child_offset == 0 {
            return Ok(Walk { steps, bucket: None });
        }
        let child = f
            .load_tag(child_offset)?
            .ok_or_else(|| Error::corruption("index slot points past end of file"))?;
        match child.kind {
            TagKind::Index => node = child,
            TagKind::Buckets => return Ok(Walk { steps, bucket: Some(child) }),
            _ => {
                return Err(Error::corruption(
                    "index slot points to a non-index, non-bucket tag",
                ))
            }
        }
    }

    Err(Error::corruption("digest exhausted while walking index"))
}

/// Finds the bucket list for `digest` under `base`.
///
/// With `create` set, a walk that hits a zero slot materializes an empty
/// bucket list at end-of-file and patches the parent slot; without it,
/// such a walk returns `None`.
pub(crate) fn find_bucket(
    f: &mut TagFile<'_>,
    base: u64,
    digest: &[u8],
    create: bool,
) -> Result<Option<BucketPath>> {
    let walked = walk(f, base, digest)?;
    match walked.bucket {
        Some(bucket) => Ok(Some(BucketPath { steps: walked.steps, bucket })),
        None if !create => Ok(None),
        None => {
            let w = f.cfg.w();
            let zeros = vec![0u8; f.cfg.bucket_size()];
            let bucket = f.create_tag(*f.end, TagKind::Buckets, &zeros)?;
            let last = walked.steps.last().expect("walk records at least one step");
            f.write_at(last.ref_loc, &pack_uint(bucket.offset, w))?;
            Ok(Some(BucketPath { steps: walked.steps, bucket }))
        }
    }
}

/// Depth-first search for the first value record in the subtree rooted
/// at `offset`, scanning index slots 0..=255 and bucket slots in order.
fn first_in_subtree(f: &mut TagFile<'_>, offset: u64) -> Result<Option<u64>> {
    let tag = f
        .load_tag(offset)?
        .ok_or_else(|| Error::corruption("trie offset points past end of file"))?;
    match tag.kind {
        TagKind::Buckets => Ok(bucket::first_filled(&tag, f.cfg, 0)),
        TagKind::Map | TagKind::List | TagKind::Index => {
            let w = f.cfg.w();
            for byte in 0..INDEX_SLOTS {
                let child = slot_value(&tag, byte, w);
                if child == 0 {
                    continue;
                }
                if let Some(found) = first_in_subtree(f, child)? {
                    return Ok(Some(found));
                }
            }
            Ok(None)
        }
        _ => Err(Error::corruption("trie offset points to a value tag")),
    }
}

/// Returns the stored plain key of the first entry under `base` in
/// digest order, or `None` for an empty composite.
pub(crate) fn first_key(f: &mut TagFile<'_>, base: u64) -> Result<Option<Vec<u8>>> {
    match first_in_subtree(f, base)? {
        Some(value_offset) => record::plain_key(f, value_offset).map(Some),
        None => Ok(None),
    }
}

/// Returns the stored plain key of the entry following `prev_digest`
/// in digest order, or `None` when enumeration is exhausted.
///
/// The previous entry need not still exist; the walk resumes from where
/// it would have been.
pub(crate) fn next_key(
    f: &mut TagFile<'_>,
    base: u64,
    prev_digest: &[u8],
) -> Result<Option<Vec<u8>>> {
    let walked = walk(f, base, prev_digest)?;

    // Continue within the bucket list that held the previous digest.
    if let Some(bucket) = &walked.bucket {
        if let Some(slot) = bucket::position(bucket, f.cfg, prev_digest) {
            if let Some(value_offset) = bucket::first_filled(bucket, f.cfg, slot + 1) {
                return record::plain_key(f, value_offset).map(Some);
            }
        }
    }

    // Bucket exhausted (or gone): resume outward from each index node,
    // one slot past the byte the walk consumed there.
    let w = f.cfg.w();
    for step in walked.steps.iter().rev() {
        for byte in (step.byte as usize + 1)..INDEX_SLOTS {
            let child = slot_value(&step.node, byte, w);
            if child == 0 {
                continue;
            }
            if let Some(value_offset) = first_in_subtree(f, child)? {
                return record::plain_key(f, value_offset).map(Some);
            }
        }
    }

    Ok(None)
}
