//! The bucket engine: insert, replace, lookup and delete within a
//! bucket list, and the split that re-indexes a full one.
//!
//! A bucket list holds [`MAX_BUCKETS`](crate::format::MAX_BUCKETS)
//! fixed-size slots of `digest || offset`. Filled slots always precede
//! empty slots; the first zero offset terminates the list.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::format::tag::{Tag, TagFile, TagKind};
use crate::format::{pack_uint, unpack_uint, MAX_BUCKETS};
use crate::index::BucketPath;
use crate::value::PutOutcome;

/// One parsed bucket slot.
#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub digest: Vec<u8>,
    pub offset: u64,
}

/// Shape of an incoming value, enough to settle its target location
/// without materializing the payload.
#[derive(Debug, Clone)]
pub(crate) enum ValueShape {
    /// Scalar bytes of the given payload length.
    Data { len: u64 },
    /// Null; zero-length payload.
    Null,
    /// A fresh child composite; payload is one index node.
    Composite,
    /// A reference to an existing value record at `target`. No new
    /// record is written; the slot points straight at it.
    Link { target: u64 },
}

impl ValueShape {
    /// Payload bytes a record of this shape needs, or `None` for links.
    fn needed(&self, cfg: &crate::config::FileConfig) -> Option<u64> {
        match self {
            ValueShape::Data { len } => Some(*len),
            ValueShape::Null => Some(0),
            ValueShape::Composite => Some(cfg.index_size() as u64),
            ValueShape::Link { .. } => None,
        }
    }
}

/// Where an add settled, and whether a record still has to be written.
#[derive(Debug)]
pub(crate) struct Placed {
    pub outcome: PutOutcome,
    pub target: u64,
    pub write_record: bool,
}

fn parse_slot(bucket: &Tag, cfg: &crate::config::FileConfig, i: usize) -> Slot {
    let ss = cfg.slot_size();
    let hs = cfg.digester.size();
    let at = i * ss;
    Slot {
        digest: bucket.content[at..at + hs].to_vec(),
        offset: unpack_uint(&bucket.content[at + hs..], cfg.w()),
    }
}

fn slot_location(bucket: &Tag, cfg: &crate::config::FileConfig, i: usize) -> u64 {
    bucket.content_offset + (i * cfg.slot_size()) as u64
}

/// Scans for `digest`; returns the value record offset if present.
pub(crate) fn lookup(bucket: &Tag, cfg: &crate::config::FileConfig, digest: &[u8]) -> Option<u64> {
    for i in 0..MAX_BUCKETS {
        let slot = parse_slot(bucket, cfg, i);
        if slot.offset == 0 {
            return None;
        }
        if slot.digest == digest {
            return Some(slot.offset);
        }
    }
    None
}

/// Slot index holding `digest`, if present.
pub(crate) fn position(bucket: &Tag, cfg: &crate::config::FileConfig, digest: &[u8]) -> Option<usize> {
    for i in 0..MAX_BUCKETS {
        let slot = parse_slot(bucket, cfg, i);
        if slot.offset == 0 {
            return None;
        }
        if slot.digest == digest {
            return Some(i);
        }
    }
    None
}

/// Value record offset of the first filled slot at or after `from`.
/// Filled slots precede empty ones, so a zero offset ends the list.
pub(crate) fn first_filled(bucket: &Tag, cfg: &crate::config::FileConfig, from: usize) -> Option<u64> {
    if from >= MAX_BUCKETS {
        return None;
    }
    let slot = parse_slot(bucket, cfg, from);
    if slot.offset == 0 {
        None
    } else {
        Some(slot.offset)
    }
}

/// Finds a slot for `digest` and settles the target location of its
/// value record, splitting the bucket list if it is full.
pub(crate) fn add(
    f: &mut TagFile<'_>,
    path: &BucketPath,
    digest: &[u8],
    shape: &ValueShape,
) -> Result<Placed> {
    let cfg = f.cfg;
    let hs = cfg.digester.size();
    let w = cfg.w();

    for i in 0..MAX_BUCKETS {
        let slot = parse_slot(&path.bucket, cfg, i);

        if slot.offset == 0 {
            // Insert into the first empty slot.
            let target = match shape {
                ValueShape::Link { target } => *target,
                _ => *f.end,
            };
            let mut entry = Vec::with_capacity(hs + w);
            entry.extend_from_slice(digest);
            entry.extend_from_slice(&pack_uint(target, w));
            f.write_at(slot_location(&path.bucket, cfg, i), &entry)?;
            return Ok(Placed {
                outcome: PutOutcome::Inserted,
                target,
                write_record: !matches!(shape, ValueShape::Link { .. }),
            });
        }

        if slot.digest == digest {
            // Replace. Links just repoint the slot.
            if let ValueShape::Link { target } = shape {
                let loc = slot_location(&path.bucket, cfg, i) + hs as u64;
                f.write_at(loc, &pack_uint(*target, w))?;
                return Ok(Placed {
                    outcome: PutOutcome::Replaced,
                    target: *target,
                    write_record: false,
                });
            }

            // Reuse the old record in place when the new payload fits;
            // otherwise append a new record and repoint the slot.
            let old = f
                .load_tag(slot.offset)?
                .ok_or_else(|| Error::corruption("bucket slot points past end of file"))?;
            let needed = shape.needed(cfg).expect("non-link shape has a size");
            let target = if needed <= old.size {
                slot.offset
            } else {
                let target = *f.end;
                let loc = slot_location(&path.bucket, cfg, i) + hs as u64;
                f.write_at(loc, &pack_uint(target, w))?;
                target
            };
            return Ok(Placed { outcome: PutOutcome::Replaced, target, write_record: true });
        }
    }

    // Every slot is occupied by a different digest: re-index.
    let link = match shape {
        ValueShape::Link { target } => Some(*target),
        _ => None,
    };
    let target = split(f, path, digest, link)?;
    Ok(Placed {
        outcome: PutOutcome::Inserted,
        target,
        write_record: link.is_none(),
    })
}

/// Replaces a full bucket list with a new index node one level deeper,
/// redistributing its entries (plus the incoming digest) by the next
/// digest byte. Returns the target offset for the new entry's record.
fn split(
    f: &mut TagFile<'_>,
    path: &BucketPath,
    digest: &[u8],
    link: Option<u64>,
) -> Result<u64> {
    let cfg = f.cfg;
    let w = cfg.w();
    let hs = cfg.digester.size();
    let ch = path.depth();

    if ch + 1 >= hs {
        return Err(Error::corruption(
            "indexing failed: bucket split exhausted the digest",
        ));
    }

    let old_slots: Vec<Slot> = (0..MAX_BUCKETS)
        .map(|i| parse_slot(&path.bucket, cfg, i))
        .collect();

    // The new index node takes the bucket list's place in the trie.
    let zeros = vec![0u8; cfg.index_size()];
    let node = f.create_tag(*f.end, TagKind::Index, &zeros)?;
    let parent_slot = path.steps.last().expect("walk records at least one step").ref_loc;
    f.write_at(parent_slot, &pack_uint(node.offset, w))?;

    // Redistribute the old entries by digest byte ch+1. Sub-buckets are
    // created lazily; their fill counts are tracked in memory.
    let mut subs: HashMap<u8, (Tag, usize)> = HashMap::new();
    for slot in &old_slots {
        let byte = slot.digest[ch + 1];
        place(f, &mut subs, &node, byte, &slot.digest, slot.offset)?;
    }

    // The new entry goes last; its record will be written at whatever
    // end-of-file is once its sub-bucket exists.
    let byte = digest[ch + 1];
    ensure_sub_bucket(f, &mut subs, &node, byte)?;
    let target = link.unwrap_or(*f.end);
    let (bucket, fill) = subs.get_mut(&byte).expect("sub-bucket just ensured");
    if *fill >= MAX_BUCKETS {
        return Err(Error::corruption(
            "indexing failed: sub-bucket overflow during split",
        ));
    }
    let mut entry = Vec::with_capacity(hs + w);
    entry.extend_from_slice(digest);
    entry.extend_from_slice(&pack_uint(target, w));
    let loc = slot_location(bucket, cfg, *fill);
    *fill += 1;
    f.write_at(loc, &entry)?;

    Ok(target)
}

fn ensure_sub_bucket(
    f: &mut TagFile<'_>,
    subs: &mut HashMap<u8, (Tag, usize)>,
    node: &Tag,
    byte: u8,
) -> Result<()> {
    if subs.contains_key(&byte) {
        return Ok(());
    }
    let cfg = f.cfg;
    let w = cfg.w();
    let zeros = vec![0u8; cfg.bucket_size()];
    let bucket = f.create_tag(*f.end, TagKind::Buckets, &zeros)?;
    f.write_at(
        node.content_offset + (byte as usize * w) as u64,
        &pack_uint(bucket.offset, w),
    )?;
    subs.insert(byte, (bucket, 0));
    Ok(())
}

fn place(
    f: &mut TagFile<'_>,
    subs: &mut HashMap<u8, (Tag, usize)>,
    node: &Tag,
    byte: u8,
    digest: &[u8],
    offset: u64,
) -> Result<()> {
    ensure_sub_bucket(f, subs, node, byte)?;
    let cfg = f.cfg;
    let (bucket, fill) = subs.get_mut(&byte).expect("sub-bucket just ensured");
    if *fill >= MAX_BUCKETS {
        return Err(Error::corruption(
            "indexing failed: sub-bucket overflow during split",
        ));
    }
    let hs = cfg.digester.size();
    let w = cfg.w();
    let mut entry = Vec::with_capacity(hs + w);
    entry.extend_from_slice(digest);
    entry.extend_from_slice(&pack_uint(offset, w));
    let loc = slot_location(bucket, cfg, *fill);
    *fill += 1;
    f.write_at(loc, &entry)?;
    Ok(())
}

/// Removes `digest` from the bucket list, compacting the remaining
/// slots left. The value record itself is untouched. Returns the
/// removed value record offset.
pub(crate) fn delete(
    f: &mut TagFile<'_>,
    bucket: &Tag,
    digest: &[u8],
) -> Result<Option<u64>> {
    let cfg = f.cfg;
    let ss = cfg.slot_size();

    for i in 0..MAX_BUCKETS {
        let slot = parse_slot(bucket, cfg, i);
        if slot.offset == 0 {
            return Ok(None);
        }
        if slot.digest != digest {
            continue;
        }

        let mut content = bucket.content.to_vec();
        content.copy_within((i + 1) * ss..MAX_BUCKETS * ss, i * ss);
        content[(MAX_BUCKETS - 1) * ss..].fill(0);
        f.write_at(bucket.content_offset, &content)?;
        return Ok(Some(slot.offset));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileConfig, Options};
    use crate::format::{ROOT_OFFSET, SIGNATURE};
    use crate::index;
    use std::fs::File;
    use tempfile::tempfile;

    fn fresh_root() -> (File, u64, FileConfig) {
        let mut file = tempfile().unwrap();
        let mut end = 0;
        let cfg = Options::default().file_config();
        let mut tf = TagFile { file: &mut file, end: &mut end, cfg: &cfg };
        tf.write_at(0, SIGNATURE).unwrap();
        let zeros = vec![0u8; cfg.index_size()];
        tf.create_tag(ROOT_OFFSET, TagKind::Map, &zeros).unwrap();
        (file, end, cfg)
    }

    fn add_scalar(
        tf: &mut TagFile<'_>,
        digest: &[u8],
        payload: &[u8],
        key: &[u8],
    ) -> Placed {
        let path = index::find_bucket(tf, ROOT_OFFSET, digest, true).unwrap().unwrap();
        let shape = ValueShape::Data { len: payload.len() as u64 };
        let placed = add(tf, &path, digest, &shape).unwrap();
        if placed.write_record {
            crate::record::write_raw(
                tf,
                placed.target,
                &crate::record::RawValue::Bytes(payload.to_vec()),
                key,
            )
            .unwrap();
        }
        placed
    }

    #[test]
    fn test_insert_then_lookup() {
        let (mut file, mut end, cfg) = fresh_root();
        let mut tf = TagFile { file: &mut file, end: &mut end, cfg: &cfg };

        let digest = cfg.digester.digest(b"key1");
        let placed = add_scalar(&mut tf, &digest, b"value1", b"key1");
        assert_eq!(placed.outcome, PutOutcome::Inserted);

        let path = index::find_bucket(&mut tf, ROOT_OFFSET, &digest, false).unwrap().unwrap();
        assert_eq!(lookup(&path.bucket, &cfg, &digest), Some(placed.target));
    }

    #[test]
    fn test_replace_in_place_when_smaller() {
        let (mut file, mut end, cfg) = fresh_root();
        let mut tf = TagFile { file: &mut file, end: &mut end, cfg: &cfg };

        let digest = cfg.digester.digest(b"key1");
        let first = add_scalar(&mut tf, &digest, b"a-long-value", b"key1");
        let size_before = *tf.end;

        let second = add_scalar(&mut tf, &digest, b"short", b"key1");
        assert_eq!(second.outcome, PutOutcome::Replaced);
        assert_eq!(second.target, first.target);
        assert_eq!(*tf.end, size_before);
    }

    #[test]
    fn test_replace_relocates_when_larger() {
        let (mut file, mut end, cfg) = fresh_root();
        let mut tf = TagFile { file: &mut file, end: &mut end, cfg: &cfg };

        let digest = cfg.digester.digest(b"key1");
        let first = add_scalar(&mut tf, &digest, b"tiny", b"key1");
        let second = add_scalar(&mut tf, &digest, b"a-much-longer-value", b"key1");
        assert_eq!(second.outcome, PutOutcome::Replaced);
        assert_ne!(second.target, first.target);

        let path = index::find_bucket(&mut tf, ROOT_OFFSET, &digest, false).unwrap().unwrap();
        assert_eq!(lookup(&path.bucket, &cfg, &digest), Some(second.target));
    }

    #[test]
    fn test_delete_compacts_slots() {
        let (mut file, mut end, cfg) = fresh_root();
        let mut tf = TagFile { file: &mut file, end: &mut end, cfg: &cfg };

        // Three digests that share a first byte so they land in one bucket.
        let mut digests = Vec::new();
        for i in 0u32.. {
            let d = cfg.digester.digest(format!("key{}", i).as_bytes());
            if d[0] == 0x42 {
                digests.push(d);
                if digests.len() == 3 {
                    break;
                }
            }
        }
        for (i, d) in digests.iter().enumerate() {
            add_scalar(&mut tf, d, b"v", format!("k{}", i).as_bytes());
        }

        let path = index::find_bucket(&mut tf, ROOT_OFFSET, &digests[0], false).unwrap().unwrap();
        assert!(delete(&mut tf, &path.bucket, &digests[0]).unwrap().is_some());

        // Reload and verify the survivors shifted into the first slots.
        let path = index::find_bucket(&mut tf, ROOT_OFFSET, &digests[1], false).unwrap().unwrap();
        assert_eq!(position(&path.bucket, &cfg, &digests[1]), Some(0));
        assert_eq!(position(&path.bucket, &cfg, &digests[2]), Some(1));
        assert_eq!(position(&path.bucket, &cfg, &digests[0]), None);
    }

    #[test]
    fn test_split_redistributes_and_refinds() {
        let (mut file, mut end, cfg) = fresh_root();
        let mut tf = TagFile { file: &mut file, end: &mut end, cfg: &cfg };

        // Force one bucket full by synthesizing digests with a common
        // first byte and distinct second bytes.
        let mut entries = Vec::new();
        for i in 0..=MAX_BUCKETS {
            let mut digest = vec![0u8; cfg.digester.size()];
            digest[0] = 0x7f;
            digest[1] = i as u8;
            digest[15] = 0xee;
            entries.push(digest);
        }

        for (i, d) in entries.iter().enumerate() {
            let placed = add_scalar(&mut tf, d, b"payload", format!("k{}", i).as_bytes());
            assert_eq!(placed.outcome, PutOutcome::Inserted);
        }

        // After the 17th insert the bucket must have split: every digest
        // is still reachable and the root slot now points at an index.
        for d in &entries {
            let path = index::find_bucket(&mut tf, ROOT_OFFSET, d, false).unwrap().unwrap();
            assert_eq!(path.depth(), 1);
            assert!(lookup(&path.bucket, &cfg, d).is_some());
        }
    }
}
