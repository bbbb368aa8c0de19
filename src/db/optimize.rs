//! Compaction: rebuild the live data into a fresh file, then rename it
//! over the original.
//!
//! Deleted and superseded records are never reclaimed in place, so a
//! long-lived file accumulates dead bytes. `optimize` copies every
//! reachable entry into `<path>.tmp` through the ordinary insert path,
//! which packs the live data densely, then swaps the files.

use std::collections::{HashMap, VecDeque};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use crate::config::Options;
use crate::db::root::{LockMode, State};
use crate::db::{fetch_raw, Db, Session};
use crate::error::{Error, Result};
use crate::format::tag::{TagFile, TagKind};
use crate::format::ROOT_OFFSET;
use crate::index;
use crate::record::RawValue;

impl Db {
    /// Compacts the database file in place.
    ///
    /// Requires this to be the only live handle; the whole rebuild runs
    /// under the exclusive lock when locking is enabled. On success the
    /// handle transparently carries on against the rebuilt file.
    pub fn optimize(&self) -> Result<()> {
        let r = self.optimize_inner();
        self.record(r)
    }

    fn optimize_inner(&self) -> Result<()> {
        if self.base() != ROOT_OFFSET {
            return Err(Error::unsupported("optimize must be called on the root handle"));
        }
        let handles = self.root().handles.load(Ordering::SeqCst);
        if handles != 1 {
            return Err(Error::OptimizeBusy(handles));
        }

        let path = self.root().path.clone();
        let tmp_path = tmp_path(&path);
        // A stale temp file from an interrupted run would fail the
        // signature check; start clean.
        let _ = std::fs::remove_file(&tmp_path);

        let options = Options::new()
            .kind(crate::db::db_kind(self.root().kind))
            .offset_width(self.root().cfg.offset_width)
            .digester(self.root().cfg.digester.clone());
        let tmp = Db::open(&tmp_path, options)?;

        log::info!("optimizing {} into {}", path.display(), tmp_path.display());

        let mut st = self.root().state.lock();
        if let Err(e) = self.root().lock_os(&mut st, LockMode::Exclusive) {
            drop(st);
            drop(tmp);
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }

        if self.root().flags.locking || self.root().flags.volatile {
            let refreshed = match st.file.as_ref() {
                None => Err(Error::cannot_open("database file is closed")),
                Some(file) => file.metadata().map(|m| m.len()).map_err(Error::from),
            };
            match refreshed {
                Ok(len) => st.end = len,
                Err(e) => return cleanup(self, &mut st, tmp, &tmp_path, e),
            }
        }

        let copied = {
            let root = self.root();
            let State { file, end, .. } = &mut *st;
            match file.as_mut() {
                None => Err(Error::cannot_open("database file is closed")),
                Some(file) => {
                    let mut session = Session {
                        f: TagFile { file, end, cfg: &root.cfg },
                        filters: &root.filters,
                    };
                    copy_live(&mut session, ROOT_OFFSET, &tmp)
                }
            }
        };
        let copied = copied.and_then(|_| tmp.sync());
        drop(tmp);

        if let Err(e) = copied {
            return cleanup_closed(self, &mut st, &tmp_path, e);
        }

        if let Err(e) = std::fs::rename(&tmp_path, &path) {
            return cleanup_closed(self, &mut st, &tmp_path, Error::RenameFailed(e));
        }

        // Swap in the rebuilt file. Dropping the old handle closes it,
        // which also releases the advisory lock it carried.
        let reopened = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .and_then(|file| file.metadata().map(|meta| (file, meta.len())));
        match reopened {
            Ok((file, end)) => {
                st.end = end;
                st.lock_depth = 0;
                st.file = Some(file);
                log::info!("optimize complete: {} is {} bytes", path.display(), end);
                Ok(())
            }
            Err(e) => {
                st.file = None;
                st.lock_depth = 0;
                Err(e.into())
            }
        }
    }
}

fn cleanup(db: &Db, st: &mut State, tmp: Db, tmp_path: &Path, err: Error) -> Result<()> {
    db.root().unlock_os(st);
    drop(tmp);
    let _ = std::fs::remove_file(tmp_path);
    Err(err)
}

fn cleanup_closed(db: &Db, st: &mut State, tmp_path: &Path, err: Error) -> Result<()> {
    db.root().unlock_os(st);
    let _ = std::fs::remove_file(tmp_path);
    Err(err)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Copies every entry reachable from `src_root` into `dst` with an
/// explicit worklist. Composites already copied are re-linked rather
/// than duplicated, so shared children and cycles survive compaction.
fn copy_live(s: &mut Session<'_>, src_root: u64, dst: &Db) -> Result<()> {
    let mut copied: HashMap<u64, u64> = HashMap::new();
    copied.insert(src_root, dst.base());
    let mut work: VecDeque<(u64, u64)> = VecDeque::new();
    work.push_back((src_root, dst.base()));

    while let Some((src_base, dst_base)) = work.pop_front() {
        let mut key = index::first_key(&mut s.f, src_base)?;
        while let Some(k) = key {
            let tag = fetch_raw(s, src_base, &k)?
                .ok_or_else(|| Error::corruption("enumerated key has no binding"))?;
            match tag.kind {
                TagKind::Data => {
                    dst.raw_store(dst_base, &k, RawValue::Bytes(tag.content.to_vec()))?;
                }
                TagKind::Null => {
                    dst.raw_store(dst_base, &k, RawValue::Null)?;
                }
                TagKind::Map | TagKind::List => {
                    if let Some(&existing) = copied.get(&tag.offset) {
                        dst.raw_store(dst_base, &k, RawValue::LinkTo(existing))?;
                    } else {
                        let placed = dst.raw_store(dst_base, &k, RawValue::Empty(tag.kind))?;
                        copied.insert(tag.offset, placed.target);
                        work.push_back((tag.offset, placed.target));
                    }
                }
                _ => return Err(Error::corruption("bucket slot points to a non-value tag")),
            }
            let digest = s.f.cfg.digester.digest(&k);
            key = index::next_key(&mut s.f, src_base, &digest)?;
        }
    }
    Ok(())
}
