//! The shared `Root` record: one open file, reference-counted across
//! every handle that points into it.

use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;

use fs2::FileExt;
use parking_lot::Mutex;

use crate::config::{FileConfig, Filters};
use crate::error::{Error, Result};
use crate::format::tag::TagKind;

/// Advisory file lock mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Shared lock, taken for reads.
    Shared,
    /// Exclusive lock, taken for writes.
    Exclusive,
}

/// Open-time mode flags.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Flags {
    pub locking: bool,
    pub autoflush: bool,
    pub volatile: bool,
    pub debug: bool,
}

/// State shared by all handles on one open file.
pub(crate) struct Root {
    pub path: PathBuf,
    pub cfg: FileConfig,
    pub flags: Flags,
    pub filters: Filters,
    /// Kind of the file's root tag. Fixed at open.
    pub kind: TagKind,
    /// Live handle count. The file closes when it reaches zero.
    pub handles: AtomicUsize,
    pub state: Mutex<State>,
}

/// The mutable half of a `Root`.
pub(crate) struct State {
    /// `None` once the last handle has dropped.
    pub file: Option<File>,
    /// End-of-file offset; always equals the on-disk size.
    pub end: u64,
    /// Reentrancy depth of the advisory lock.
    pub lock_depth: u32,
    /// Message of the most recently recorded error.
    pub last_error: Option<String>,
}

impl Root {
    /// Takes the advisory lock, calling into the OS only on the 0 -> 1
    /// depth transition. A no-op unless locking is enabled.
    pub fn lock_os(&self, st: &mut State, mode: LockMode) -> Result<()> {
        if !self.flags.locking {
            return Ok(());
        }
        if st.lock_depth == 0 {
            let file = st
                .file
                .as_ref()
                .ok_or_else(|| Error::cannot_open("database file is closed"))?;
            match mode {
                LockMode::Shared => FileExt::lock_shared(file)?,
                LockMode::Exclusive => FileExt::lock_exclusive(file)?,
            }
        }
        st.lock_depth += 1;
        Ok(())
    }

    /// Releases one level of the advisory lock, calling into the OS
    /// only on the 1 -> 0 depth transition.
    pub fn unlock_os(&self, st: &mut State) {
        if !self.flags.locking || st.lock_depth == 0 {
            return;
        }
        st.lock_depth -= 1;
        if st.lock_depth == 0 {
            if let Some(file) = st.file.as_ref() {
                if let Err(e) = FileExt::unlock(file) {
                    log::warn!("failed to release lock on {}: {}", self.path.display(), e);
                }
            }
        }
    }
}
