//! # DeepDB - A Single-File Nested Key/Value Storage Engine
//!
//! DeepDB is an embedded, persistent storage engine that natively
//! represents arbitrarily nested maps and ordered lists in one flat
//! binary file. The format is portable and endian-neutral, the file
//! grows append-mostly, and multiple processes can share one file
//! through advisory locking.
//!
//! ## Architecture
//!
//! The engine consists of several tightly-coupled components:
//!
//! - **Tag Codec**: the universal `kind || length || payload` framing
//!   used for every record in the file
//! - **Digest Index**: a trie of 256-way index nodes keyed by
//!   successive bytes of each key's digest
//! - **Bucket Engine**: fixed-capacity bucket lists at the trie leaves,
//!   re-indexed one digest byte deeper when they fill up
//! - **Value Store**: tagged value records with a plain-key trailer,
//!   recursing into child tries for nested composites
//! - **Session & Locking**: reference-counted handles over one shared
//!   open file, reentrant advisory locks, and compaction
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use deepdb::{Db, Options, Value};
//!
//! # fn main() -> Result<(), deepdb::Error> {
//! let db = Db::open("data.db", Options::default())?;
//!
//! // Scalars round-trip as raw bytes.
//! db.put("key1", "value1")?;
//! assert_eq!(db.get("key1")?, Some(Value::from("value1")));
//!
//! // Composites nest without bound.
//! db.put("config", Value::Map(vec![
//!     (b"retries".to_vec(), Value::from("3")),
//! ]))?;
//! let config = db.get("config")?.unwrap().into_handle().unwrap();
//! assert!(config.exists("retries")?);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod config;
pub mod error;

mod bucket;
mod db;
mod format;
mod index;
mod record;
mod value;

// Re-exports
pub use config::{DbKind, FileConfig, FilterFn, Filters, OffsetWidth, Options};
pub use db::{Db, Keys, LockMode};
pub use error::{Error, Result};
pub use index::Digester;
pub use value::{PutOutcome, Value};
