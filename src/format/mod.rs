//! On-disk file layout and the universal tag codec.
//!
//! Every structure in a database file is framed as a tag:
//!
//! ```text
//! [kind: 1 byte][length: W bytes BE][payload: length bytes]
//! ```
//!
//! where `W` is the file-wide offset width (4 or 8). The file itself is:
//!
//! ```text
//! [signature: "DPDB"]
//! [root tag: H or A, payload = one index node]
//! [appended tags...]
//! ```
//!
//! All integers on disk are big-endian unsigned of width `W`.

pub mod tag;

use bytes::{Buf, BufMut, BytesMut};

/// File signature at offset 0.
pub const SIGNATURE: &[u8; 4] = b"DPDB";

/// Offset of the file's root tag, immediately after the signature.
pub const ROOT_OFFSET: u64 = SIGNATURE.len() as u64;

/// Number of slots in an index node, one per possible digest byte.
pub const INDEX_SLOTS: usize = 256;

/// Fixed capacity of a bucket list.
///
/// Must not be lowered: a re-index peels a single digest byte, and 16
/// slots is the probabilistic safety margin that keeps a well-distributed
/// digest from overfilling a sub-bucket.
pub const MAX_BUCKETS: usize = 16;

/// Reserved map key under which a list stores its logical length.
pub const LENGTH_KEY: &[u8] = b"length";

/// Packs `value` into `w` big-endian bytes.
pub(crate) fn pack_uint(value: u64, w: usize) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(w);
    buf.put_uint(value, w);
    buf.to_vec()
}

/// Unpacks `w` big-endian bytes from the front of `buf`.
pub(crate) fn unpack_uint(buf: &[u8], w: usize) -> u64 {
    let mut slice = &buf[..w];
    slice.get_uint(w)
}
