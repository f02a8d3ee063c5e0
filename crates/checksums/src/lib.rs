#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `checksums` provides the single block digest primitive used throughout
//! the blockcopy pipeline: a streaming SHA-3-512 hasher behind the
//! [`strong::StrongDigest`] trait.
//!
//! # Design
//!
//! Unlike a general-purpose checksum crate that negotiates between several
//! algorithms, blockcopy's wire protocol fixes the digest to SHA-3-512 (a
//! 64-byte `BlockHash` per block), so this crate exposes exactly one
//! implementation. The trait is kept anyway so call sites read the same way
//! a multi-algorithm crate's call sites would, and so tests can exercise the
//! streaming and one-shot paths independently of the concrete hasher.
//!
//! # Invariants
//!
//! - [`strong::Sha3_512::DIGEST_LEN`] is asserted at compile time to be 64:
//!   the wire format's `digest:64B` field carries no length prefix, so a
//!   mismatch here would silently desynchronise every reader of the hash
//!   stream.
//!
//! # Examples
//!
//! ```
//! use checksums::strong::{Sha3_512, StrongDigest};
//!
//! let mut hasher = Sha3_512::new();
//! hasher.update(b"hello");
//! let digest = hasher.finalize();
//! assert_eq!(digest.as_ref().len(), Sha3_512::DIGEST_LEN);
//! ```

pub mod strong;

const _: () = assert!(strong::Sha3_512::DIGEST_LEN == 64);
