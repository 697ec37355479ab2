//! Filesystem primitives used by the object repository.
//!
//! - [`immutable`] - write-protection of stored objects
//! - [`link`] - idempotent hard links, symlinks and atomic writes

pub mod immutable;
pub mod link;
