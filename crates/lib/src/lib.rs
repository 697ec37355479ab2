//! fftt-lib: content-addressed build engine
//!
//! Files and directory trees are stored by hash in a [`repo::Repository`].
//! Tasks of a [`graph::BuildGraph`] select input trees through glob filters,
//! run a command on them in a sandbox and have their outputs stored and
//! memoized:
//! - `filter`: glob patterns compiled into name filters
//! - `tree`: in-memory directory trees, scanning and merging
//! - `repo`: object store, checkouts, work directories and memo records
//! - `graph`: build graph model and YAML loading
//! - `runner`: command execution on the host or in a container
//! - `eval`: task evaluation

pub mod config;
pub mod consts;
pub mod eval;
pub mod filter;
pub mod graph;
pub mod platform;
pub mod repo;
pub mod runner;
pub mod tree;
pub mod util;
