//! System-backed implementation of `DatasetProvider`. `command` owns process
//! handling, `parse` turns tool output into records, and `system` wires the
//! dataset operations together.

mod command;
mod parse;
mod system;

pub use system::{DiffStream, ListStream, SystemZfs, DEFAULT_ZFS_PATHS};
