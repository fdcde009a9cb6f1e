// Virtual drive over a flat, per-path blob store: folders, renames and
// batch operations emulated on top of independent single-blob commits.

pub mod batch;
pub mod config;
pub mod directory;
pub mod entry;
pub mod error;
pub mod file_type;
pub mod format;
pub mod mutation;
pub mod path;
pub mod session;
pub mod tree;

pub use entry::{Entry, EntryKind};
pub use error::DriveError;
pub use session::{DriveSession, Limits};
