// Backend contract for the drive: the blob store trait, its error type,
// the credential accessor and an in-memory store.

pub mod credential;
pub mod error;
pub mod memory;
pub mod store;

pub use credential::{CredentialSource, StaticCredential};
pub use error::StoreError;
pub use memory::{MemoryBlobStore, StoreOp};
pub use store::{Blob, BlobStore, EntryKind, StoreEntry};
