// GitHub contents API backend

pub mod contents;

pub use contents::{GitHubStore, GitHubTarget};
