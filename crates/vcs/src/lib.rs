#![doc = include_str!("../README.md")]

pub mod azure;
pub mod backend;
pub mod bitbucket;
pub mod error;
pub mod github;
pub mod gitlab;
pub mod lockfile;
pub mod transport;

#[cfg(test)]
mod test_server;

// --- Public API Re-exports ---

// Adapters
pub use backend::{AnyBackend, BackendAdapter};
pub use azure::AzureAdapter;
pub use bitbucket::BitbucketAdapter;
pub use github::GithubAdapter;
pub use gitlab::GitlabAdapter;

// Error
pub use error::VcsError;

// Transport
pub use transport::{RateLimitedTransport, TransportBuilder};

// Recognition
pub use lockfile::{CI_FILES, SUPPORTED_LOCKFILES, classify, is_ci_file, is_lockfile};
