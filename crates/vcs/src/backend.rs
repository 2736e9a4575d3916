//! Backend adapter abstraction.
//!
//! The [`BackendAdapter`] trait is the only surface the pipeline sees of a hosting
//! backend. Production code selects a concrete adapter at runtime through
//! [`AnyBackend`], while tests implement the trait directly with in-memory mocks.
//!
//! # Architecture
//!
//! ```text
//!        ┌──────────────┐
//!        │   Pipeline   │
//!        └──────┬───────┘
//!               │
//!               ▼
//!      ┌────────────────┐
//!      │ BackendAdapter │ (trait)
//!      └────────────────┘
//!               │
//!               ▼
//!         ┌────────────┐
//!         │ AnyBackend │
//!         └────────────┘
//!     │       │       │       │
//!     ▼       ▼       ▼       ▼
//!  GitLab  GitHub   Azure  Bitbucket
//!     └───────┴───┬───┴───────┘
//!                 ▼
//!      RateLimitedTransport
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::{PoisonError, RwLock};

use syringe_core::config::{VcsConfig, VcsKind};
use syringe_core::types::{LockfileReference, Repository, TargetFiles};

use crate::azure::AzureAdapter;
use crate::bitbucket::BitbucketAdapter;
use crate::error::VcsError;
use crate::github::GithubAdapter;
use crate::gitlab::GitlabAdapter;
use crate::lockfile::{FileClass, TargetEntry};
use crate::transport::RateLimitedTransport;

/// Capability every hosting backend provides.
///
/// # Errors
///
/// - `VcsError::NotFound`: the repository or branch has no tree (empty repository)
/// - `VcsError::Authentication`: credentials rejected
/// - `VcsError::Unavailable`: backend unreachable or 5xx
/// - `VcsError::RateLimited`: still rejected after one pause-and-retry
pub trait BackendAdapter: Send + Sync + 'static {
    /// Backend name for logs and metric labels.
    fn name(&self) -> &'static str;

    /// Lists every repository visible to the credentials, draining all pages.
    fn list_repositories(&self)
    -> impl Future<Output = Result<Vec<Repository>, VcsError>> + Send;

    /// Fetches the recognized lockfiles and CI files of one repository branch.
    ///
    /// Returns empty lists when nothing is recognized.
    fn get_target_files(
        &self,
        id: u64,
        branch: &str,
    ) -> impl Future<Output = Result<TargetFiles, VcsError>> + Send;

    /// Fetches only the recognized lockfiles of one repository branch.
    fn get_lockfiles(
        &self,
        id: u64,
        branch: &str,
    ) -> impl Future<Output = Result<Vec<LockfileReference>, VcsError>> + Send {
        async move { Ok(self.get_target_files(id, branch).await?.lockfiles) }
    }
}

/// Runtime-selected backend adapter.
#[derive(Debug)]
pub enum AnyBackend {
    Gitlab(GitlabAdapter),
    Github(GithubAdapter),
    Azure(AzureAdapter),
    Bitbucket(BitbucketAdapter),
}

impl AnyBackend {
    /// Builds the adapter named by `config.kind`, sharing one rate-limited transport.
    ///
    /// # Errors
    ///
    /// Returns `VcsError::Config` if a required field is missing or the proxy URL
    /// is invalid.
    pub fn from_config(config: &VcsConfig) -> Result<Self, VcsError> {
        let transport = RateLimitedTransport::builder(config.kind.as_str())
            .rate_limit(config.rate_limit)
            .proxy_url(config.proxy_url.clone())
            .build()?;

        let backend = match config.kind {
            VcsKind::Gitlab => Self::Gitlab(GitlabAdapter::new(config, transport)),
            VcsKind::Github => Self::Github(GithubAdapter::new(config, transport)),
            VcsKind::Azure => Self::Azure(AzureAdapter::new(config, transport)?),
            VcsKind::BitbucketCloud => Self::Bitbucket(BitbucketAdapter::new(config, transport)?),
        };
        Ok(backend)
    }
}

impl BackendAdapter for AnyBackend {
    fn name(&self) -> &'static str {
        match self {
            Self::Gitlab(b) => b.name(),
            Self::Github(b) => b.name(),
            Self::Azure(b) => b.name(),
            Self::Bitbucket(b) => b.name(),
        }
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>, VcsError> {
        match self {
            Self::Gitlab(b) => b.list_repositories().await,
            Self::Github(b) => b.list_repositories().await,
            Self::Azure(b) => b.list_repositories().await,
            Self::Bitbucket(b) => b.list_repositories().await,
        }
    }

    async fn get_target_files(&self, id: u64, branch: &str) -> Result<TargetFiles, VcsError> {
        match self {
            Self::Gitlab(b) => b.get_target_files(id, branch).await,
            Self::Github(b) => b.get_target_files(id, branch).await,
            Self::Azure(b) => b.get_target_files(id, branch).await,
            Self::Bitbucket(b) => b.get_target_files(id, branch).await,
        }
    }
}

/// Downloads every target entry with `fetch` and sorts it into lockfiles or CI files.
///
/// A file that disappeared between listing and download (`NotFound`) is skipped;
/// any other error aborts the repository.
pub(crate) async fn collect_targets<F, Fut>(
    backend: &'static str,
    repo_id: u64,
    entries: Vec<TargetEntry>,
    fetch: F,
) -> Result<TargetFiles, VcsError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<bytes::Bytes, VcsError>>,
{
    let mut files = TargetFiles::default();
    for entry in entries {
        let content = match fetch(entry.path.clone()).await {
            Ok(content) => content,
            Err(VcsError::NotFound(reason)) => {
                tracing::warn!(
                    backend,
                    repo_id,
                    path = entry.path.as_str(),
                    reason = reason.as_str(),
                    "target file vanished before download, skipping"
                );
                continue;
            }
            Err(e) => return Err(e),
        };
        let reference = LockfileReference::new(entry.name, entry.path, entry.content_id, content);
        match entry.class {
            FileClass::Lockfile => files.lockfiles.push(reference),
            FileClass::CiFile => files.ci_files.push(reference),
        }
    }
    tracing::debug!(
        backend,
        repo_id,
        lockfiles = files.lockfiles.len(),
        ci_files = files.ci_files.len(),
        "collected target files"
    );
    Ok(files)
}

/// Returns `base` without trailing slashes, or `default` when `base` is empty.
pub(crate) fn base_or(base: &str, default: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    if base.is_empty() {
        default.to_owned()
    } else {
        base.to_owned()
    }
}

/// Derives a numeric repository id from a backend UUID (first four bytes, big-endian).
///
/// Accepts the braced form Bitbucket reports (`{...}`).
pub(crate) fn id_from_uuid(raw: &str) -> Result<u64, VcsError> {
    let trimmed = raw.trim().trim_start_matches('{').trim_end_matches('}');
    let uuid = uuid::Uuid::parse_str(trimmed)
        .map_err(|e| VcsError::Decode(format!("invalid repository uuid '{raw}': {e}")))?;
    let b = uuid.as_bytes();
    Ok(u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]])))
}

/// Numeric id -> backend-native key, filled while listing.
///
/// Backends whose native identifier is not numeric (Azure GUIDs, Bitbucket slugs)
/// resolve the pipeline's numeric id through this map.
#[derive(Debug, Default)]
pub(crate) struct RemoteKeys {
    inner: RwLock<HashMap<u64, String>>,
}

impl RemoteKeys {
    /// Records a mapping. Returns `false` if the id was already taken by another key.
    pub(crate) fn insert(&self, id: u64, key: &str) -> bool {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match map.get(&id) {
            Some(existing) if existing != key => false,
            _ => {
                map.insert(id, key.to_owned());
                true
            }
        }
    }

    /// Looks up the native key of a numeric id.
    pub(crate) fn get(&self, id: u64) -> Result<String, VcsError> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| VcsError::NotFound(format!("unknown repository id {id}")))
    }
}
