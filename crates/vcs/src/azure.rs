//! Azure Repos adapter (Azure DevOps REST API 7.0).
//!
//! - Listing: `GET {org}/_apis/git/repositories`, `x-ms-continuationtoken` pagination
//! - Tree: `GET {org}/_apis/git/repositories/{guid}/items?recursionLevel=Full`
//! - Content: the same endpoint with `path=` and `$format=octetStream`
//!
//! Repositories are identified by GUID. The pipeline's numeric id is derived from
//! the first four bytes of that GUID and mapped back through [`RemoteKeys`].
//! Authentication is HTTP basic with an empty user name and the PAT as password.

use bytes::Bytes;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info, warn};

use syringe_core::config::VcsConfig;
use syringe_core::types::{Repository, TargetFiles};

use crate::backend::{BackendAdapter, RemoteKeys, base_or, collect_targets, id_from_uuid};
use crate::error::VcsError;
use crate::lockfile::select_targets;
use crate::transport::{RateLimitedTransport, decode_json};

const DEFAULT_BASE_URL: &str = "https://dev.azure.com";
const API_VERSION: &str = "7.0";
const BRANCH_PREFIX: &str = "refs/heads/";

#[derive(Debug, Deserialize)]
struct AzureList<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureRepo {
    id: String,
    name: String,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    is_disabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureItem {
    object_id: String,
    path: String,
    #[serde(default)]
    git_object_type: String,
    #[serde(default)]
    is_folder: bool,
}

/// Azure Repos backend adapter.
#[derive(Debug)]
pub struct AzureAdapter {
    transport: RateLimitedTransport,
    base: String,
    org: String,
    token: String,
    keys: RemoteKeys,
}

impl AzureAdapter {
    /// Creates an adapter from the `[vcs]` section.
    ///
    /// # Errors
    ///
    /// Returns `VcsError::Config` if `vcs.org` is empty.
    pub fn new(config: &VcsConfig, transport: RateLimitedTransport) -> Result<Self, VcsError> {
        let org = config.org.trim();
        if org.is_empty() {
            return Err(VcsError::Config {
                field: "vcs.org".to_owned(),
                reason: "azure requires an organization".to_owned(),
            });
        }
        Ok(Self {
            transport,
            base: base_or(&config.base_url, DEFAULT_BASE_URL),
            org: org.to_owned(),
            token: config.token.clone(),
            keys: RemoteKeys::default(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, VcsError> {
        let mut url = Url::parse(&self.base).map_err(|e| VcsError::Config {
            field: "vcs.base_url".to_owned(),
            reason: e.to_string(),
        })?;
        url.path_segments_mut()
            .map_err(|()| VcsError::Config {
                field: "vcs.base_url".to_owned(),
                reason: "cannot be a base url".to_owned(),
            })?
            .pop_if_empty()
            .push(&self.org)
            .extend(["_apis", "git", "repositories"])
            .extend(segments);
        Ok(url)
    }

    fn request(&self, client: &reqwest::Client, url: &Url) -> reqwest::RequestBuilder {
        client
            .get(url.clone())
            .basic_auth("", Some(&self.token))
            .query(&[("api-version", API_VERSION)])
    }

    async fn raw_file(&self, guid: &str, branch: &str, path: String) -> Result<Bytes, VcsError> {
        let url = self.url(&[guid, "items"])?;
        let item_path = format!("/{path}");
        self.transport
            .get_bytes(|c| {
                self.request(c, &url).query(&[
                    ("path", item_path.as_str()),
                    ("versionDescriptor.version", branch),
                    ("versionDescriptor.versionType", "branch"),
                    ("$format", "octetStream"),
                ])
            })
            .await
    }
}

impl BackendAdapter for AzureAdapter {
    fn name(&self) -> &'static str {
        "azure"
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>, VcsError> {
        let url = self.url(&[])?;
        let mut raw = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let response = self
                .transport
                .send(|c| {
                    let builder = self.request(c, &url);
                    match &continuation {
                        Some(token) => builder.query(&[("continuationToken", token.as_str())]),
                        None => builder,
                    }
                })
                .await?;
            let next = response
                .headers()
                .get("x-ms-continuationtoken")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
                .filter(|v| !v.is_empty());
            let page: AzureList<AzureRepo> = decode_json(response).await?;
            raw.extend(page.value);

            match next {
                Some(token) => {
                    debug!("azure paging");
                    continuation = Some(token);
                }
                None => break,
            }
        }
        info!(count = raw.len(), org = self.org.as_str(), "listed azure repositories");

        let mut repos = Vec::with_capacity(raw.len());
        for repo in raw {
            if repo.is_disabled {
                debug!(name = repo.name.as_str(), "skipping disabled azure repository");
                continue;
            }
            let id = match id_from_uuid(&repo.id) {
                Ok(id) => id,
                Err(e) => {
                    warn!(
                        name = repo.name.as_str(),
                        guid = repo.id.as_str(),
                        error = %e,
                        "malformed repository id, skipping repository"
                    );
                    continue;
                }
            };
            if !self.keys.insert(id, &repo.id) {
                warn!(
                    name = repo.name.as_str(),
                    guid = repo.id.as_str(),
                    id,
                    "numeric id collision, skipping repository"
                );
                continue;
            }
            let branch = repo
                .default_branch
                .as_deref()
                .map(|b| b.strip_prefix(BRANCH_PREFIX).unwrap_or(b).to_owned())
                .unwrap_or_default();
            repos.push(Repository::new(id, repo.name, branch).with_remote_key(repo.id));
        }
        Ok(repos)
    }

    async fn get_target_files(&self, id: u64, branch: &str) -> Result<TargetFiles, VcsError> {
        let guid = self.keys.get(id)?;
        let url = self.url(&[guid.as_str(), "items"])?;
        let items: AzureList<AzureItem> = self
            .transport
            .get_json(|c| {
                self.request(c, &url).query(&[
                    ("recursionLevel", "Full"),
                    ("versionDescriptor.version", branch),
                    ("versionDescriptor.versionType", "branch"),
                ])
            })
            .await?;

        let entries = select_targets(
            items
                .value
                .into_iter()
                .filter(|i| !i.is_folder && i.git_object_type == "blob")
                .map(|i| (i.path, i.object_id)),
        );
        collect_targets(self.name(), id, entries, |path| {
            self.raw_file(&guid, branch, path)
        })
        .await
    }
}
