//! GitHub adapter (REST API v3).
//!
//! - Listing: `GET /orgs/{org}/repos` or `GET /user/repos`, page-number pagination
//! - Tree: `GET /repositories/{id}/git/trees/{branch}?recursive=1`
//! - Content: `GET /repositories/{id}/contents/{path}` with the raw media type
//!
//! An empty repository answers the tree request with `409 Conflict`; it is reported
//! as `NotFound` like every other backend's empty tree.

use bytes::Bytes;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info, warn};

use syringe_core::config::VcsConfig;
use syringe_core::types::{Repository, TargetFiles};

use crate::backend::{BackendAdapter, base_or, collect_targets};
use crate::error::VcsError;
use crate::lockfile::select_targets;
use crate::transport::{RateLimitedTransport, check_status, decode_json};

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const PER_PAGE: usize = 100;
const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_RAW: &str = "application/vnd.github.raw";

#[derive(Debug, Deserialize)]
struct GithubRepo {
    id: u64,
    name: String,
    #[serde(default)]
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubTree {
    #[serde(default)]
    tree: Vec<GithubTreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct GithubTreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
}

/// GitHub backend adapter.
#[derive(Debug)]
pub struct GithubAdapter {
    transport: RateLimitedTransport,
    api: String,
    token: String,
    org: Option<String>,
    owned_only: bool,
}

impl GithubAdapter {
    /// Creates an adapter from the `[vcs]` section.
    ///
    /// With `org` set, the organization's repositories are listed; otherwise the
    /// repositories visible to the authenticated user.
    pub fn new(config: &VcsConfig, transport: RateLimitedTransport) -> Self {
        let org = config.org.trim();
        Self {
            transport,
            api: base_or(&config.base_url, DEFAULT_BASE_URL),
            token: config.token.clone(),
            org: (!org.is_empty()).then(|| org.to_owned()),
            owned_only: config.mine_only,
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, VcsError> {
        let mut url = Url::parse(&self.api).map_err(|e| VcsError::Config {
            field: "vcs.base_url".to_owned(),
            reason: e.to_string(),
        })?;
        url.path_segments_mut()
            .map_err(|()| VcsError::Config {
                field: "vcs.base_url".to_owned(),
                reason: "cannot be a base url".to_owned(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, client: &reqwest::Client, url: &Url, accept: &str) -> reqwest::RequestBuilder {
        let builder = client
            .get(url.clone())
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", "2022-11-28");
        if self.token.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.token)
        }
    }

    async fn raw_file(&self, id: u64, branch: &str, path: String) -> Result<Bytes, VcsError> {
        let id = id.to_string();
        let mut segments = vec!["repositories", id.as_str(), "contents"];
        segments.extend(path.split('/'));
        let url = self.url(&segments)?;
        self.transport
            .get_bytes(|c| self.request(c, &url, ACCEPT_RAW).query(&[("ref", branch)]))
            .await
    }
}

impl BackendAdapter for GithubAdapter {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>, VcsError> {
        let url = match &self.org {
            Some(org) => self.url(&["orgs", org.as_str(), "repos"])?,
            None => self.url(&["user", "repos"])?,
        };
        let affiliation = if self.owned_only {
            "owner"
        } else {
            "owner,collaborator,organization_member"
        };

        let mut repos = Vec::new();
        let mut page = 1usize;
        loop {
            let page_str = page.to_string();
            let per_page = PER_PAGE.to_string();
            let batch: Vec<GithubRepo> = self
                .transport
                .get_json(|c| {
                    let builder = self
                        .request(c, &url, ACCEPT_JSON)
                        .query(&[("per_page", per_page.as_str()), ("page", page_str.as_str())]);
                    if self.org.is_none() {
                        builder.query(&[("affiliation", affiliation)])
                    } else {
                        builder
                    }
                })
                .await?;
            let len = batch.len();
            repos.extend(batch);
            if len < PER_PAGE {
                break;
            }
            page += 1;
            debug!(page, "github paging");
        }
        info!(count = repos.len(), "listed github repositories");

        Ok(repos
            .into_iter()
            .map(|r| Repository::new(r.id, r.name, r.default_branch.unwrap_or_default()))
            .collect())
    }

    async fn get_target_files(&self, id: u64, branch: &str) -> Result<TargetFiles, VcsError> {
        let id_str = id.to_string();
        let url = self.url(&["repositories", &id_str, "git", "trees", branch])?;
        let response = self
            .transport
            .execute(|c| self.request(c, &url, ACCEPT_JSON).query(&[("recursive", "1")]))
            .await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(VcsError::NotFound(format!("repository {id} is empty")));
        }
        let tree: GithubTree = decode_json(check_status(response).await?).await?;
        if tree.truncated {
            warn!(repo_id = id, "github tree listing truncated, some files may be missed");
        }

        let entries = select_targets(
            tree.tree
                .into_iter()
                .filter(|e| e.kind == "blob")
                .map(|e| (e.path, e.sha)),
        );
        collect_targets(self.name(), id, entries, |path| {
            self.raw_file(id, branch, path)
        })
        .await
    }
}
