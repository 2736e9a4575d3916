//! GitLab adapter (REST API v4).
//!
//! - Listing: `GET /api/v4/projects`, `X-Next-Page` pagination
//! - Tree: `GET /projects/{id}/repository/tree?recursive=true`
//! - Content: `GET /projects/{id}/repository/files/{path}/raw`
//!
//! Authentication uses the `PRIVATE-TOKEN` header.

use bytes::Bytes;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info};

use syringe_core::config::VcsConfig;
use syringe_core::types::{Repository, TargetFiles};

use crate::backend::{BackendAdapter, base_or, collect_targets};
use crate::error::VcsError;
use crate::lockfile::select_targets;
use crate::transport::{RateLimitedTransport, decode_json};

const DEFAULT_BASE_URL: &str = "https://gitlab.com";
const PER_PAGE: &str = "100";

#[derive(Debug, Deserialize)]
struct GitlabProject {
    id: u64,
    name: String,
    #[serde(default)]
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitlabTreeNode {
    id: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// GitLab backend adapter.
#[derive(Debug)]
pub struct GitlabAdapter {
    transport: RateLimitedTransport,
    api: String,
    token: String,
    owned_only: bool,
}

impl GitlabAdapter {
    /// Creates an adapter from the `[vcs]` section.
    pub fn new(config: &VcsConfig, transport: RateLimitedTransport) -> Self {
        Self {
            transport,
            api: format!("{}/api/v4", base_or(&config.base_url, DEFAULT_BASE_URL)),
            token: config.token.clone(),
            owned_only: config.mine_only,
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, VcsError> {
        let mut url = Url::parse(&self.api)
            .map_err(|e| VcsError::Config {
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

    /// Follows `X-Next-Page` until it is empty.
    async fn paginate<T>(&self, url: Url, query: &[(&str, String)]) -> Result<Vec<T>, VcsError>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut page = "1".to_owned();
        loop {
            let response = self
                .transport
                .send(|c| {
                    c.get(url.clone())
                        .header("PRIVATE-TOKEN", &self.token)
                        .query(query)
                        .query(&[("per_page", PER_PAGE), ("page", page.as_str())])
                })
                .await?;
            let next = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_owned())
                .unwrap_or_default();
            let batch: Vec<T> = decode_json(response).await?;
            items.extend(batch);

            if next.is_empty() {
                break;
            }
            debug!(page = next.as_str(), "gitlab paging");
            page = next;
        }
        Ok(items)
    }

    async fn raw_file(&self, id: u64, branch: &str, path: String) -> Result<Bytes, VcsError> {
        let id = id.to_string();
        // 파일 경로는 하나의 세그먼트로 인코딩 ('/' -> %2F)
        let url = self.url(&["projects", &id, "repository", "files", &path, "raw"])?;
        self.transport
            .get_bytes(|c| {
                c.get(url.clone())
                    .header("PRIVATE-TOKEN", &self.token)
                    .query(&[("ref", branch)])
            })
            .await
    }
}

impl BackendAdapter for GitlabAdapter {
    fn name(&self) -> &'static str {
        "gitlab"
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>, VcsError> {
        let url = self.url(&["projects"])?;
        let query = [
            ("owned", self.owned_only.to_string()),
            ("simple", "true".to_owned()),
            ("archived", "false".to_owned()),
        ];
        let projects: Vec<GitlabProject> = self.paginate(url, &query).await?;
        info!(count = projects.len(), "listed gitlab projects");

        Ok(projects
            .into_iter()
            .map(|p| Repository::new(p.id, p.name, p.default_branch.unwrap_or_default()))
            .collect())
    }

    async fn get_target_files(&self, id: u64, branch: &str) -> Result<TargetFiles, VcsError> {
        let id_str = id.to_string();
        let url = self.url(&["projects", &id_str, "repository", "tree"])?;
        let query = [
            ("ref", branch.to_owned()),
            ("recursive", "true".to_owned()),
        ];
        let nodes: Vec<GitlabTreeNode> = self.paginate(url, &query).await?;

        let entries = select_targets(
            nodes
                .into_iter()
                .filter(|n| n.kind == "blob")
                .map(|n| (n.path, n.id)),
        );
        collect_targets(self.name(), id, entries, |path| {
            self.raw_file(id, branch, path)
        })
        .await
    }
}
