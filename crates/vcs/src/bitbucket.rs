//! Bitbucket Cloud adapter (REST API 2.0).
//!
//! - Listing: `GET /2.0/repositories/{workspace}?role=member`, `next`-link pagination
//! - Tree: `GET /2.0/repositories/{workspace}/{slug}/src/{branch}/?max_depth=N`
//! - Content: `GET /2.0/repositories/{workspace}/{slug}/src/{branch}/{path}`
//!
//! Authentication is either a bearer access token (`vcs.token`) or an OAuth
//! client-credentials exchange (`vcs.client_id` + `vcs.client_secret`) performed once
//! and cached for the adapter's lifetime.
//!
//! Repositories are identified by slug. The numeric id is derived from the
//! repository UUID.

use bytes::Bytes;
use reqwest::Url;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use syringe_core::config::VcsConfig;
use syringe_core::types::{Repository, TargetFiles};

use crate::backend::{BackendAdapter, RemoteKeys, base_or, collect_targets, id_from_uuid};
use crate::error::VcsError;
use crate::lockfile::select_targets;
use crate::transport::RateLimitedTransport;

const DEFAULT_BASE_URL: &str = "https://api.bitbucket.org";
const DEFAULT_TOKEN_URL: &str = "https://bitbucket.org/site/oauth2/access_token";
const TOKEN_PATH: &str = "site/oauth2/access_token";
const MAX_DEPTH: &str = "500";
const PAGE_LEN: &str = "100";

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    values: Vec<T>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BitbucketRepo {
    uuid: String,
    slug: String,
    #[serde(default)]
    mainbranch: Option<BitbucketBranch>,
}

#[derive(Debug, Deserialize)]
struct BitbucketBranch {
    name: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    commit: Option<BitbucketCommit>,
}

#[derive(Debug, Deserialize)]
struct BitbucketCommit {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug)]
enum Credentials {
    Token(String),
    ClientCredentials { id: String, secret: String },
}

/// Bitbucket Cloud backend adapter.
#[derive(Debug)]
pub struct BitbucketAdapter {
    transport: RateLimitedTransport,
    api: String,
    token_url: String,
    workspace: String,
    credentials: Credentials,
    access_token: OnceCell<String>,
    keys: RemoteKeys,
}

impl BitbucketAdapter {
    /// Creates an adapter from the `[vcs]` section.
    ///
    /// With a custom `vcs.base_url` the OAuth token endpoint is resolved against the
    /// same host.
    ///
    /// # Errors
    ///
    /// Returns `VcsError::Config` if `vcs.owner` is empty or neither a token nor
    /// client credentials are configured.
    pub fn new(config: &VcsConfig, transport: RateLimitedTransport) -> Result<Self, VcsError> {
        let workspace = config.owner.trim();
        if workspace.is_empty() {
            return Err(VcsError::Config {
                field: "vcs.owner".to_owned(),
                reason: "bitbucket requires a workspace owner".to_owned(),
            });
        }

        let credentials = if !config.token.is_empty() {
            Credentials::Token(config.token.clone())
        } else if !config.client_id.is_empty() && !config.client_secret.is_empty() {
            Credentials::ClientCredentials {
                id: config.client_id.clone(),
                secret: config.client_secret.clone(),
            }
        } else {
            return Err(VcsError::Config {
                field: "vcs.token".to_owned(),
                reason: "bitbucket requires a token or client_id/client_secret".to_owned(),
            });
        };

        let custom_base = !config.base_url.trim().is_empty();
        let api = base_or(&config.base_url, DEFAULT_BASE_URL);
        let token_url = if custom_base {
            format!("{api}/{TOKEN_PATH}")
        } else {
            DEFAULT_TOKEN_URL.to_owned()
        };

        Ok(Self {
            transport,
            api,
            token_url,
            workspace: workspace.to_owned(),
            credentials,
            access_token: OnceCell::new(),
            keys: RemoteKeys::default(),
        })
    }

    /// Returns the bearer token, exchanging client credentials on first use.
    async fn bearer(&self) -> Result<&str, VcsError> {
        match &self.credentials {
            Credentials::Token(token) => Ok(token.as_str()),
            Credentials::ClientCredentials { id, secret } => {
                let token = self
                    .access_token
                    .get_or_try_init(|| async {
                        let response: TokenResponse = self
                            .transport
                            .get_json(|c| {
                                c.post(&self.token_url)
                                    .basic_auth(id, Some(secret))
                                    .form(&[("grant_type", "client_credentials")])
                            })
                            .await?;
                        debug!("obtained bitbucket access token");
                        Ok::<_, VcsError>(response.access_token)
                    })
                    .await?;
                Ok(token.as_str())
            }
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
            .extend(["2.0", "repositories", self.workspace.as_str()])
            .extend(segments);
        Ok(url)
    }

    /// Fetches `first` and every page linked through `next`.
    async fn paginate<T>(&self, first: Url, query: &[(&str, &str)]) -> Result<Vec<T>, VcsError>
    where
        T: serde::de::DeserializeOwned,
    {
        let token = self.bearer().await?;
        let mut items = Vec::new();
        let mut next: Option<String> = None;
        loop {
            let page: Page<T> = match &next {
                // next 링크는 쿼리를 이미 포함
                Some(link) => {
                    self.transport
                        .get_json(|c| c.get(link.as_str()).bearer_auth(token))
                        .await?
                }
                None => {
                    self.transport
                        .get_json(|c| c.get(first.clone()).bearer_auth(token).query(query))
                        .await?
                }
            };
            items.extend(page.values);
            match page.next {
                Some(link) => {
                    debug!("bitbucket paging");
                    next = Some(link);
                }
                None => break,
            }
        }
        Ok(items)
    }

    async fn raw_file(&self, slug: &str, branch: &str, path: String) -> Result<Bytes, VcsError> {
        let token = self.bearer().await?;
        let mut segments = vec![slug, "src", branch];
        segments.extend(path.split('/'));
        let url = self.url(&segments)?;
        self.transport
            .get_bytes(|c| c.get(url.clone()).bearer_auth(token))
            .await
    }
}

impl BackendAdapter for BitbucketAdapter {
    fn name(&self) -> &'static str {
        "bitbucket_cloud"
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>, VcsError> {
        let url = self.url(&[])?;
        let raw: Vec<BitbucketRepo> = self
            .paginate(url, &[("role", "member"), ("pagelen", PAGE_LEN)])
            .await?;
        info!(
            count = raw.len(),
            workspace = self.workspace.as_str(),
            "listed bitbucket repositories"
        );

        let mut repos = Vec::with_capacity(raw.len());
        for repo in raw {
            let id = match id_from_uuid(&repo.uuid) {
                Ok(id) => id,
                Err(e) => {
                    warn!(
                        slug = repo.slug.as_str(),
                        uuid = repo.uuid.as_str(),
                        error = %e,
                        "malformed repository uuid, skipping repository"
                    );
                    continue;
                }
            };
            if !self.keys.insert(id, &repo.slug) {
                warn!(
                    slug = repo.slug.as_str(),
                    uuid = repo.uuid.as_str(),
                    id,
                    "numeric id collision, skipping repository"
                );
                continue;
            }
            let branch = repo.mainbranch.map(|b| b.name).unwrap_or_default();
            repos.push(Repository::new(id, repo.slug.clone(), branch).with_remote_key(repo.slug));
        }
        Ok(repos)
    }

    async fn get_target_files(&self, id: u64, branch: &str) -> Result<TargetFiles, VcsError> {
        let slug = self.keys.get(id)?;
        // 디렉토리 목록 요청은 경로 끝에 '/'가 필요
        let url = self.url(&[slug.as_str(), "src", branch, ""])?;
        let entries: Vec<BitbucketEntry> = self
            .paginate(url, &[("max_depth", MAX_DEPTH), ("pagelen", PAGE_LEN)])
            .await?;

        let targets = select_targets(
            entries
                .into_iter()
                .filter(|e| e.kind == "commit_file")
                .map(|e| {
                    let hash = e.commit.map(|c| c.hash).unwrap_or_default();
                    (e.path, hash)
                }),
        );
        collect_targets(self.name(), id, targets, |path| {
            self.raw_file(&slug, branch, path)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::test_server::{StubResponse, StubServer};

    const UUID: &str = "{00000007-aaaa-4bbb-8ccc-dddddddddddd}";

    fn config(base_url: &str) -> VcsConfig {
        VcsConfig {
            base_url: base_url.to_owned(),
            owner: "acme".to_owned(),
            client_id: "cid".to_owned(),
            client_secret: "csecret".to_owned(),
            ..VcsConfig::default()
        }
    }

    fn adapter(config: &VcsConfig) -> BitbucketAdapter {
        BitbucketAdapter::new(
            config,
            RateLimitedTransport::builder("bitbucket_cloud").build().unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn client_credentials_exchanged_once_and_pages_followed() {
        let token_calls = Arc::new(AtomicUsize::new(0));
        let token_calls_clone = Arc::clone(&token_calls);
        let server = Arc::new(std::sync::OnceLock::<String>::new());
        let server_url = Arc::clone(&server);

        let stub = StubServer::start(move |req| {
            let path = req.path();
            if path == "/site/oauth2/access_token" {
                token_calls_clone.fetch_add(1, Ordering::SeqCst);
                assert_eq!(req.method, "POST");
                assert!(String::from_utf8_lossy(&req.body).contains("client_credentials"));
                return StubResponse::json(r#"{"access_token":"tok","expires_in":7200}"#);
            }
            assert_eq!(req.header("Authorization"), Some("Bearer tok"));
            if path == "/2.0/repositories/acme" && req.query("page").is_none() {
                let base = server_url.get().cloned().unwrap_or_default();
                StubResponse::json(&format!(
                    r#"{{"values":[{{"uuid":"{UUID}","slug":"svc-a","mainbranch":{{"name":"main"}}}}],
                        "next":"{base}/2.0/repositories/acme?role=member&page=2"}}"#
                ))
            } else if path == "/2.0/repositories/acme" {
                StubResponse::json(
                    r#"{"values":[{"uuid":"{00000008-0000-4000-8000-000000000000}","slug":"empty"}]}"#,
                )
            } else {
                StubResponse::status(404)
            }
        })
        .await;
        server.set(stub.base_url()).unwrap();

        let bb = adapter(&config(&stub.base_url()));
        let repos = bb.list_repositories().await.unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].id, 7);
        assert_eq!(repos[0].name, "svc-a");
        assert_eq!(repos[0].branch, "main");
        assert_eq!(repos[1].branch, "");

        // 두 번째 호출에서도 토큰은 재사용
        let _ = bb.get_target_files(7, "main").await;
        assert_eq!(token_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn src_listing_keeps_commit_files_only() {
        let stub = StubServer::start(|req| {
            let path = req.path();
            if path == "/2.0/repositories/acme" {
                StubResponse::json(&format!(
                    r#"{{"values":[{{"uuid":"{UUID}","slug":"svc-a","mainbranch":{{"name":"main"}}}}]}}"#
                ))
            } else if path == "/2.0/repositories/acme/svc-a/src/main/" {
                assert_eq!(req.query("max_depth").as_deref(), Some(MAX_DEPTH));
                StubResponse::json(
                    r#"{"values":[
                        {"path":"app","type":"commit_directory"},
                        {"path":"app/poetry.lock","type":"commit_file","commit":{"hash":"h1"}},
                        {"path":"app/main.py","type":"commit_file","commit":{"hash":"h1"}}
                    ]}"#,
                )
            } else if path == "/2.0/repositories/acme/svc-a/src/main/app/poetry.lock" {
                StubResponse::status(200).with_body("[[package]]\n")
            } else {
                StubResponse::status(404)
            }
        })
        .await;

        let mut cfg = config(&stub.base_url());
        cfg.token = "tok".to_owned();
        let bb = adapter(&cfg);
        bb.list_repositories().await.unwrap();
        let lockfiles = bb.get_lockfiles(7, "main").await.unwrap();
        assert_eq!(lockfiles.len(), 1);
        assert_eq!(lockfiles[0].path, "app/poetry.lock");
        assert_eq!(lockfiles[0].content_id, "h1");
    }

    #[tokio::test]
    async fn malformed_uuid_skips_only_that_repository() {
        let stub = StubServer::start(|req| {
            if req.path() == "/2.0/repositories/acme" {
                StubResponse::json(&format!(
                    r#"{{"values":[
                        {{"uuid":"{{garbage}}","slug":"broken"}},
                        {{"uuid":"{UUID}","slug":"svc-a","mainbranch":{{"name":"main"}}}}
                    ]}}"#
                ))
            } else {
                StubResponse::status(404)
            }
        })
        .await;

        let mut cfg = config(&stub.base_url());
        cfg.token = "tok".to_owned();
        let repos = adapter(&cfg).list_repositories().await.unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].name, "svc-a");
        assert_eq!(repos[0].id, 7);
    }

    #[test]
    fn requires_some_credentials() {
        let cfg = VcsConfig {
            owner: "acme".to_owned(),
            ..VcsConfig::default()
        };
        let err = BitbucketAdapter::new(
            &cfg,
            RateLimitedTransport::builder("bitbucket_cloud").build().unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, VcsError::Config { .. }));
    }
}
