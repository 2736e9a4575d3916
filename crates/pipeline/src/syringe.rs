//! 실행 오케스트레이터 -- 전체 단계 연결
//!
//! [`Syringe`]는 백엔드, 레지스트리 클라이언트, 분석기를 받아 한 번의 실행을
//! 처음부터 끝까지 수행하고 [`RunSummary`]를 반환합니다.
//!
//! # 내부 아키텍처
//!
//! ```text
//!  BackendAdapter::list_repositories ─┐   (tokio::join!)
//!  ProjectRegistry::list_projects ────┤
//!                                     ▼
//!                 RepositoryRegistry + RegistryIndex
//!                                     │
//!                                     ▼
//!                         discover (Semaphore, JoinSet)
//!                                     │
//!                                     ▼
//!                         reconcile ──► create_missing (mpsc 단일 writer)
//!                                     │
//!                                     ▼
//!                         reconcile ──► dispatch (Semaphore, JoinSet)
//!                                     │
//!                                     ▼
//!                                RunSummary
//! ```
//!
//! 저장소 목록 조회와 레지스트리 목록 조회 실패만 실행 전체를 중단시킵니다.
//! 나머지 실패는 단위 결과로만 기록됩니다.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use syringe_core::config::SyringeConfig;
use syringe_core::error::{ConfigError, SyringeError};
use syringe_core::types::{RegistryProject, Repository, RunSummary};
use syringe_vcs::{AnyBackend, BackendAdapter};

use crate::creation::create_missing;
use crate::discovery::{DiscoveryOptions, DiscoveryReport, discover};
use crate::dispatch::{DispatchOptions, dispatch};
use crate::phylum::{Analyzer, PhylumCli, ProjectRegistry};
use crate::reconcile::{RegistryIndex, reconcile};
use crate::registry::RepositoryRegistry;

/// 운영 구성: 설정으로 고른 백엔드 + `phylum` CLI
pub type PhylumSyringe = Syringe<AnyBackend, PhylumCli, PhylumCli>;

/// 실행 오케스트레이터
pub struct Syringe<B, R, A> {
    config: SyringeConfig,
    backend: Arc<B>,
    projects: Arc<R>,
    analyzer: Arc<A>,
    repositories: Arc<RepositoryRegistry>,
    index: Arc<RegistryIndex>,
}

impl PhylumSyringe {
    /// 설정만으로 운영 구성을 만듭니다.
    ///
    /// # Errors
    ///
    /// 설정 검증 실패, 백엔드 설정 누락(`vcs.org`, `vcs.owner` 등) 시 에러를 반환합니다.
    pub fn from_config(config: SyringeConfig) -> Result<Self, SyringeError> {
        let backend = AnyBackend::from_config(&config.vcs)?;
        let cli = Arc::new(PhylumCli::from_config(&config));
        SyringeBuilder::new()
            .config(config)
            .backend(Arc::new(backend))
            .project_registry(Arc::clone(&cli))
            .analyzer(cli)
            .build()
    }
}

impl<B: BackendAdapter, R: ProjectRegistry, A: Analyzer> Syringe<B, R, A> {
    /// 전체 파이프라인을 한 번 실행합니다.
    ///
    /// # Errors
    ///
    /// 저장소 목록 조회 또는 레지스트리 목록 조회가 실패하면 에러를 반환합니다.
    pub async fn run(&self) -> Result<RunSummary, SyringeError> {
        let (repository_count, existing_projects) = self.load_listings().await?;

        let discovery = self.discover().await;

        let first = reconcile(&self.repositories, &self.index);
        info!(
            lockfiles = first.lockfile_count,
            associated = first.associated,
            missing = first.to_create.len(),
            "reconciled lockfiles"
        );
        let creations = create_missing(
            first.to_create,
            Arc::clone(&self.projects),
            Arc::clone(&self.index),
            self.config.pipeline.creation_concurrency,
            self.task_timeout(),
        )
        .await;

        let second = reconcile(&self.repositories, &self.index);
        if !second.to_create.is_empty() {
            warn!(
                missing = second.to_create.len(),
                "some lockfiles still have no registry project"
            );
        }

        let analyses = dispatch(
            &self.repositories,
            Arc::clone(&self.index),
            Arc::clone(&self.projects),
            Arc::clone(&self.analyzer),
            self.dispatch_options(),
        )
        .await;

        let summary = RunSummary {
            repositories: repository_count,
            hydrated: self.repositories.hydrated_count(),
            lockfiles: self.repositories.lockfile_count(),
            existing_projects,
            discovery: discovery.outcomes,
            creations,
            analyses: analyses.outcomes,
        };
        info!(
            repositories = summary.repositories,
            hydrated = summary.hydrated,
            lockfiles = summary.lockfiles,
            created = summary.projects_created(),
            analyzed = summary.analyses_succeeded(),
            failed = summary.analyses_failed(),
            "run complete"
        );
        Ok(summary)
    }

    /// 저장소 목록만 조회해 레지스트리에 적재합니다.
    ///
    /// # Errors
    ///
    /// 백엔드 목록 조회 실패 시 에러를 반환합니다.
    pub async fn list_repositories(&self) -> Result<Vec<Repository>, SyringeError> {
        let repos = self.backend.list_repositories().await?;
        self.repositories.put(repos);
        Ok(self.repositories.snapshot())
    }

    /// 저장소와 레지스트리 목록을 함께 조회하고, lockfile 탐색 후 등록 여부를 연결합니다.
    ///
    /// 프로젝트 생성이나 분석은 하지 않습니다. 반환된 저장소의 lockfile 중 이미
    /// 등록된 것은 `registry_project`가 채워져 있습니다.
    ///
    /// # Errors
    ///
    /// 저장소 목록 조회 또는 레지스트리 목록 조회가 실패하면 에러를 반환합니다.
    pub async fn hydrate(&self) -> Result<(Vec<Repository>, DiscoveryReport), SyringeError> {
        self.load_listings().await?;
        let report = self.discover().await;
        let reconciled = reconcile(&self.repositories, &self.index);
        info!(
            lockfiles = reconciled.lockfile_count,
            associated = reconciled.associated,
            missing = reconciled.to_create.len(),
            "reconciled lockfiles"
        );
        Ok((self.repositories.snapshot(), report))
    }

    /// 저장소 목록과 레지스트리 목록을 동시에 조회해 레지스트리/인덱스에 적재합니다.
    ///
    /// (저장소 수, 기존 프로젝트 수)를 반환합니다.
    async fn load_listings(&self) -> Result<(usize, usize), SyringeError> {
        let (repos, projects) = tokio::join!(
            self.backend.list_repositories(),
            self.projects.list_projects()
        );
        let repos = repos?;
        let projects = projects?;
        let counts = (repos.len(), projects.len());
        info!(
            backend = self.backend.name(),
            repositories = counts.0,
            projects = counts.1,
            "listing complete"
        );

        self.repositories.put(repos);
        for project in projects {
            self.index.insert(project);
        }
        Ok(counts)
    }

    /// 레지스트리의 프로젝트 목록을 조회합니다.
    ///
    /// # Errors
    ///
    /// 레지스트리 CLI 실행 실패 시 에러를 반환합니다.
    pub async fn list_projects(&self) -> Result<Vec<RegistryProject>, SyringeError> {
        Ok(self.projects.list_projects().await?)
    }

    /// 작업 중인 저장소 레지스트리
    pub fn repositories(&self) -> &RepositoryRegistry {
        &self.repositories
    }

    /// 레지스트리 인덱스
    pub fn index(&self) -> &RegistryIndex {
        &self.index
    }

    /// 실행 설정
    pub fn config(&self) -> &SyringeConfig {
        &self.config
    }

    async fn discover(&self) -> DiscoveryReport {
        discover(
            Arc::clone(&self.backend),
            Arc::clone(&self.repositories),
            DiscoveryOptions {
                concurrency: self.config.pipeline.discovery_concurrency,
                timeout: self.task_timeout(),
            },
        )
        .await
    }

    fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.config.pipeline.task_timeout_secs)
    }

    fn dispatch_options(&self) -> DispatchOptions {
        let work_dir = self.config.general.work_dir.trim();
        DispatchOptions {
            concurrency: self.config.pipeline.analysis_concurrency,
            timeout: self.task_timeout(),
            jit_create: self.config.pipeline.jit_create,
            work_dir: (!work_dir.is_empty()).then(|| PathBuf::from(work_dir)),
            group: self.config.registry.group().map(str::to_owned),
        }
    }
}

/// [`Syringe`] 빌더
///
/// # 사용 예시
///
/// ```ignore
/// let syringe = SyringeBuilder::new()
///     .config(config)
///     .backend(Arc::new(backend))
///     .project_registry(Arc::clone(&cli))
///     .analyzer(cli)
///     .build()?;
/// let summary = syringe.run().await?;
/// ```
pub struct SyringeBuilder<B, R, A> {
    config: SyringeConfig,
    backend: Option<Arc<B>>,
    projects: Option<Arc<R>>,
    analyzer: Option<Arc<A>>,
}

impl<B, R, A> SyringeBuilder<B, R, A> {
    /// 기본 설정으로 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: SyringeConfig::default(),
            backend: None,
            projects: None,
            analyzer: None,
        }
    }

    /// 실행 설정을 지정합니다.
    pub fn config(mut self, config: SyringeConfig) -> Self {
        self.config = config;
        self
    }

    /// 백엔드 어댑터를 지정합니다.
    pub fn backend(mut self, backend: Arc<B>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// 레지스트리 클라이언트를 지정합니다.
    pub fn project_registry(mut self, projects: Arc<R>) -> Self {
        self.projects = Some(projects);
        self
    }

    /// 분석기를 지정합니다.
    pub fn analyzer(mut self, analyzer: Arc<A>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// 설정을 검증하고 오케스트레이터를 생성합니다.
    ///
    /// # Errors
    ///
    /// 설정 검증에 실패하거나 구성 요소가 빠져 있으면 에러를 반환합니다.
    pub fn build(self) -> Result<Syringe<B, R, A>, SyringeError> {
        self.config.validate()?;
        let backend = self.backend.ok_or_else(|| missing("backend"))?;
        let projects = self.projects.ok_or_else(|| missing("project_registry"))?;
        let analyzer = self.analyzer.ok_or_else(|| missing("analyzer"))?;

        Ok(Syringe {
            config: self.config,
            backend,
            projects,
            analyzer,
            repositories: Arc::new(RepositoryRegistry::new()),
            index: Arc::new(RegistryIndex::new()),
        })
    }
}

impl<B, R, A> Default for SyringeBuilder<B, R, A> {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(component: &str) -> SyringeError {
    ConfigError::InvalidValue {
        field: component.to_owned(),
        reason: "is required".to_owned(),
    }
    .into()
}
