//! 분석 디스패치 단계
//!
//! 탐색된 저장소의 lockfile마다 태스크 하나를 띄워 분석을 실행합니다.
//!
//! # 태스크 하나의 흐름
//!
//! 1. 분석 세마포어 permit 획득
//! 2. 연결된 프로젝트가 없으면 인덱스 재확인, 그래도 없고 `jit_create`가 켜져 있으면
//!    그 이름 하나만 생성해 인덱스에 등록
//! 3. 임시 디렉토리 준비 (lockfile + `.phylum_project`)
//! 4. 제한 시간 안에 `Analyzer::analyze` 실행
//! 5. 디렉토리 삭제 (drop), 진행률 한 칸 전진
//!
//! 실패는 해당 lockfile 결과에만 기록되고 다른 태스크에는 영향을 주지 않습니다.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::histogram;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use syringe_core::error::ErrorKind;
use syringe_core::metrics as m;
use syringe_core::types::{LockfileReference, RegistryProject, UnitOutcome};

use crate::creation::create_one;
use crate::error::PhylumError;
use crate::naming::generate_name;
use crate::phylum::{Analyzer, ProjectRegistry};
use crate::progress::Progress;
use crate::reconcile::RegistryIndex;
use crate::registry::RepositoryRegistry;
use crate::workspace::AnalysisWorkspace;

/// 분석 단계 옵션
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// 동시 분석 수
    pub concurrency: usize,
    /// 분석(및 즉시 생성) 하나의 제한 시간
    pub timeout: Duration,
    /// 프로젝트가 없는 lockfile을 즉시 생성할지 여부
    pub jit_create: bool,
    /// 임시 디렉토리 상위 경로 (없으면 시스템 임시 디렉토리)
    pub work_dir: Option<PathBuf>,
    /// `.phylum_project`에 기록할 그룹
    pub group: Option<String>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 50,
            timeout: Duration::from_secs(600),
            jit_create: true,
            work_dir: None,
            group: None,
        }
    }
}

/// 분석 단계 결과
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// 분석 대상 lockfile 수
    pub total: usize,
    /// lockfile별 결과 (정규 이름 순)
    pub outcomes: Vec<UnitOutcome>,
}

impl DispatchReport {
    /// 성공한 분석 수
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// 실패한 분석 수
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }
}

/// 분석 작업 하나
struct WorkItem {
    name: String,
    lockfile: LockfileReference,
}

/// 탐색된 모든 lockfile의 분석을 실행합니다.
pub async fn dispatch<R: ProjectRegistry, A: Analyzer>(
    registry: &RepositoryRegistry,
    index: Arc<RegistryIndex>,
    creator: Arc<R>,
    analyzer: Arc<A>,
    options: DispatchOptions,
) -> DispatchReport {
    let items: Vec<WorkItem> = registry
        .snapshot()
        .into_iter()
        .filter(|r| r.hydrated)
        .flat_map(|repo| {
            let (name, id) = (repo.name, repo.id);
            repo.lockfiles.into_iter().map(move |lockfile| WorkItem {
                name: generate_name(&name, id, &lockfile.path),
                lockfile,
            })
        })
        .collect();

    let total = items.len();
    let progress = Arc::new(Progress::new(total));
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let options = Arc::new(options);
    let mut join_set: JoinSet<UnitOutcome> = JoinSet::new();

    info!(
        total,
        concurrency = options.concurrency,
        jit_create = options.jit_create,
        "dispatching analyses"
    );

    for item in items {
        let index = Arc::clone(&index);
        let creator = Arc::clone(&creator);
        let analyzer = Arc::clone(&analyzer);
        let semaphore = Arc::clone(&semaphore);
        let progress = Arc::clone(&progress);
        let options = Arc::clone(&options);

        join_set.spawn(async move {
            let outcome = match semaphore.acquire().await {
                Ok(_permit) => {
                    analyze_one(item, &index, creator.as_ref(), analyzer.as_ref(), &options).await
                }
                Err(_) => UnitOutcome::failed(item.name, ErrorKind::Workspace, "semaphore closed"),
            };
            progress.advance(result_label(&outcome));
            outcome
        });
    }

    let mut outcomes = Vec::with_capacity(total);
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => warn!(error = %e, "analysis task aborted"),
        }
    }
    outcomes.sort_by(|a, b| a.unit.cmp(&b.unit));

    if !progress.is_done() {
        warn!(
            completed = progress.completed(),
            total = progress.total(),
            "analysis dispatch ended with unfinished tasks"
        );
    }

    let report = DispatchReport { total, outcomes };
    info!(
        total,
        succeeded = report.succeeded(),
        failed = report.failed(),
        completed = progress.completed(),
        "analysis dispatch finished"
    );
    report
}

async fn analyze_one<R: ProjectRegistry, A: Analyzer>(
    item: WorkItem,
    index: &RegistryIndex,
    creator: &R,
    analyzer: &A,
    options: &DispatchOptions,
) -> UnitOutcome {
    let WorkItem { name, lockfile } = item;

    let project = match resolve_project(&name, &lockfile, index, creator, options).await {
        Ok(Some(project)) => project,
        Ok(None) => {
            debug!(name = name.as_str(), "no registry project, skipping analysis");
            return UnitOutcome::skipped(name, "no registry project");
        }
        Err(e) => {
            warn!(name = name.as_str(), error = %e, "just-in-time project creation failed");
            return UnitOutcome::failed(name, e.kind(), e.to_string());
        }
    };

    let started = Instant::now();
    let result = run_analysis(&lockfile, &project, analyzer, options).await;
    histogram!(m::ANALYSIS_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

    match result {
        Ok(()) => {
            debug!(name = name.as_str(), "analysis succeeded");
            UnitOutcome::succeeded(name)
        }
        Err(e) => {
            warn!(
                name = name.as_str(),
                path = lockfile.path.as_str(),
                kind = %e.kind(),
                error = %e,
                "analysis failed"
            );
            UnitOutcome::failed(name, e.kind(), e.to_string())
        }
    }
}

/// lockfile에 연결할 프로젝트를 찾거나 즉시 생성합니다.
async fn resolve_project<R: ProjectRegistry>(
    name: &str,
    lockfile: &LockfileReference,
    index: &RegistryIndex,
    creator: &R,
    options: &DispatchOptions,
) -> Result<Option<Arc<RegistryProject>>, PhylumError> {
    if let Some(project) = &lockfile.registry_project {
        return Ok(Some(Arc::clone(project)));
    }
    if let Some(project) = index.get(name) {
        return Ok(Some(project));
    }
    if !options.jit_create {
        return Ok(None);
    }
    let created = create_one(creator, name, options.timeout).await?;
    info!(name, "created registry project just in time");
    Ok(Some(index.insert(created)))
}

/// 작업 디렉토리를 준비하고 분석기를 실행합니다. 디렉토리는 반환 시 삭제됩니다.
async fn run_analysis<A: Analyzer>(
    lockfile: &LockfileReference,
    project: &RegistryProject,
    analyzer: &A,
    options: &DispatchOptions,
) -> Result<(), PhylumError> {
    let workspace = AnalysisWorkspace::prepare(
        options.work_dir.as_deref(),
        lockfile,
        project,
        options.group.as_deref(),
    )
    .await?;
    debug!(
        project = project.name.as_str(),
        lockfile = %workspace.lockfile_path().display(),
        "analysis workspace prepared"
    );

    match tokio::time::timeout(
        options.timeout,
        analyzer.analyze(workspace.path(), workspace.lockfile_name(), project),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(PhylumError::Timeout {
            what: format!("analyze {}", project.name),
            secs: options.timeout.as_secs(),
        }),
    }
}

fn result_label(outcome: &UnitOutcome) -> &'static str {
    match outcome.outcome {
        syringe_core::Outcome::Succeeded => "success",
        syringe_core::Outcome::Skipped { .. } => "skipped",
        syringe_core::Outcome::Failed { .. } => "failure",
    }
}
