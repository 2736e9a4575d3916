//! Lockfile 탐색 단계
//!
//! 아직 탐색되지 않은 저장소마다 태스크 하나를 띄워 백엔드에서 lockfile과 CI 파일을
//! 받아옵니다. 동시 실행 수는 세마포어로 제한하고, 태스크마다 제한 시간을 둡니다.
//!
//! # 동작
//!
//! - 기본 브랜치가 비어 있는 저장소는 백엔드 호출 없이 `Skipped`
//! - 성공: lockfile/CI 파일 저장 후 `hydrated = true`
//! - `NotFound`(빈 저장소): info 로그, `Skipped`
//! - 그 밖의 실패/타임아웃: warn 로그, `Failed`, 저장소는 미탐색 상태로 남음
//!
//! [`discover`]는 모든 태스크가 join된 뒤에만 반환합니다.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use syringe_core::error::ErrorKind;
use syringe_core::metrics as m;
use syringe_core::types::{Repository, UnitOutcome};
use syringe_vcs::{BackendAdapter, VcsError};

use crate::registry::RepositoryRegistry;

/// 탐색 단계 옵션
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryOptions {
    /// 동시 탐색 수
    pub concurrency: usize,
    /// 저장소 하나의 제한 시간
    pub timeout: Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            concurrency: 50,
            timeout: Duration::from_secs(600),
        }
    }
}

/// 탐색 단계 결과
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// 백엔드를 호출한 저장소 수
    pub attempted: usize,
    /// 이번 단계에서 탐색이 완료된 저장소 수
    pub hydrated: usize,
    /// 이번 단계에서 발견된 lockfile 수
    pub lockfiles: usize,
    /// 저장소별 결과 (저장소 ID 순)
    pub outcomes: Vec<UnitOutcome>,
}

/// 미탐색 저장소 전체의 lockfile을 받아옵니다.
pub async fn discover<B: BackendAdapter>(
    backend: Arc<B>,
    registry: Arc<RepositoryRegistry>,
    options: DiscoveryOptions,
) -> DiscoveryReport {
    let pending: Vec<Repository> = registry
        .snapshot()
        .into_iter()
        .filter(|r| !r.hydrated)
        .collect();

    let mut report = DiscoveryReport::default();
    let mut results: Vec<(u64, UnitOutcome)> = Vec::with_capacity(pending.len());
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut join_set: JoinSet<(u64, UnitOutcome, usize)> = JoinSet::new();

    info!(
        backend = backend.name(),
        pending = pending.len(),
        concurrency = options.concurrency,
        "starting lockfile discovery"
    );

    for repo in pending {
        let unit = repo.to_string();
        if repo.branch.is_empty() {
            debug!(repo = %unit, "no default branch, skipping");
            counter!(m::DISCOVERY_REPOSITORIES_TOTAL, m::LABEL_RESULT => "skipped").increment(1);
            results.push((repo.id, UnitOutcome::skipped(unit, "no default branch")));
            continue;
        }

        report.attempted += 1;
        let backend = Arc::clone(&backend);
        let registry = Arc::clone(&registry);
        let semaphore = Arc::clone(&semaphore);

        join_set.spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    let outcome =
                        UnitOutcome::failed(unit, ErrorKind::BackendUnavailable, "semaphore closed");
                    return (repo.id, outcome, 0);
                }
            };
            hydrate(backend.as_ref(), &registry, &repo, unit, options.timeout).await
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((id, outcome, lockfiles)) => {
                if outcome.is_success() {
                    report.hydrated += 1;
                    report.lockfiles += lockfiles;
                }
                results.push((id, outcome));
            }
            Err(e) => warn!(error = %e, "discovery task aborted"),
        }
    }

    results.sort_by_key(|(id, _)| *id);
    report.outcomes = results.into_iter().map(|(_, o)| o).collect();
    info!(
        attempted = report.attempted,
        hydrated = report.hydrated,
        lockfiles = report.lockfiles,
        "lockfile discovery finished"
    );
    report
}

/// 저장소 하나를 탐색하고 결과를 레지스트리에 반영합니다.
async fn hydrate<B: BackendAdapter>(
    backend: &B,
    registry: &RepositoryRegistry,
    repo: &Repository,
    unit: String,
    timeout: Duration,
) -> (u64, UnitOutcome, usize) {
    let result = tokio::time::timeout(timeout, backend.get_target_files(repo.id, &repo.branch)).await;

    let outcome = match result {
        Ok(Ok(files)) => {
            let lockfiles = files.lockfiles.len();
            registry.update(repo.id, |r| {
                r.lockfiles = files.lockfiles;
                r.ci_files = files.ci_files;
                r.hydrated = true;
            });
            counter!(m::DISCOVERY_REPOSITORIES_TOTAL, m::LABEL_RESULT => "success").increment(1);
            counter!(m::DISCOVERY_LOCKFILES_TOTAL).increment(lockfiles as u64);
            debug!(repo = %unit, lockfiles, "repository hydrated");
            return (repo.id, UnitOutcome::succeeded(unit), lockfiles);
        }
        Ok(Err(VcsError::NotFound(reason))) => {
            info!(repo = %unit, reason = %reason, "repository has no tree, skipping");
            counter!(m::DISCOVERY_REPOSITORIES_TOTAL, m::LABEL_RESULT => "skipped").increment(1);
            UnitOutcome::skipped(unit, reason)
        }
        Ok(Err(e)) => {
            warn!(repo = %unit, error = %e, "lockfile discovery failed");
            counter!(m::DISCOVERY_REPOSITORIES_TOTAL, m::LABEL_RESULT => "failure").increment(1);
            UnitOutcome::failed(unit, e.kind(), e.to_string())
        }
        Err(_) => {
            warn!(
                repo = %unit,
                timeout_secs = timeout.as_secs(),
                "lockfile discovery timed out"
            );
            counter!(m::DISCOVERY_REPOSITORIES_TOTAL, m::LABEL_RESULT => "failure").increment(1);
            UnitOutcome::failed(
                unit,
                ErrorKind::Timeout,
                format!("timed out after {}s", timeout.as_secs()),
            )
        }
    };
    (repo.id, outcome, 0)
}
