//! 레지스트리 프로젝트 생성 단계
//!
//! 이름 하나당 생산자 태스크 하나가 `create_project`를 호출하고, 결과를 하나의
//! `mpsc` 채널로 보냅니다. 단일 소비자 태스크만 인덱스에 씁니다.
//!
//! ```text
//!  name ──► producer ──┐
//!  name ──► producer ──┼──► mpsc ──► consumer ──► RegistryIndex
//!  name ──► producer ──┘
//! ```
//!
//! 모든 생산자가 join되고 소비자가 닫힌 채널을 비운 뒤에 반환합니다.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use syringe_core::metrics as m;
use syringe_core::types::{RegistryProject, UnitOutcome};

use crate::error::PhylumError;
use crate::phylum::ProjectRegistry;
use crate::reconcile::RegistryIndex;

/// 생산자 -> 소비자 메시지
type Created = (String, Result<RegistryProject, PhylumError>);

/// 누락된 프로젝트를 이름마다 정확히 한 번씩 생성합니다.
///
/// 이미 인덱스에 있는 이름과 중복 이름은 건너뜁니다. 실패한 이름은 로그를 남기고
/// 이번 단계에서는 버립니다. 결과는 이름 순으로 정렬됩니다.
pub async fn create_missing<R: ProjectRegistry>(
    names: Vec<String>,
    client: Arc<R>,
    index: Arc<RegistryIndex>,
    concurrency: usize,
    timeout: Duration,
) -> Vec<UnitOutcome> {
    let unique: BTreeSet<String> = names.into_iter().collect();
    let mut outcomes = Vec::new();
    let mut pending = Vec::with_capacity(unique.len());
    for name in unique {
        if index.contains(&name) {
            outcomes.push(UnitOutcome::skipped(name, "already registered"));
        } else {
            pending.push(name);
        }
    }
    if pending.is_empty() {
        return outcomes;
    }
    info!(count = pending.len(), concurrency, "creating registry projects");

    let (tx, rx) = mpsc::channel::<Created>(concurrency.max(1));
    let consumer = tokio::spawn(consume(rx, Arc::clone(&index)));

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut producers = JoinSet::new();
    for name in pending {
        let client = Arc::clone(&client);
        let semaphore = Arc::clone(&semaphore);
        let tx = tx.clone();
        producers.spawn(async move {
            let result = match semaphore.acquire().await {
                Ok(_permit) => create_one(client.as_ref(), &name, timeout).await,
                Err(_) => Err(PhylumError::Registry {
                    command: "project create".to_owned(),
                    reason: "semaphore closed".to_owned(),
                }),
            };
            if tx.send((name, result)).await.is_err() {
                warn!("creation consumer stopped before all results were delivered");
            }
        });
    }
    drop(tx);

    while let Some(joined) = producers.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "creation task aborted");
        }
    }
    match consumer.await {
        Ok(created) => outcomes.extend(created),
        Err(e) => warn!(error = %e, "creation consumer aborted"),
    }

    outcomes.sort_by(|a, b| a.unit.cmp(&b.unit));
    outcomes
}

/// 제한 시간 안에 프로젝트 하나를 생성합니다.
///
/// 레지스트리가 요청과 다른 이름을 보고하면 `NameMismatch`로 실패합니다.
/// 인덱스에는 요청한 정규 이름으로만 프로젝트가 들어갑니다.
pub(crate) async fn create_one<R: ProjectRegistry>(
    client: &R,
    name: &str,
    timeout: Duration,
) -> Result<RegistryProject, PhylumError> {
    let project = match tokio::time::timeout(timeout, client.create_project(name)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(PhylumError::Timeout {
                what: format!("project create {name}"),
                secs: timeout.as_secs(),
            });
        }
    };
    if project.name != name {
        return Err(PhylumError::NameMismatch {
            requested: name.to_owned(),
            reported: project.name,
        });
    }
    Ok(project)
}

/// 채널이 닫힐 때까지 결과를 받아 인덱스에 기록합니다.
async fn consume(mut rx: mpsc::Receiver<Created>, index: Arc<RegistryIndex>) -> Vec<UnitOutcome> {
    let mut outcomes = Vec::new();
    while let Some((name, result)) = rx.recv().await {
        match result {
            Ok(project) => {
                let stored = index.insert(project);
                counter!(m::CREATION_PROJECTS_TOTAL, m::LABEL_RESULT => "success").increment(1);
                debug!(name = name.as_str(), id = stored.id.as_str(), "project indexed");
                outcomes.push(UnitOutcome::succeeded(name));
            }
            Err(e) => {
                counter!(
                    m::CREATION_PROJECTS_TOTAL,
                    m::LABEL_RESULT => "failure",
                    m::LABEL_KIND => e.kind().as_str()
                )
                .increment(1);
                warn!(name = name.as_str(), error = %e, "project creation failed");
                outcomes.push(UnitOutcome::failed(name, e.kind(), e.to_string()));
            }
        }
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use syringe_core::error::ErrorKind;

    /// 호출 횟수를 이름별로 세는 레지스트리
    #[derive(Default)]
    struct CountingRegistry {
        calls: Mutex<HashMap<String, usize>>,
        fail: Option<&'static str>,
        delay: Duration,
        lowercase_names: bool,
    }

    impl ProjectRegistry for CountingRegistry {
        async fn list_projects(&self) -> Result<Vec<RegistryProject>, PhylumError> {
            Ok(Vec::new())
        }

        async fn create_project(&self, name: &str) -> Result<RegistryProject, PhylumError> {
            *self
                .calls
                .lock()
                .unwrap()
                .entry(name.to_owned())
                .or_default() += 1;
            tokio::time::sleep(self.delay).await;
            if self.fail == Some(name) {
                return Err(PhylumError::Registry {
                    command: "project create".to_owned(),
                    reason: "quota exceeded".to_owned(),
                });
            }
            let reported = if self.lowercase_names {
                name.to_lowercase()
            } else {
                name.to_owned()
            };
            Ok(RegistryProject {
                name: reported,
                id: format!("id-{name}"),
                updated_at: String::new(),
                ecosystem: None,
            })
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[tokio::test]
    async fn duplicates_are_created_once() {
        let client = Arc::new(CountingRegistry::default());
        let index = Arc::new(RegistryIndex::new());

        let outcomes = create_missing(
            names(&["SYR-b", "SYR-a", "SYR-b", "SYR-a", "SYR-c"]),
            Arc::clone(&client),
            Arc::clone(&index),
            2,
            Duration::from_secs(10),
        )
        .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(UnitOutcome::is_success));
        assert_eq!(index.names(), names(&["SYR-a", "SYR-b", "SYR-c"]));
        let calls = client.calls.lock().unwrap();
        assert!(calls.values().all(|&n| n == 1));
    }

    #[tokio::test]
    async fn indexed_names_are_skipped() {
        let client = Arc::new(CountingRegistry::default());
        let index = Arc::new(RegistryIndex::new());
        index.insert(RegistryProject {
            name: "SYR-a".to_owned(),
            id: "existing".to_owned(),
            updated_at: String::new(),
            ecosystem: None,
        });

        let outcomes = create_missing(
            names(&["SYR-a"]),
            Arc::clone(&client),
            Arc::clone(&index),
            4,
            Duration::from_secs(10),
        )
        .await;
        assert!(!outcomes[0].is_success() && !outcomes[0].is_failure());
        assert!(client.calls.lock().unwrap().is_empty());
        assert_eq!(index.get("SYR-a").unwrap().id, "existing");
    }

    #[tokio::test]
    async fn failed_name_is_dropped_others_continue() {
        let client = Arc::new(CountingRegistry {
            fail: Some("SYR-bad"),
            ..Default::default()
        });
        let index = Arc::new(RegistryIndex::new());

        let outcomes = create_missing(
            names(&["SYR-bad", "SYR-good"]),
            client,
            Arc::clone(&index),
            4,
            Duration::from_secs(10),
        )
        .await;
        assert!(outcomes[0].is_failure());
        assert!(outcomes[1].is_success());
        assert!(!index.contains("SYR-bad"));
        assert!(index.contains("SYR-good"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_creation_times_out() {
        let client = Arc::new(CountingRegistry {
            delay: Duration::from_secs(120),
            ..Default::default()
        });
        let index = Arc::new(RegistryIndex::new());

        let outcomes = create_missing(
            names(&["SYR-slow"]),
            client,
            Arc::clone(&index),
            1,
            Duration::from_secs(5),
        )
        .await;
        match &outcomes[0].outcome {
            syringe_core::Outcome::Failed { kind, .. } => assert_eq!(*kind, ErrorKind::Timeout),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn renamed_project_is_a_failed_unit() {
        let client = Arc::new(CountingRegistry {
            lowercase_names: true,
            ..Default::default()
        });
        let index = Arc::new(RegistryIndex::new());

        let outcomes = create_missing(
            names(&["SYR-Svc__1__pom.xml"]),
            client,
            Arc::clone(&index),
            1,
            Duration::from_secs(10),
        )
        .await;

        match &outcomes[0].outcome {
            syringe_core::Outcome::Failed { kind, .. } => {
                assert_eq!(*kind, ErrorKind::NameConflict)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(index.is_empty(), "renamed project must not be indexed");
    }
}
