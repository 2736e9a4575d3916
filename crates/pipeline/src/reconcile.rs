//! 이름 조정 -- lockfile과 레지스트리 프로젝트 연결
//!
//! [`RegistryIndex`]는 레지스트리 전체 목록으로 한 번 만들어지고 이후 확장만 됩니다.
//! [`reconcile`]은 탐색된 저장소의 lockfile마다 정규 이름을 계산해 인덱스에 있으면
//! 연결하고, 없으면 생성 대상 목록에 추가합니다.
//!
//! # 잠금 순서
//!
//! `RepositoryRegistry` 쓰기 가드 안에서 인덱스 읽기 가드를 잡습니다.
//! 반대 순서로 잠그는 코드는 없습니다.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use syringe_core::types::RegistryProject;

use crate::naming::generate_name;
use crate::registry::RepositoryRegistry;

/// 정규 이름 -> 레지스트리 프로젝트
#[derive(Debug, Default)]
pub struct RegistryIndex {
    inner: RwLock<HashMap<String, Arc<RegistryProject>>>,
}

impl RegistryIndex {
    /// 빈 인덱스를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 레지스트리 목록으로 인덱스를 만듭니다.
    ///
    /// 같은 이름이 여러 번 나오면 처음 항목이 남습니다.
    pub fn from_projects(projects: impl IntoIterator<Item = RegistryProject>) -> Self {
        let index = Self::new();
        for project in projects {
            index.insert(project);
        }
        index
    }

    /// 이름으로 프로젝트를 찾습니다.
    pub fn get(&self, name: &str) -> Option<Arc<RegistryProject>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// 이름이 등록되어 있는지 확인합니다.
    pub fn contains(&self, name: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// 프로젝트를 추가하고 인덱스에 저장된 항목을 반환합니다.
    ///
    /// 이미 같은 이름이 있으면 기존 항목을 그대로 두고 반환합니다.
    pub fn insert(&self, project: RegistryProject) -> Arc<RegistryProject> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(project.name.clone())
            .or_insert_with(|| Arc::new(project))
            .clone()
    }

    /// 등록된 프로젝트 수
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 정렬된 이름 목록
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort_unstable();
        names
    }

    /// 이름 순으로 정렬된 프로젝트 복사본
    pub fn projects(&self) -> Vec<Arc<RegistryProject>> {
        let mut projects: Vec<Arc<RegistryProject>> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        projects.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        projects
    }
}

/// 조정 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// 생성해야 할 이름 (중복 제거, 정렬)
    pub to_create: Vec<String>,
    /// 검사한 lockfile 수
    pub lockfile_count: usize,
    /// 프로젝트와 연결된 lockfile 수
    pub associated: usize,
}

/// 탐색된 모든 저장소의 lockfile을 인덱스와 맞춥니다.
///
/// 인덱스에 있는 이름은 lockfile에 연결하고, 없는 이름은 연결을 지우고
/// `to_create`에 모읍니다. 탐색되지 않은 저장소는 건너뜁니다.
pub fn reconcile(registry: &RepositoryRegistry, index: &RegistryIndex) -> Reconciliation {
    let mut missing = BTreeSet::new();
    let mut lockfile_count = 0;
    let mut associated = 0;

    for id in registry.ids() {
        registry.update(id, |repo| {
            if !repo.hydrated {
                return;
            }
            for lockfile in &mut repo.lockfiles {
                lockfile_count += 1;
                let name = generate_name(&repo.name, repo.id, &lockfile.path);
                match index.get(&name) {
                    Some(project) => {
                        lockfile.registry_project = Some(project);
                        associated += 1;
                    }
                    None => {
                        lockfile.registry_project = None;
                        missing.insert(name);
                    }
                }
            }
        });
    }

    debug!(
        lockfiles = lockfile_count,
        associated,
        missing = missing.len(),
        "reconciled lockfiles against registry index"
    );
    Reconciliation {
        to_create: missing.into_iter().collect(),
        lockfile_count,
        associated,
    }
}
