//! 저장소 레지스트리 -- 실행 중 작업 대상 저장소 집합
//!
//! 목록 조회 직후 한 번 [`RepositoryRegistry::put`]으로 채워지고, 이후에는
//! 탐색(lockfile 저장, hydrated 표시)과 조정(레지스트리 프로젝트 연결)만 변경합니다.
//!
//! 모든 접근은 하나의 `RwLock`으로 직렬화됩니다. 변경 클로저는 쓰기 가드를 쥔 채로
//! 실행되므로 `.await`를 포함할 수 없습니다.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use syringe_core::types::Repository;

/// 저장소 ID -> 저장소 맵
#[derive(Debug, Default)]
pub struct RepositoryRegistry {
    inner: RwLock<HashMap<u64, Repository>>,
}

impl RepositoryRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 작업 집합을 통째로 교체합니다.
    ///
    /// 같은 ID가 여러 번 나오면 마지막 항목이 남습니다.
    pub fn put(&self, repositories: Vec<Repository>) {
        let map = repositories.into_iter().map(|r| (r.id, r)).collect();
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = map;
    }

    /// 저장소 복사본을 반환합니다.
    pub fn get(&self, id: u64) -> Option<Repository> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// 쓰기 가드 아래에서 저장소 하나를 변경합니다.
    ///
    /// 저장소가 없으면 `None`을 반환하고 `mutator`는 호출되지 않습니다.
    pub fn update<T>(&self, id: u64, mutator: impl FnOnce(&mut Repository) -> T) -> Option<T> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&id)
            .map(mutator)
    }

    /// 정렬된 저장소 ID 목록
    pub fn ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// ID 순으로 정렬된 전체 저장소 복사본
    pub fn snapshot(&self) -> Vec<Repository> {
        let mut repos: Vec<Repository> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        repos.sort_unstable_by_key(|r| r.id);
        repos
    }

    /// 저장소 수
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 탐색이 완료된 저장소 수
    pub fn hydrated_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|r| r.hydrated)
            .count()
    }

    /// 탐색이 완료된 저장소들의 lockfile 총수
    pub fn lockfile_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|r| r.hydrated)
            .map(|r| r.lockfiles.len())
            .sum()
    }
}
