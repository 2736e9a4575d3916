//! 도메인 타입: 시스템 전역에서 사용되는 공통 타입
//!
//! 백엔드 어댑터, 파이프라인, CLI가 공유하는 데이터 구조를 정의합니다.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// VCS 저장소
///
/// 백엔드 어댑터의 목록 조회 결과로 생성되며, 실행 중에는 삭제되지 않습니다.
/// 레지스트리(`RepositoryRegistry`)가 소유하고, 탐색/조정 단계에서만 변경됩니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Repository {
    /// 백엔드 내 고유 숫자 ID
    pub id: u64,
    /// 표시 이름
    pub name: String,
    /// 기본 브랜치 이름 (코드가 없는 저장소는 빈 문자열)
    pub branch: String,
    /// 백엔드 고유 식별자 (Azure GUID, Bitbucket slug 등)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_key: Option<String>,
    /// 발견된 lockfile 목록
    #[serde(default)]
    pub lockfiles: Vec<LockfileReference>,
    /// 발견된 CI 설정 파일 목록
    #[serde(default)]
    pub ci_files: Vec<LockfileReference>,
    /// lockfile 탐색 완료 여부
    #[serde(default)]
    pub hydrated: bool,
}

impl Repository {
    /// 탐색 전 상태의 저장소를 생성합니다.
    pub fn new(id: u64, name: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            branch: branch.into(),
            ..Self::default()
        }
    }

    /// 백엔드 고유 식별자를 지정합니다.
    pub fn with_remote_key(mut self, key: impl Into<String>) -> Self {
        self.remote_key = Some(key.into());
        self
    }

    /// 레지스트리 프로젝트와 연결된 lockfile 수를 반환합니다.
    pub fn associated_count(&self) -> usize {
        self.lockfiles
            .iter()
            .filter(|lf| lf.registry_project.is_some())
            .count()
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.name, self.id, self.branch)
    }
}

/// 저장소 내 의존성 파일 (lockfile 또는 CI 설정 파일)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockfileReference {
    /// 파일 이름 (예: "requirements.txt")
    pub name: String,
    /// 저장소 루트 기준 상대 경로
    pub path: String,
    /// 백엔드 콘텐츠 식별자 (blob SHA, object id 등)
    pub content_id: String,
    /// 원본 파일 내용
    #[serde(skip)]
    pub content: Bytes,
    /// 연결된 레지스트리 프로젝트 (조회용 참조, 수명은 인덱스가 관리)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_project: Option<Arc<RegistryProject>>,
}

impl LockfileReference {
    /// 레지스트리 연결 없이 lockfile 참조를 생성합니다.
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        content_id: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            content_id: content_id.into(),
            content: content.into(),
            registry_project: None,
        }
    }
}

/// 백엔드 어댑터가 한 저장소에서 찾아낸 대상 파일
#[derive(Debug, Clone, Default)]
pub struct TargetFiles {
    /// 인식된 lockfile
    pub lockfiles: Vec<LockfileReference>,
    /// 인식된 CI 설정 파일
    pub ci_files: Vec<LockfileReference>,
}

/// 외부 보안 분석 레지스트리의 프로젝트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryProject {
    /// 정규 이름 (레지스트리 내 고유)
    pub name: String,
    /// 레지스트리 식별자
    pub id: String,
    /// 마지막 갱신 시각 (레지스트리가 보고한 문자열 그대로)
    #[serde(default)]
    pub updated_at: String,
    /// 생태계 태그 (npm, pypi 등)
    #[serde(default)]
    pub ecosystem: Option<String>,
}

/// 작업 단위 처리 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// 성공
    Succeeded,
    /// 처리 대상이 아니어서 건너뜀
    Skipped { reason: String },
    /// 실패 (해당 단위만 실패, 다른 작업에는 영향 없음)
    Failed { kind: ErrorKind, message: String },
}

/// 단위 작업(저장소, 프로젝트 이름, lockfile) 하나의 결과 레코드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOutcome {
    /// 작업 단위 식별자 (저장소 ID, 정규 이름 등)
    pub unit: String,
    /// 처리 결과
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl UnitOutcome {
    /// 성공 레코드를 생성합니다.
    pub fn succeeded(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            outcome: Outcome::Succeeded,
        }
    }

    /// 건너뜀 레코드를 생성합니다.
    pub fn skipped(unit: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            outcome: Outcome::Skipped {
                reason: reason.into(),
            },
        }
    }

    /// 실패 레코드를 생성합니다.
    pub fn failed(unit: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            outcome: Outcome::Failed {
                kind,
                message: message.into(),
            },
        }
    }

    /// 성공 여부
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Succeeded)
    }

    /// 실패 여부
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }
}

/// 전체 실행 요약
///
/// 파이프라인은 집계 에러를 반환하지 않습니다. 부분 실패는 이 요약과 로그로만 드러납니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// 목록 조회로 발견된 저장소 수
    pub repositories: usize,
    /// lockfile 탐색이 완료된 저장소 수
    pub hydrated: usize,
    /// 발견된 전체 lockfile 수
    pub lockfiles: usize,
    /// 실행 시작 시 레지스트리에 있던 프로젝트 수
    pub existing_projects: usize,
    /// 저장소별 탐색 결과
    pub discovery: Vec<UnitOutcome>,
    /// 프로젝트 이름별 생성 결과
    pub creations: Vec<UnitOutcome>,
    /// lockfile별 분석 결과
    pub analyses: Vec<UnitOutcome>,
}

impl RunSummary {
    /// 성공한 분석 수
    pub fn analyses_succeeded(&self) -> usize {
        self.analyses.iter().filter(|o| o.is_success()).count()
    }

    /// 실패한 분석 수
    pub fn analyses_failed(&self) -> usize {
        self.analyses.iter().filter(|o| o.is_failure()).count()
    }

    /// 성공한 프로젝트 생성 수
    pub fn projects_created(&self) -> usize {
        self.creations.iter().filter(|o| o.is_success()).count()
    }

    /// 실패한 프로젝트 생성 수
    pub fn creations_failed(&self) -> usize {
        self.creations.iter().filter(|o| o.is_failure()).count()
    }
}
