//! 에러 타입: 도메인별 에러 정의
//!
//! 각 크레이트는 자체 에러(`VcsError`, `PhylumError`)를 정의하고
//! `From` 구현을 통해 [`SyringeError`]로 전파합니다.

use serde::{Deserialize, Serialize};

/// Syringe 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum SyringeError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// VCS 백엔드 에러
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// 외부 레지스트리/스캐너 에러
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyringeError {
    /// 에러 분류를 반환합니다.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Backend(e) => e.kind(),
            Self::Registry(e) => e.kind(),
            Self::Io(_) => ErrorKind::Workspace,
        }
    }
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// VCS 백엔드 에러
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// 백엔드에 연결할 수 없거나 5xx 응답
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// 인증 실패 (401/403)
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// 대상 리소스 없음 (빈 저장소, 없는 브랜치)
    #[error("not found: {0}")]
    NotFound(String),

    /// 재시도 후에도 rate limit 거부
    #[error("rate limited: {0}")]
    RateLimited(String),
}

impl BackendError {
    /// 에러 분류를 반환합니다.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) => ErrorKind::BackendUnavailable,
            Self::Authentication(_) => ErrorKind::AuthenticationError,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::RateLimited(_) => ErrorKind::RateLimited,
        }
    }
}

/// 외부 레지스트리/스캐너 에러
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// 레지스트리 CLI 실행 실패 또는 응답 해석 불가
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    /// 같은 이름의 프로젝트가 이미 존재
    #[error("project name conflict: {0}")]
    NameConflict(String),

    /// 스캐너 프로세스가 0이 아닌 코드로 종료
    #[error("scanner process failed: {0}")]
    ScannerProcess(String),

    /// 작업 제한 시간 초과
    #[error("timed out: {0}")]
    Timeout(String),

    /// 임시 작업 디렉토리 I/O 실패
    #[error("workspace error: {0}")]
    Workspace(String),
}

impl RegistryError {
    /// 에러 분류를 반환합니다.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) => ErrorKind::RegistryUnavailable,
            Self::NameConflict(_) => ErrorKind::NameConflict,
            Self::ScannerProcess(_) => ErrorKind::ScannerProcessFailure,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Workspace(_) => ErrorKind::Workspace,
        }
    }
}

/// 실패 분류
///
/// 작업 단위 결과([`UnitOutcome`](crate::types::UnitOutcome))에 기록되어
/// 로그 없이도 어떤 종류의 실패였는지 확인할 수 있습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 백엔드 연결 불가 (실행 전체 중단 대상)
    BackendUnavailable,
    /// 백엔드 인증 실패 (실행 전체 중단 대상)
    AuthenticationError,
    /// 리소스 없음 (빈 결과로 취급)
    NotFound,
    /// rate limit 재시도 후에도 거부됨
    RateLimited,
    /// 레지스트리 사용 불가
    RegistryUnavailable,
    /// 프로젝트 이름 충돌
    NameConflict,
    /// 스캐너 프로세스 실패
    ScannerProcessFailure,
    /// 작업 제한 시간 초과
    Timeout,
    /// 임시 디렉토리 I/O 실패
    Workspace,
    /// 설정 오류
    Config,
}

impl ErrorKind {
    /// 메트릭 레이블/출력용 고정 문자열을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BackendUnavailable => "backend_unavailable",
            Self::AuthenticationError => "authentication_error",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::RegistryUnavailable => "registry_unavailable",
            Self::NameConflict => "name_conflict",
            Self::ScannerProcessFailure => "scanner_process_failure",
            Self::Timeout => "timeout",
            Self::Workspace => "workspace",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
