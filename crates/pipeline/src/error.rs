//! 파이프라인 에러 타입
//!
//! [`PhylumError`]는 레지스트리 CLI 호출, 스캐너 실행, 임시 작업 디렉토리 처리 중
//! 발생하는 에러를 나타냅니다. `From<PhylumError> for SyringeError` 구현으로
//! 상위 에러 타입으로 전파됩니다.
//!
//! # 에러 카테고리
//!
//! - **프로세스 실행**: `Spawn`, `Registry`, `Scanner`
//! - **응답 해석**: `Output`
//! - **이름 충돌**: `NameConflict`, `NameMismatch`
//! - **제한 시간**: `Timeout`
//! - **파일 I/O**: `Workspace`

use syringe_core::error::{ErrorKind, RegistryError, SyringeError};

/// 레지스트리/스캐너 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum PhylumError {
    /// CLI 바이너리를 실행할 수 없음
    #[error("failed to spawn '{program}': {reason}")]
    Spawn {
        /// 실행 파일 경로
        program: String,
        /// 실패 사유
        reason: String,
    },

    /// 레지스트리 명령(`project list`, `project create`)이 실패함
    #[error("'{command}' failed: {reason}")]
    Registry {
        /// 실행한 명령
        command: String,
        /// 실패 사유 (stderr)
        reason: String,
    },

    /// 분석 프로세스가 0이 아닌 코드로 종료
    #[error("scanner exited with {code}: {stderr}")]
    Scanner {
        /// 종료 코드 (시그널 종료 시 "signal")
        code: String,
        /// 캡처된 stderr
        stderr: String,
    },

    /// CLI 출력 해석 실패
    #[error("unexpected output from '{command}': {reason}")]
    Output {
        /// 실행한 명령
        command: String,
        /// 실패 사유
        reason: String,
    },

    /// 같은 이름의 프로젝트가 이미 존재하지만 목록에서 찾을 수 없음
    #[error("project '{0}' already exists")]
    NameConflict(String),

    /// 레지스트리가 요청과 다른 이름으로 프로젝트를 보고함
    #[error("registry reported project '{reported}' for requested name '{requested}'")]
    NameMismatch {
        /// 요청한 정규 이름
        requested: String,
        /// 레지스트리가 보고한 이름
        reported: String,
    },

    /// 작업 제한 시간 초과
    #[error("'{what}' timed out after {secs}s")]
    Timeout {
        /// 작업 설명
        what: String,
        /// 제한 시간 (초)
        secs: u64,
    },

    /// 임시 작업 디렉토리 I/O 실패
    #[error("workspace error: {path}: {source}")]
    Workspace {
        /// 관련 경로
        path: String,
        /// 원인 I/O 에러
        source: std::io::Error,
    },
}

impl PhylumError {
    /// 에러 분류를 반환합니다.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Spawn { .. } | Self::Registry { .. } | Self::Output { .. } => {
                ErrorKind::RegistryUnavailable
            }
            Self::Scanner { .. } => ErrorKind::ScannerProcessFailure,
            Self::NameConflict(_) | Self::NameMismatch { .. } => ErrorKind::NameConflict,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Workspace { .. } => ErrorKind::Workspace,
        }
    }

    pub(crate) fn workspace(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Workspace {
            path: path.display().to_string(),
            source,
        }
    }
}

impl From<PhylumError> for SyringeError {
    fn from(err: PhylumError) -> Self {
        let message = err.to_string();
        let inner = match err {
            PhylumError::Spawn { .. } | PhylumError::Registry { .. } | PhylumError::Output { .. } => {
                RegistryError::Unavailable(message)
            }
            PhylumError::Scanner { .. } => RegistryError::ScannerProcess(message),
            PhylumError::NameConflict(_) | PhylumError::NameMismatch { .. } => {
                RegistryError::NameConflict(message)
            }
            PhylumError::Timeout { .. } => RegistryError::Timeout(message),
            PhylumError::Workspace { .. } => RegistryError::Workspace(message),
        };
        SyringeError::Registry(inner)
    }
}
