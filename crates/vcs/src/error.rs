//! VCS 어댑터 에러 타입
//!
//! [`VcsError`]는 백엔드 어댑터와 전송 계층에서 발생하는 모든 에러를 표현합니다.
//! `From<VcsError> for SyringeError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use syringe_core::error::{BackendError, ConfigError, ErrorKind, SyringeError};

/// VCS 백엔드 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// 연결 실패, 5xx 응답, 예상하지 못한 상태 코드
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// 인증 실패 (401/403)
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// 대상 리소스 없음 (빈 저장소, 없는 브랜치)
    #[error("not found: {0}")]
    NotFound(String),

    /// 한 번 재시도한 후에도 rate limit 거부
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// 응답 본문 해석 실패
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// 어댑터 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl VcsError {
    /// 에러 분류를 반환합니다.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) | Self::Decode(_) => ErrorKind::BackendUnavailable,
            Self::Authentication(_) => ErrorKind::AuthenticationError,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::Config { .. } => ErrorKind::Config,
        }
    }

    /// 실행 전체를 중단해야 하는 에러인지 여부
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Authentication(_) | Self::Config { .. }
        )
    }
}

impl From<reqwest::Error> for VcsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for VcsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<VcsError> for SyringeError {
    fn from(err: VcsError) -> Self {
        match err {
            VcsError::Unavailable(msg) => SyringeError::Backend(BackendError::Unavailable(msg)),
            VcsError::Decode(msg) => {
                SyringeError::Backend(BackendError::Unavailable(format!("decode: {msg}")))
            }
            VcsError::Authentication(msg) => {
                SyringeError::Backend(BackendError::Authentication(msg))
            }
            VcsError::NotFound(msg) => SyringeError::Backend(BackendError::NotFound(msg)),
            VcsError::RateLimited(msg) => SyringeError::Backend(BackendError::RateLimited(msg)),
            VcsError::Config { field, reason } => {
                SyringeError::Config(ConfigError::InvalidValue { field, reason })
            }
        }
    }
}
