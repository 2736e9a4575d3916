//! 설정 관리: syringe.toml 파싱 및 런타임 설정
//!
//! [`SyringeConfig`]는 모든 크레이트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`SYRINGE_VCS_TOKEN=...` 형식)
//! 3. 설정 파일 (`syringe.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), syringe_core::error::SyringeError> {
//! use syringe_core::config::SyringeConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = SyringeConfig::load("syringe.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = SyringeConfig::parse("[vcs]\nkind = \"github\"")?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, SyringeError};

/// Syringe 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyringeConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// VCS 백엔드 설정
    #[serde(default)]
    pub vcs: VcsConfig,
    /// 외부 레지스트리(Phylum CLI) 설정
    #[serde(default)]
    pub registry: RegistryConfig,
    /// 파이프라인 동시성/제한 시간 설정
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl SyringeConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SyringeError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드, 검증 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, SyringeError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SyringeError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                SyringeError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, SyringeError> {
        toml::from_str(toml_str).map_err(|e| {
            SyringeError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `SYRINGE_{SECTION}_{FIELD}`
    /// 예: `SYRINGE_VCS_TOKEN=glpat-...`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "SYRINGE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "SYRINGE_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.work_dir, "SYRINGE_GENERAL_WORK_DIR");

        // VCS
        if let Ok(val) = std::env::var("SYRINGE_VCS_KIND") {
            match VcsKind::from_str_loose(&val) {
                Some(kind) => self.vcs.kind = kind,
                None => warn!(
                    env_key = "SYRINGE_VCS_KIND",
                    value = val.as_str(),
                    "unknown vcs kind in env var, ignoring"
                ),
            }
        }
        override_string(&mut self.vcs.token, "SYRINGE_VCS_TOKEN");
        override_string(&mut self.vcs.base_url, "SYRINGE_VCS_BASE_URL");
        override_string(&mut self.vcs.org, "SYRINGE_VCS_ORG");
        override_string(&mut self.vcs.owner, "SYRINGE_VCS_OWNER");
        override_string(&mut self.vcs.client_id, "SYRINGE_VCS_CLIENT_ID");
        override_string(&mut self.vcs.client_secret, "SYRINGE_VCS_CLIENT_SECRET");
        override_bool(&mut self.vcs.mine_only, "SYRINGE_VCS_MINE_ONLY");
        override_u32(&mut self.vcs.rate_limit, "SYRINGE_VCS_RATE_LIMIT");
        override_string(&mut self.vcs.proxy_url, "SYRINGE_VCS_PROXY_URL");

        // Registry
        override_string(&mut self.registry.cli_path, "SYRINGE_REGISTRY_CLI_PATH");
        override_string(&mut self.registry.group, "SYRINGE_REGISTRY_GROUP");

        // Pipeline
        override_usize(
            &mut self.pipeline.discovery_concurrency,
            "SYRINGE_PIPELINE_DISCOVERY_CONCURRENCY",
        );
        override_usize(
            &mut self.pipeline.creation_concurrency,
            "SYRINGE_PIPELINE_CREATION_CONCURRENCY",
        );
        override_usize(
            &mut self.pipeline.analysis_concurrency,
            "SYRINGE_PIPELINE_ANALYSIS_CONCURRENCY",
        );
        override_u64(
            &mut self.pipeline.task_timeout_secs,
            "SYRINGE_PIPELINE_TASK_TIMEOUT_SECS",
        );
        override_bool(&mut self.pipeline.jit_create, "SYRINGE_PIPELINE_JIT_CREATE");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), SyringeError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        match self.vcs.kind {
            VcsKind::Azure if self.vcs.org.is_empty() => {
                return Err(ConfigError::InvalidValue {
                    field: "vcs.org".to_owned(),
                    reason: "azure requires an organization".to_owned(),
                }
                .into());
            }
            VcsKind::BitbucketCloud if self.vcs.owner.is_empty() => {
                return Err(ConfigError::InvalidValue {
                    field: "vcs.owner".to_owned(),
                    reason: "bitbucket_cloud requires a workspace owner".to_owned(),
                }
                .into());
            }
            _ => {}
        }

        if !self.vcs.base_url.is_empty()
            && !(self.vcs.base_url.starts_with("http://")
                || self.vcs.base_url.starts_with("https://"))
        {
            return Err(ConfigError::InvalidValue {
                field: "vcs.base_url".to_owned(),
                reason: "must start with http:// or https://".to_owned(),
            }
            .into());
        }

        if self.vcs.rate_limit > MAX_RATE_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "vcs.rate_limit".to_owned(),
                reason: format!("must be 0 (unlimited) or 1-{MAX_RATE_LIMIT}"),
            }
            .into());
        }

        if self.registry.cli_path.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "registry.cli_path".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        for (field, value) in [
            (
                "pipeline.discovery_concurrency",
                self.pipeline.discovery_concurrency,
            ),
            (
                "pipeline.creation_concurrency",
                self.pipeline.creation_concurrency,
            ),
            (
                "pipeline.analysis_concurrency",
                self.pipeline.analysis_concurrency,
            ),
        ] {
            if value == 0 || value > MAX_CONCURRENCY {
                return Err(ConfigError::InvalidValue {
                    field: field.to_owned(),
                    reason: format!("must be 1-{MAX_CONCURRENCY}"),
                }
                .into());
            }
        }

        if self.pipeline.task_timeout_secs == 0
            || self.pipeline.task_timeout_secs > MAX_TASK_TIMEOUT_SECS
        {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.task_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_TASK_TIMEOUT_SECS}"),
            }
            .into());
        }

        Ok(())
    }

    /// 비밀 값을 가린 사본을 반환합니다 (`config show` 출력용).
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        redact(&mut copy.vcs.token);
        redact(&mut copy.vcs.client_secret);
        copy
    }
}

/// 설정 상한값 상수
const MAX_CONCURRENCY: usize = 1024;
const MAX_TASK_TIMEOUT_SECS: u64 = 86_400; // 24 hours
const MAX_RATE_LIMIT: u32 = 10_000;

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 임시 작업 디렉토리 상위 경로 (비어 있으면 시스템 임시 디렉토리)
    pub work_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
            work_dir: String::new(),
        }
    }
}

/// 지원하는 VCS 백엔드 종류
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VcsKind {
    /// GitLab (gitlab.com 또는 self-hosted)
    #[default]
    Gitlab,
    /// GitHub (github.com 또는 Enterprise)
    Github,
    /// Azure Repos
    Azure,
    /// Bitbucket Cloud
    BitbucketCloud,
}

impl VcsKind {
    /// 대소문자 구분 없이 백엔드 종류를 파싱합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "gitlab" => Some(Self::Gitlab),
            "github" => Some(Self::Github),
            "azure" | "azure_repos" => Some(Self::Azure),
            "bitbucket" | "bitbucket_cloud" => Some(Self::BitbucketCloud),
            _ => None,
        }
    }

    /// 고정 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gitlab => "gitlab",
            Self::Github => "github",
            Self::Azure => "azure",
            Self::BitbucketCloud => "bitbucket_cloud",
        }
    }
}

impl fmt::Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// VCS 백엔드 설정
///
/// 인증 정보는 해석하지 않고 어댑터에 그대로 전달합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VcsConfig {
    /// 백엔드 종류
    pub kind: VcsKind,
    /// 액세스 토큰 (GitLab PAT, GitHub token, Azure PAT, Bitbucket access token)
    pub token: String,
    /// API 기본 URL (비어 있으면 백엔드 기본값)
    pub base_url: String,
    /// 조직 (GitHub org, Azure organization)
    pub org: String,
    /// 소유자 (Bitbucket workspace)
    pub owner: String,
    /// OAuth client id (Bitbucket client credentials)
    pub client_id: String,
    /// OAuth client secret (Bitbucket client credentials)
    pub client_secret: String,
    /// 본인 소유 저장소만 조회
    pub mine_only: bool,
    /// 초당 최대 요청 수 (0이면 제한 없음)
    pub rate_limit: u32,
    /// HTTPS 프록시 URL
    pub proxy_url: String,
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            kind: VcsKind::Gitlab,
            token: String::new(),
            base_url: String::new(),
            org: String::new(),
            owner: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            mine_only: false,
            rate_limit: 0,
            proxy_url: String::new(),
        }
    }
}

/// 외부 레지스트리(Phylum CLI) 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// phylum 실행 파일 경로
    pub cli_path: String,
    /// 프로젝트 그룹 (비어 있으면 그룹 미사용)
    pub group: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cli_path: "phylum".to_owned(),
            group: String::new(),
        }
    }
}

impl RegistryConfig {
    /// 그룹이 설정되어 있으면 반환합니다.
    pub fn group(&self) -> Option<&str> {
        let group = self.group.trim();
        (!group.is_empty()).then_some(group)
    }
}

/// 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// lockfile 탐색 동시 실행 수
    pub discovery_concurrency: usize,
    /// 프로젝트 생성 동시 실행 수
    pub creation_concurrency: usize,
    /// 분석 동시 실행 수
    pub analysis_concurrency: usize,
    /// 작업 하나의 제한 시간 (초)
    pub task_timeout_secs: u64,
    /// 분석 직전 누락된 프로젝트를 한 번 더 생성 시도
    pub jit_create: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            discovery_concurrency: 50,
            creation_concurrency: 50,
            analysis_concurrency: 50,
            task_timeout_secs: 600,
            jit_create: true,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn redact(value: &mut String) {
    if !value.is_empty() {
        *value = "********".to_owned();
    }
}
