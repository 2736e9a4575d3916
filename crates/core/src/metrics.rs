//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::histogram!()`
//! 매크로를 호출합니다. 기본적으로 레코더는 설치되지 않으므로 호출 비용만 남습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `syringe_`
//! - 단계명: `transport_`, `discovery_`, `creation_`, `analysis_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//! use syringe_core::metrics;
//!
//! counter!(metrics::ANALYSIS_COMPLETED_TOTAL, metrics::LABEL_RESULT => "success").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (success, failure, skipped)
pub const LABEL_RESULT: &str = "result";

/// 에러 분류 레이블 키 (`ErrorKind::as_str()`)
pub const LABEL_KIND: &str = "kind";

/// 백엔드 레이블 키 (gitlab, github, azure, bitbucket_cloud)
pub const LABEL_BACKEND: &str = "backend";

// ─── Transport 메트릭 ───────────────────────────────────────────────

/// Transport: 전송된 HTTP 요청 수 (counter, label: backend)
pub const TRANSPORT_REQUESTS_TOTAL: &str = "syringe_transport_requests_total";

/// Transport: rate limit 거부 수 (counter, label: backend)
pub const TRANSPORT_RATE_LIMITED_TOTAL: &str = "syringe_transport_rate_limited_total";

// ─── Discovery 메트릭 ───────────────────────────────────────────────

/// Discovery: 처리된 저장소 수 (counter, label: result)
pub const DISCOVERY_REPOSITORIES_TOTAL: &str = "syringe_discovery_repositories_total";

/// Discovery: 발견된 lockfile 수 (counter)
pub const DISCOVERY_LOCKFILES_TOTAL: &str = "syringe_discovery_lockfiles_total";

// ─── Creation 메트릭 ────────────────────────────────────────────────

/// Creation: 프로젝트 생성 시도 수 (counter, label: result)
pub const CREATION_PROJECTS_TOTAL: &str = "syringe_creation_projects_total";

// ─── Analysis 메트릭 ────────────────────────────────────────────────

/// Analysis: 완료된 분석 수 (counter, label: result)
pub const ANALYSIS_COMPLETED_TOTAL: &str = "syringe_analysis_completed_total";

/// Analysis: 분석 하나의 소요 시간 (histogram, 초)
pub const ANALYSIS_DURATION_SECONDS: &str = "syringe_analysis_duration_seconds";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(
        TRANSPORT_REQUESTS_TOTAL,
        "Total number of HTTP requests sent to the hosting backend"
    );
    describe_counter!(
        TRANSPORT_RATE_LIMITED_TOTAL,
        "Total number of rate-limit rejections received from the hosting backend"
    );
    describe_counter!(
        DISCOVERY_REPOSITORIES_TOTAL,
        "Repositories processed by lockfile discovery, by result"
    );
    describe_counter!(
        DISCOVERY_LOCKFILES_TOTAL,
        "Total number of lockfiles discovered"
    );
    describe_counter!(
        CREATION_PROJECTS_TOTAL,
        "Registry project creation attempts, by result"
    );
    describe_counter!(
        ANALYSIS_COMPLETED_TOTAL,
        "Lockfile analyses completed, by result"
    );
    describe_histogram!(
        ANALYSIS_DURATION_SECONDS,
        "Time to analyze a single lockfile in seconds"
    );
}
