//! 레지스트리 프로젝트 정규 이름 생성

/// 모든 Syringe 프로젝트 이름의 접두어
pub const NAME_PREFIX: &str = "SYR-";

/// 이름 구성 요소 구분자
pub const NAME_SEPARATOR: &str = "__";

/// lockfile 하나에 대응하는 레지스트리 프로젝트 이름을 생성합니다.
///
/// 형식: `SYR-{repo_name}__{repo_id}__{lockfile_path}`
///
/// 저장소 ID가 이름에 포함되므로, 이름이 같은 저장소라도 서로 다른 프로젝트에 대응합니다.
pub fn generate_name(repo_name: &str, repo_id: u64, lockfile_path: &str) -> String {
    format!("{NAME_PREFIX}{repo_name}{NAME_SEPARATOR}{repo_id}{NAME_SEPARATOR}{lockfile_path}")
}

/// Syringe가 만든 이름인지 확인합니다.
pub fn is_managed_name(name: &str) -> bool {
    name.starts_with(NAME_PREFIX)
}
