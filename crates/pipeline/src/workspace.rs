//! 임시 작업 디렉토리
//!
//! 분석 하나마다 전용 디렉토리를 만들어 lockfile과 `.phylum_project` 기술자를 씁니다.
//! 디렉토리는 [`tempfile::TempDir`]이 소유하므로 성공/실패/타임아웃 어느 경로에서든
//! drop 시점에 삭제됩니다.
//!
//! ```text
//! {work_dir}/syringe-analyze-XXXXXX/
//!   ├── {lockfile name}
//!   └── .phylum_project
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use syringe_core::types::{LockfileReference, RegistryProject};

use crate::error::PhylumError;

/// 분석 디렉토리 접두어
pub const ANALYZE_PREFIX: &str = "syringe-analyze-";

/// 프로젝트 생성 디렉토리 접두어
pub const CREATE_PREFIX: &str = "syringe-create-";

/// 프로젝트 기술자 파일 이름
pub const PROJECT_FILE: &str = ".phylum_project";

/// `.phylum_project` YAML 기술자
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDescriptor {
    /// 레지스트리 식별자
    pub id: String,
    /// 프로젝트 이름
    pub name: String,
    /// 생성 시각
    #[serde(default)]
    pub created_at: String,
    /// 소속 그룹
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
}

impl ProjectDescriptor {
    /// 레지스트리 프로젝트로부터 기술자를 만듭니다.
    pub fn for_project(project: &RegistryProject, group: Option<&str>) -> Self {
        Self {
            id: project.id.clone(),
            name: project.name.clone(),
            created_at: project.updated_at.clone(),
            group_name: group.map(str::to_owned),
        }
    }

    /// YAML 문서를 파싱합니다.
    pub fn parse(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// YAML 문서로 직렬화합니다.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

impl From<ProjectDescriptor> for RegistryProject {
    fn from(d: ProjectDescriptor) -> Self {
        Self {
            name: d.name,
            id: d.id,
            updated_at: d.created_at,
            ecosystem: None,
        }
    }
}

/// `root` 아래(없으면 시스템 임시 디렉토리)에 접두어가 붙은 임시 디렉토리를 만듭니다.
pub fn scratch_dir(root: Option<&Path>, prefix: &str) -> Result<TempDir, PhylumError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix);
    match root {
        Some(root) => builder
            .tempdir_in(root)
            .map_err(|e| PhylumError::workspace(root, e)),
        None => builder
            .tempdir()
            .map_err(|e| PhylumError::workspace(&std::env::temp_dir(), e)),
    }
}

/// 분석 하나를 위한 준비된 디렉토리
#[derive(Debug)]
pub struct AnalysisWorkspace {
    dir: TempDir,
    lockfile_name: String,
}

impl AnalysisWorkspace {
    /// 디렉토리를 만들고 lockfile 내용과 프로젝트 기술자를 씁니다.
    ///
    /// # Errors
    ///
    /// 디렉토리 생성 또는 파일 쓰기에 실패하면 `PhylumError::Workspace`를 반환합니다.
    /// 이 경우에도 이미 만들어진 디렉토리는 삭제됩니다.
    pub async fn prepare(
        root: Option<&Path>,
        lockfile: &LockfileReference,
        project: &RegistryProject,
        group: Option<&str>,
    ) -> Result<Self, PhylumError> {
        let dir = scratch_dir(root, ANALYZE_PREFIX)?;
        let lockfile_name = safe_file_name(&lockfile.name);

        let lockfile_path = dir.path().join(&lockfile_name);
        tokio::fs::write(&lockfile_path, &lockfile.content)
            .await
            .map_err(|e| PhylumError::workspace(&lockfile_path, e))?;

        let descriptor_path = dir.path().join(PROJECT_FILE);
        let yaml = ProjectDescriptor::for_project(project, group)
            .to_yaml()
            .map_err(|e| PhylumError::workspace(&descriptor_path, std::io::Error::other(e)))?;
        tokio::fs::write(&descriptor_path, yaml)
            .await
            .map_err(|e| PhylumError::workspace(&descriptor_path, e))?;

        Ok(Self { dir, lockfile_name })
    }

    /// 디렉토리 경로
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// 디렉토리 안의 lockfile 이름
    pub fn lockfile_name(&self) -> &str {
        &self.lockfile_name
    }

    /// 디렉토리 안의 lockfile 경로
    pub fn lockfile_path(&self) -> PathBuf {
        self.dir.path().join(&self.lockfile_name)
    }
}

/// 경로 구분자를 포함한 이름에서 마지막 구성 요소만 남깁니다.
fn safe_file_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    if last.is_empty() || last == "." || last == ".." {
        "lockfile".to_owned()
    } else {
        last.to_owned()
    }
}
