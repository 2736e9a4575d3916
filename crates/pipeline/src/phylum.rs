//! 외부 레지스트리/스캐너 클라이언트
//!
//! 파이프라인은 [`ProjectRegistry`]와 [`Analyzer`] trait만 사용합니다.
//! 운영 구현인 [`PhylumCli`]는 `phylum` CLI를 하위 프로세스로 실행합니다.
//!
//! | 동작 | 명령 |
//! |------|------|
//! | 목록 조회 | `phylum project list --json [-g GROUP]` |
//! | 생성 | `phylum project create NAME [-g GROUP]` (임시 디렉토리에서 실행) |
//! | 분석 | `phylum analyze LOCKFILE [-g GROUP --project NAME]` |
//!
//! 모든 하위 프로세스는 `kill_on_drop(true)`로 실행되어, 호출 측 타임아웃으로
//! future가 drop되면 프로세스도 종료됩니다.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

use syringe_core::config::SyringeConfig;
use syringe_core::types::RegistryProject;

use crate::error::PhylumError;
use crate::workspace::{CREATE_PREFIX, PROJECT_FILE, ProjectDescriptor, scratch_dir};

/// 이름 충돌을 나타내는 CLI 메시지 조각
const CONFLICT_MARKER: &str = "already exists";

/// stderr 로그/에러 메시지 최대 길이
const MAX_STDERR_LEN: usize = 2000;

/// 레지스트리 프로젝트 목록 조회 및 생성
pub trait ProjectRegistry: Send + Sync + 'static {
    /// 레지스트리의 모든 프로젝트를 조회합니다.
    fn list_projects(&self) -> impl Future<Output = Result<Vec<RegistryProject>, PhylumError>> + Send;

    /// 프로젝트를 생성하고 레지스트리가 보고한 항목을 반환합니다.
    ///
    /// 같은 이름이 이미 있으면 기존 항목을 반환합니다.
    fn create_project(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<RegistryProject, PhylumError>> + Send;
}

/// 준비된 작업 디렉토리에서 lockfile 하나를 분석
pub trait Analyzer: Send + Sync + 'static {
    /// `dir` 안의 `lockfile_name`을 `project`로 분석합니다.
    ///
    /// `dir`에는 lockfile과 `.phylum_project` 기술자가 이미 있어야 합니다.
    fn analyze(
        &self,
        dir: &Path,
        lockfile_name: &str,
        project: &RegistryProject,
    ) -> impl Future<Output = Result<(), PhylumError>> + Send;
}

/// 종료된 하위 프로세스의 결과
#[derive(Debug)]
struct CommandOutput {
    success: bool,
    code: String,
    stdout: Vec<u8>,
    stderr: String,
}

/// `phylum` CLI 클라이언트
#[derive(Debug, Clone)]
pub struct PhylumCli {
    program: PathBuf,
    group: Option<String>,
    work_dir: Option<PathBuf>,
}

impl PhylumCli {
    /// 실행 파일 경로로 클라이언트를 생성합니다.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            group: None,
            work_dir: None,
        }
    }

    /// `[registry]`/`[general]` 설정으로 클라이언트를 생성합니다.
    pub fn from_config(config: &SyringeConfig) -> Self {
        let work_dir = config.general.work_dir.trim();
        Self {
            program: PathBuf::from(&config.registry.cli_path),
            group: config.registry.group().map(str::to_owned),
            work_dir: (!work_dir.is_empty()).then(|| PathBuf::from(work_dir)),
        }
    }

    /// 모든 명령에 `-g GROUP`을 붙입니다.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// 임시 디렉토리를 만들 상위 디렉토리를 지정합니다.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// 설정된 그룹
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.program.display(), args.join(" "))
    }

    async fn run(&self, args: &[&str], dir: Option<&Path>) -> Result<CommandOutput, PhylumError> {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = dir {
            command.current_dir(dir);
        }
        debug!(command = %self.describe(args), "running registry cli");

        let output = command.output().await.map_err(|e| PhylumError::Spawn {
            program: self.program.display().to_string(),
            reason: e.to_string(),
        })?;
        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_owned(), |c| c.to_string());
        Ok(CommandOutput {
            success: output.status.success(),
            code,
            stdout: output.stdout,
            stderr: truncate(String::from_utf8_lossy(&output.stderr).trim()),
        })
    }

    fn with_group_args<'a>(&'a self, args: &mut Vec<&'a str>) {
        if let Some(group) = &self.group {
            args.extend(["-g", group.as_str()]);
        }
    }

    async fn find_existing(&self, name: &str) -> Result<RegistryProject, PhylumError> {
        self.list_projects()
            .await?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| PhylumError::NameConflict(name.to_owned()))
    }
}

impl ProjectRegistry for PhylumCli {
    async fn list_projects(&self) -> Result<Vec<RegistryProject>, PhylumError> {
        let mut args = vec!["project", "list", "--json"];
        self.with_group_args(&mut args);
        let command = self.describe(&args);

        let output = self.run(&args, None).await?;
        if !output.success {
            return Err(PhylumError::Registry {
                command,
                reason: format!("exit {}: {}", output.code, output.stderr),
            });
        }
        let projects: Vec<RegistryProject> =
            serde_json::from_slice(&output.stdout).map_err(|e| PhylumError::Output {
                command,
                reason: e.to_string(),
            })?;
        debug!(count = projects.len(), "listed registry projects");
        Ok(projects)
    }

    async fn create_project(&self, name: &str) -> Result<RegistryProject, PhylumError> {
        let dir = scratch_dir(self.work_dir.as_deref(), CREATE_PREFIX)?;
        let mut args = vec!["project", "create", name];
        self.with_group_args(&mut args);
        let command = self.describe(&args);

        let output = self.run(&args, Some(dir.path())).await?;
        if !output.success {
            if output.stderr.contains(CONFLICT_MARKER) {
                info!(name, "project already exists, resolving from listing");
                return self.find_existing(name).await;
            }
            return Err(PhylumError::Registry {
                command,
                reason: format!("exit {}: {}", output.code, output.stderr),
            });
        }

        let descriptor_path = dir.path().join(PROJECT_FILE);
        let yaml = tokio::fs::read_to_string(&descriptor_path)
            .await
            .map_err(|e| PhylumError::workspace(&descriptor_path, e))?;
        let descriptor = ProjectDescriptor::parse(&yaml).map_err(|e| PhylumError::Output {
            command,
            reason: format!("{PROJECT_FILE}: {e}"),
        })?;
        if descriptor.name != name {
            warn!(
                requested = name,
                reported = descriptor.name.as_str(),
                "registry reported a different project name"
            );
        }
        debug!(name, id = descriptor.id.as_str(), "created registry project");
        Ok(descriptor.into())
    }
}

impl Analyzer for PhylumCli {
    async fn analyze(
        &self,
        dir: &Path,
        lockfile_name: &str,
        project: &RegistryProject,
    ) -> Result<(), PhylumError> {
        let mut args = vec!["analyze", lockfile_name];
        if let Some(group) = &self.group {
            args.extend(["-g", group.as_str(), "--project", project.name.as_str()]);
        }

        let output = self.run(&args, Some(dir)).await?;
        if output.success {
            debug!(project = project.name.as_str(), "analysis submitted");
            Ok(())
        } else {
            Err(PhylumError::Scanner {
                code: output.code,
                stderr: output.stderr,
            })
        }
    }
}

fn truncate(s: &str) -> String {
    match s.char_indices().nth(MAX_STDERR_LEN) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_owned(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// 인자를 기록하고 정해진 동작을 하는 가짜 `phylum` 스크립트를 만듭니다.
    fn fake_cli(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("phylum");
        let script = format!("#!/bin/sh\necho \"$@\" >> \"{}/args.log\"\n{body}\n", dir.display());
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn logged_args(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("args.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn list_projects_parses_json_with_group() {
        let bin = tempfile::tempdir().unwrap();
        let program = fake_cli(
            bin.path(),
            r#"echo '[{"name":"SYR-a__1__pom.xml","id":"p1","updated_at":"t","ecosystem":"maven"}]'"#,
        );
        let cli = PhylumCli::new(program).with_group("sec");

        let projects = cli.list_projects().await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id, "p1");
        assert_eq!(logged_args(bin.path()), vec!["project list --json -g sec"]);
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn list_projects_failure_is_registry_unavailable() {
        let bin = tempfile::tempdir().unwrap();
        let program = fake_cli(bin.path(), "echo 'not authenticated' >&2\nexit 1");
        let err = PhylumCli::new(program).list_projects().await.unwrap_err();
        assert!(matches!(err, PhylumError::Registry { .. }));
        assert!(err.to_string().contains("not authenticated"));
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn create_project_reads_descriptor() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let program = fake_cli(
            bin.path(),
            "printf 'id: new-id\\nname: %s\\ncreated_at: 2024-01-01\\n' \"$3\" > .phylum_project",
        );
        let cli = PhylumCli::new(program).with_work_dir(work.path());

        let project = cli.create_project("SYR-x__1__pom.xml").await.unwrap();
        assert_eq!(project.name, "SYR-x__1__pom.xml");
        assert_eq!(project.id, "new-id");
        assert_eq!(project.updated_at, "2024-01-01");
        assert_eq!(
            std::fs::read_dir(work.path()).unwrap().count(),
            0,
            "scratch directory is removed"
        );
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn create_conflict_resolves_from_listing() {
        let bin = tempfile::tempdir().unwrap();
        let program = fake_cli(
            bin.path(),
            r#"case "$2" in
  create) echo 'project already exists' >&2; exit 1 ;;
  list) echo '[{"name":"SYR-x__1__pom.xml","id":"old-id"}]' ;;
esac"#,
        );
        let cli = PhylumCli::new(program);

        let project = cli.create_project("SYR-x__1__pom.xml").await.unwrap();
        assert_eq!(project.id, "old-id");

        let err = cli.create_project("SYR-gone__2__pom.xml").await.unwrap_err();
        assert!(matches!(err, PhylumError::NameConflict(_)));
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn analyze_nonzero_exit_is_scanner_failure() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let program = fake_cli(bin.path(), "echo 'policy violation' >&2\nexit 2");
        let project = RegistryProject {
            name: "SYR-x__1__pom.xml".to_owned(),
            id: "p".to_owned(),
            updated_at: String::new(),
            ecosystem: None,
        };

        let err = PhylumCli::new(program)
            .with_group("sec")
            .analyze(work.path(), "pom.xml", &project)
            .await
            .unwrap_err();
        match err {
            PhylumError::Scanner { code, stderr } => {
                assert_eq!(code, "2");
                assert_eq!(stderr, "policy violation");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            logged_args(bin.path()),
            vec!["analyze pom.xml -g sec --project SYR-x__1__pom.xml"]
        );
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn missing_binary_is_spawn_error() {
        let err = PhylumCli::new("/nonexistent/phylum")
            .list_projects()
            .await
            .unwrap_err();
        assert!(matches!(err, PhylumError::Spawn { .. }));
    }

    #[test]
    fn from_config_reads_group_and_work_dir() {
        let mut config = SyringeConfig::default();
        config.registry.group = "  sec ".to_owned();
        config.general.work_dir = "/var/tmp/syringe".to_owned();
        let cli = PhylumCli::from_config(&config);
        assert_eq!(cli.group(), Some("sec"));
        assert_eq!(cli.work_dir.as_deref(), Some(Path::new("/var/tmp/syringe")));
    }

    #[test]
    fn truncate_limits_length() {
        let long = "e".repeat(MAX_STDERR_LEN + 10);
        assert!(truncate(&long).ends_with("..."));
        assert_eq!(truncate("short"), "short");
    }
}
