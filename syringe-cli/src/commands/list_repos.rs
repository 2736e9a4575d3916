//! `syringe list-repos` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use syringe_core::types::{Repository, UnitOutcome};
use syringe_pipeline::PhylumSyringe;

use crate::cli::ListReposArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `list-repos` command.
pub async fn execute(
    args: ListReposArgs,
    config_path: &Path,
    log_level: Option<&str>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = super::load_config(config_path, log_level).await?;
    let vcs = config.vcs.kind.as_str();
    let syringe = PhylumSyringe::from_config(config)?;

    let report = if args.hydrate {
        let (repositories, discovery) = syringe.hydrate().await?;
        RepoListReport {
            vcs: vcs.to_owned(),
            hydrated: true,
            repositories,
            failures: discovery
                .outcomes
                .into_iter()
                .filter(UnitOutcome::is_failure)
                .collect(),
        }
    } else {
        RepoListReport {
            vcs: vcs.to_owned(),
            hydrated: false,
            repositories: syringe.list_repositories().await?,
            failures: Vec::new(),
        }
    };

    info!(count = report.repositories.len(), "listed repositories");
    writer.render(&report)?;

    Ok(())
}

/// Repository listing report.
#[derive(Debug, Serialize)]
pub struct RepoListReport {
    /// Backend kind the listing came from
    pub vcs: String,
    /// Whether lockfiles were fetched and matched against the registry
    pub hydrated: bool,
    /// Repositories sorted by id
    pub repositories: Vec<Repository>,
    /// Repositories whose lockfile discovery failed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<UnitOutcome>,
}

impl Render for RepoListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Repositories ({}): {}",
            self.vcs,
            self.repositories.len().to_string().bold()
        )?;
        writeln!(w, "{:<12} {:<40} {:<20}", "ID", "Name", "Branch")?;
        writeln!(w, "{}", "-".repeat(74))?;

        for repo in &self.repositories {
            let branch = if repo.branch.is_empty() {
                "(empty)".dimmed().to_string()
            } else {
                repo.branch.clone()
            };
            if self.hydrated {
                writeln!(
                    w,
                    "{:<12} {:<40} {:<20} {} lockfiles, {} enrolled",
                    repo.id,
                    repo.name,
                    branch,
                    repo.lockfiles.len(),
                    repo.associated_count()
                )?;
                for lockfile in &repo.lockfiles {
                    let status = match lockfile.registry_project {
                        Some(ref project) => format!("enrolled ({})", project.id).green(),
                        None => "not enrolled".yellow(),
                    };
                    writeln!(w, "  {} {} [{}]", "-".dimmed(), lockfile.path, status)?;
                }
            } else {
                writeln!(w, "{:<12} {:<40} {:<20}", repo.id, repo.name, branch)?;
            }
        }

        if self.hydrated {
            let lockfiles: usize = self.repositories.iter().map(|r| r.lockfiles.len()).sum();
            let enrolled: usize = self.repositories.iter().map(Repository::associated_count).sum();
            writeln!(w)?;
            writeln!(
                w,
                "Enrolled lockfiles: {}/{}",
                enrolled.to_string().bold(),
                lockfiles
            )?;
        }

        if !self.failures.is_empty() {
            writeln!(w)?;
            writeln!(
                w,
                "{} repositories could not be scanned:",
                self.failures.len().to_string().red().bold()
            )?;
            for failure in &self.failures {
                writeln!(w, "  {}", failure.unit.red())?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use syringe_core::error::ErrorKind;
    use syringe_core::types::{LockfileReference, RegistryProject};

    fn repo(id: u64, name: &str, lockfiles: &[&str]) -> Repository {
        let mut repo = Repository::new(id, name, "main");
        repo.hydrated = true;
        repo.lockfiles = lockfiles
            .iter()
            .map(|p| LockfileReference::new(*p, *p, "sha", "content"))
            .collect();
        repo
    }

    #[test]
    fn test_repo_list_render_text_plain() {
        let report = RepoListReport {
            vcs: "gitlab".to_owned(),
            hydrated: false,
            repositories: vec![repo(42, "svc-a", &["yarn.lock"])],
            failures: Vec::new(),
        };

        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("gitlab"));
        assert!(output.contains("svc-a"));
        assert!(!output.contains("yarn.lock"), "lockfiles only shown when hydrated");
    }

    #[test]
    fn test_repo_list_render_text_hydrated_with_failures() {
        let report = RepoListReport {
            vcs: "github".to_owned(),
            hydrated: true,
            repositories: vec![repo(1, "web", &["web/package-lock.json"])],
            failures: vec![UnitOutcome::failed(
                "7",
                ErrorKind::BackendUnavailable,
                "503",
            )],
        };

        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("1 lockfiles, 0 enrolled"));
        assert!(output.contains("web/package-lock.json"));
        assert!(output.contains("could not be scanned"));
    }

    #[test]
    fn test_repo_list_render_text_shows_enrollment() {
        let mut svc = repo(42, "svc-a", &["yarn.lock", "backend/requirements.txt"]);
        svc.lockfiles[0].registry_project = Some(Arc::new(RegistryProject {
            name: "SYR-svc-a__42__yarn.lock".to_owned(),
            id: "p-42".to_owned(),
            updated_at: String::new(),
            ecosystem: None,
        }));
        let report = RepoListReport {
            vcs: "gitlab".to_owned(),
            hydrated: true,
            repositories: vec![svc, repo(43, "svc-b", &["Gemfile.lock"])],
            failures: Vec::new(),
        };

        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("2 lockfiles, 1 enrolled"));
        assert!(output.contains("enrolled (p-42)"));
        assert!(output.contains("not enrolled"));
        assert!(output.contains("Enrolled lockfiles:"));
        assert!(output.contains("/3"));
    }

    #[test]
    fn test_repo_list_json_omits_content_and_empty_failures() {
        let report = RepoListReport {
            vcs: "azure".to_owned(),
            hydrated: true,
            repositories: vec![repo(5, "core", &["Cargo.lock"])],
            failures: Vec::new(),
        };

        let json = serde_json::to_string(&report).expect("JSON serialization should succeed");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("should parse JSON");

        assert_eq!(parsed["repositories"][0]["id"].as_u64(), Some(5));
        assert_eq!(
            parsed["repositories"][0]["lockfiles"][0]["path"].as_str(),
            Some("Cargo.lock")
        );
        assert!(parsed["repositories"][0]["lockfiles"][0].get("content").is_none());
        assert!(parsed.get("failures").is_none());
    }
}
