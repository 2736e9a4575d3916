//! `syringe list-projects` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use syringe_core::types::RegistryProject;
use syringe_pipeline::naming::is_managed_name;
use syringe_pipeline::{PhylumCli, ProjectRegistry};

use crate::cli::ListProjectsArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `list-projects` command.
///
/// Only the registry CLI is needed, so no VCS backend is constructed.
pub async fn execute(
    args: ListProjectsArgs,
    config_path: &Path,
    log_level: Option<&str>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = super::load_config(config_path, log_level).await?;
    let cli = PhylumCli::from_config(&config);

    let projects = cli.list_projects().await?;
    let report = build_report(projects, config.registry.group().map(str::to_owned), args.managed);

    writer.render(&report)?;

    Ok(())
}

fn build_report(
    mut projects: Vec<RegistryProject>,
    group: Option<String>,
    managed_only: bool,
) -> ProjectListReport {
    if managed_only {
        projects.retain(|p| is_managed_name(&p.name));
    }
    projects.sort_by(|a, b| a.name.cmp(&b.name));
    ProjectListReport { group, projects }
}

/// Registry project listing report.
#[derive(Debug, Serialize)]
pub struct ProjectListReport {
    /// Registry group the listing was scoped to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Projects sorted by name
    pub projects: Vec<RegistryProject>,
}

impl Render for ProjectListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        match self.group {
            Some(ref group) => writeln!(
                w,
                "Projects in group {}: {}",
                group.bold(),
                self.projects.len()
            )?,
            None => writeln!(w, "Projects: {}", self.projects.len().to_string().bold())?,
        }
        writeln!(w, "{:<38} {:<60}", "ID", "Name")?;
        writeln!(w, "{}", "-".repeat(98))?;
        for project in &self.projects {
            writeln!(w, "{:<38} {:<60}", project.id, project.name)?;
        }

        Ok(())
    }
}
