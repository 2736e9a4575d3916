//! `syringe run` command handler

use std::io::Write;
use std::path::Path;

use tracing::info;

use syringe_core::types::{Outcome, RunSummary, UnitOutcome};
use syringe_pipeline::PhylumSyringe;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `run` command.
///
/// Partial failures (individual repositories, creations, or analyses) are reported
/// in the summary and do not change the exit code. Only failures that abort the run
/// (configuration, repository listing, project listing) return an error.
pub async fn execute(
    args: RunArgs,
    config_path: &Path,
    log_level: Option<&str>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let mut config = super::load_config(config_path, log_level).await?;
    if args.no_jit_create {
        config.pipeline.jit_create = false;
    }

    info!(
        vcs = config.vcs.kind.as_str(),
        jit_create = config.pipeline.jit_create,
        "starting syringe run"
    );

    let syringe = PhylumSyringe::from_config(config)?;
    let summary = syringe.run().await?;

    writer.render(&summary)?;

    Ok(())
}

impl Render for RunSummary {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "{}", "Syringe Run Summary".bold())?;
        writeln!(w, "  Repositories:      {}", self.repositories)?;
        writeln!(w, "  Hydrated:          {}", self.hydrated)?;
        writeln!(w, "  Lockfiles:         {}", self.lockfiles)?;
        writeln!(w, "  Existing projects: {}", self.existing_projects)?;
        writeln!(
            w,
            "  Projects created:  {} ({} failed)",
            self.projects_created(),
            self.creations_failed()
        )?;

        let analyses_failed = self.analyses_failed();
        let failed_label = if analyses_failed > 0 {
            analyses_failed.to_string().red().bold()
        } else {
            analyses_failed.to_string().normal()
        };
        writeln!(
            w,
            "  Analyses:          {} succeeded, {} failed, {} total",
            self.analyses_succeeded().to_string().green(),
            failed_label,
            self.analyses.len()
        )?;

        let failures: Vec<(&str, &UnitOutcome)> = [
            ("discovery", &self.discovery),
            ("create", &self.creations),
            ("analyze", &self.analyses),
        ]
        .into_iter()
        .flat_map(|(stage, outcomes)| {
            outcomes
                .iter()
                .filter(|o| o.is_failure())
                .map(move |o| (stage, o))
        })
        .collect();

        if !failures.is_empty() {
            writeln!(w)?;
            writeln!(w, "{}", "Failures:".red().bold())?;
            for (stage, outcome) in failures {
                if let Outcome::Failed { kind, message } = &outcome.outcome {
                    writeln!(w, "  [{stage}] {} ({kind}): {}", outcome.unit, message.red())?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syringe_core::error::ErrorKind;

    fn summary() -> RunSummary {
        RunSummary {
            repositories: 3,
            hydrated: 2,
            lockfiles: 4,
            existing_projects: 1,
            discovery: vec![
                UnitOutcome::succeeded("1"),
                UnitOutcome::failed("2", ErrorKind::Timeout, "timed out after 600s"),
                UnitOutcome::succeeded("3"),
            ],
            creations: vec![UnitOutcome::succeeded("SYR-svc-a__1__yarn.lock")],
            analyses: vec![
                UnitOutcome::succeeded("SYR-svc-a__1__yarn.lock"),
                UnitOutcome::failed(
                    "SYR-svc-c__3__package-lock.json",
                    ErrorKind::ScannerProcessFailure,
                    "exit status 2",
                ),
                UnitOutcome::skipped("SYR-svc-c__3__Gemfile.lock", "no registry project"),
            ],
        }
    }

    #[test]
    fn test_run_summary_render_text_counts() {
        let mut buffer = Vec::new();
        summary()
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("Repositories:      3"));
        assert!(output.contains("Lockfiles:         4"));
        assert!(output.contains("3 total"));
    }

    #[test]
    fn test_run_summary_render_text_lists_failures_by_stage() {
        let mut buffer = Vec::new();
        summary()
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("Failures:"));
        assert!(output.contains("[discovery] 2"));
        assert!(output.contains("[analyze] SYR-svc-c__3__package-lock.json"));
        assert!(output.contains("exit status 2"));
        assert!(
            !output.contains("Gemfile.lock"),
            "skipped units are not failures"
        );
    }

    #[test]
    fn test_run_summary_render_text_without_failures() {
        let mut buffer = Vec::new();
        RunSummary::default()
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(!output.contains("Failures:"));
    }

    #[test]
    fn test_run_summary_json_has_tagged_outcomes() {
        let json = serde_json::to_string(&summary()).expect("JSON serialization should succeed");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("should parse JSON");

        assert_eq!(parsed["repositories"].as_u64(), Some(3));
        assert_eq!(parsed["analyses"][1]["status"].as_str(), Some("failed"));
        assert_eq!(
            parsed["analyses"][1]["kind"].as_str(),
            Some("scanner_process_failure")
        );
    }
}
