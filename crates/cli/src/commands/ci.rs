//! `ci` subcommands.

use std::collections::BTreeMap;

use serde::Serialize;

use tourgen_ci::client::ActionsClient;
use tourgen_ci::logs::{error_lines, search, tail, LogMatch};
use tourgen_ci::runs::{RunFilter, WorkflowJob, WorkflowRun};

use super::Context;
use crate::args::CiCommand;
use crate::commands::jobs::DownloadInfo;
use crate::exit::Exit;
use crate::output::format_bytes;

pub fn actions_client(ctx: &Context) -> anyhow::Result<ActionsClient> {
    let github = &ctx.config.github;
    Ok(ActionsClient::new(
        &github.api_base,
        ctx.config.require_repository()?,
        github.token.clone(),
        ctx.config.request_timeout,
    )?)
}

pub async fn run(ctx: &Context, command: CiCommand) -> anyhow::Result<Exit> {
    let client = actions_client(ctx)?;

    match command {
        CiCommand::Runs {
            branch,
            status,
            limit,
            job,
        } => {
            let filter = RunFilter {
                branch,
                status,
                per_page: limit,
            };
            let runs = match &job {
                Some(job) => client.find_runs_for_job(job, &filter).await?,
                None => client.list_runs(&filter).await?,
            };
            ctx.out.emit(&runs, || {
                let mut lines: Vec<String> = runs.iter().map(run_row).collect();
                lines.push(format!("{} run(s) in {}", runs.len(), client.repo()));
                lines
            })?;
        }
        CiCommand::Jobs { run } => {
            let jobs = client.list_jobs(run).await?;
            ctx.out.emit(&jobs, || job_lines(&jobs))?;
        }
        CiCommand::Logs {
            run,
            errors,
            grep,
            tail: tail_lines,
        } => {
            let files = client.run_logs(run).await?;
            if errors || !grep.is_empty() {
                let mut matches: Vec<LogMatch> = if errors {
                    error_lines(&files)
                } else {
                    Vec::new()
                };
                if !grep.is_empty() {
                    let needles: Vec<&str> = grep.iter().map(String::as_str).collect();
                    matches.extend(search(&files, &needles));
                    matches.sort_by(|a, b| (&a.file, a.line_number).cmp(&(&b.file, b.line_number)));
                    matches.dedup();
                }
                ctx.out.emit(&matches, || {
                    matches
                        .iter()
                        .map(|m| format!("{}:{}: {}", m.file, m.line_number, m.line))
                        .collect()
                })?;
            } else {
                #[derive(Serialize)]
                struct FileTail<'a> {
                    name: &'a str,
                    lines: Vec<&'a str>,
                }
                let n = tail_lines.unwrap_or(20);
                let tails: Vec<FileTail> = files
                    .iter()
                    .map(|f| FileTail {
                        name: &f.name,
                        lines: tail(&f.content, n),
                    })
                    .collect();
                ctx.out.emit(&tails, || {
                    let mut lines = Vec::new();
                    for file in &tails {
                        lines.push(format!("==> {} <==", file.name));
                        lines.extend(file.lines.iter().map(|l| l.to_string()));
                    }
                    lines
                })?;
            }
        }
        CiCommand::Artifacts { run, download, out } => match (download, out) {
            (Some(id), Some(out)) => {
                let bytes = client.download_artifact(id, &out).await?;
                let info = DownloadInfo { path: out, bytes };
                ctx.out.emit(&info, || {
                    vec![format!("Saved {} ({})", info.path.display(), format_bytes(info.bytes))]
                })?;
            }
            _ => {
                let artifacts = client.list_artifacts(run).await?;
                ctx.out.emit(&artifacts, || {
                    artifacts
                        .iter()
                        .map(|a| {
                            format!(
                                "{:>12}  {:<32} {:>10}{}",
                                a.id,
                                a.name,
                                format_bytes(a.size_in_bytes),
                                if a.expired { "  (expired)" } else { "" }
                            )
                        })
                        .collect()
                })?;
            }
        },
        CiCommand::Dispatch {
            workflow,
            git_ref,
            inputs,
        } => {
            let inputs: BTreeMap<String, String> = inputs.into_iter().collect();
            client.dispatch_workflow(&workflow, &git_ref, &inputs).await?;
            ctx.out.emit(
                &serde_json::json!({ "workflow": workflow, "ref": git_ref, "inputs": inputs }),
                || vec![format!("Dispatched {workflow} on {git_ref}")],
            )?;
        }
    }
    Ok(Exit::Success)
}

fn run_row(run: &WorkflowRun) -> String {
    let when = run
        .created_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    let branch = run.head_branch.as_deref().unwrap_or("-");
    let verdict = run.verdict();
    let took = match run.duration() {
        Some(d) if verdict.is_finished() => {
            format!("{}m{:02}s", d.num_minutes(), d.num_seconds() % 60)
        }
        _ => "-".to_string(),
    };
    format!(
        "{} {:>12}  {when:<16}  {took:>8}  {branch:<20}  {}",
        verdict.glyph(),
        run.id,
        run.title()
    )
}

/// Jobs with their steps; the step that broke a job is flagged.
fn job_lines(jobs: &[WorkflowJob]) -> Vec<String> {
    let mut lines = Vec::new();
    for job in jobs {
        lines.push(format!("{} {} ({})", job.verdict().glyph(), job.name, job.id));
        let failed = job.failed_step().map(|s| s.name.as_str());
        for step in &job.steps {
            let marker = if Some(step.name.as_str()) == failed {
                "  <- failed here"
            } else {
                ""
            };
            lines.push(format!("    {} {}{marker}", step.verdict().glyph(), step.name));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(status: &str, conclusion: Option<&str>) -> WorkflowRun {
        serde_json::from_value(serde_json::json!({
            "id": 7,
            "status": status,
            "conclusion": conclusion,
            "display_title": "render j1",
            "head_branch": "main",
            "created_at": "2026-03-01T10:00:00Z",
            "updated_at": "2026-03-01T10:02:05Z",
        }))
        .unwrap()
    }

    #[test]
    fn finished_runs_show_duration() {
        let row = run_row(&run("completed", Some("success")));
        assert!(row.contains("2m05s"), "{row}");
        assert!(row.ends_with("render j1"));

        let row = run_row(&run("in_progress", None));
        assert!(!row.contains("2m05s"), "{row}");
    }

    #[test]
    fn failed_step_is_flagged() {
        let job: WorkflowJob = serde_json::from_value(serde_json::json!({
            "id": 11,
            "name": "render",
            "status": "completed",
            "conclusion": "failure",
            "steps": [
                {"name": "Checkout", "status": "completed", "conclusion": "success"},
                {"name": "Encode", "status": "completed", "conclusion": "failure"},
                {"name": "Upload", "status": "completed", "conclusion": "skipped"}
            ]
        }))
        .unwrap();

        let lines = job_lines(&[job]);

        assert_eq!(lines.len(), 4);
        assert!(lines[2].ends_with("Encode  <- failed here"));
        assert!(!lines[1].contains("failed here"));
        assert!(!lines[3].contains("failed here"));
    }
}
