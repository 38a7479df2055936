use anyhow::{Context, Result};
use colored::Colorize;
use std::process::{Command, Output};
use std::time::Instant;

/// How a failing step affects the task
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    Abort,
    Warn,
}

/// One `cargo` invocation of a task
pub struct Step<'a> {
    pub label: &'a str,
    pub args: &'a [&'a str],
    pub on_failure: OnFailure,
}

/// Run a step, print its outcome and return its stdout.
pub fn run_step(step: &Step<'_>) -> Result<Option<String>> {
    println!("{}", format!("  {}...", step.label).cyan());
    let start = Instant::now();

    let output: Output = Command::new("cargo")
        .args(step.args)
        .output()
        .with_context(|| format!("Failed to run cargo {}", step.args.join(" ")))?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

    if output.status.success() {
        let summary = extract_test_summary(&stdout)
            .map(|s| format!(" ({s})"))
            .unwrap_or_default();
        println!(
            "{}",
            format!(
                "  ✓ {}{} in {:.2}s",
                step.label,
                summary,
                start.elapsed().as_secs_f64()
            )
            .green()
        );
        println!();
        return Ok(Some(stdout));
    }

    match step.on_failure {
        OnFailure::Abort => {
            eprintln!("{}", format!("  ✗ {} failed", step.label).red().bold());
            eprintln!();
            for line in stdout.lines() {
                eprintln!("  {line}");
            }
            eprintln!("{}", String::from_utf8_lossy(&output.stderr));
            anyhow::bail!("{} failed", step.label);
        }
        OnFailure::Warn => {
            let msg = format!("  ⚠ {} reported problems", step.label);
            eprintln!("{}", msg.yellow().bold());
            eprintln!("{}", String::from_utf8_lossy(&output.stderr));
            println!();
            Ok(None)
        }
    }
}

/// Sum the counts of every "test result:" line.
fn extract_test_summary(output: &str) -> Option<String> {
    let (mut passed, mut failed, mut found) = (0u64, 0u64, false);
    for line in output.lines() {
        let Some(result) = line.split("test result:").nth(1) else {
            continue;
        };
        found = true;
        for part in result.split(';') {
            let mut words = part.split_whitespace().rev();
            let (Some(kind), Some(count)) = (words.next(), words.next()) else {
                continue;
            };
            let count: u64 = count.trim_start_matches("ok.").trim().parse().unwrap_or(0);
            match kind {
                "passed" => passed = passed.saturating_add(count),
                "failed" => failed = failed.saturating_add(count),
                _ => {}
            }
        }
    }
    found.then(|| format!("{passed} passed, {failed} failed"))
}
