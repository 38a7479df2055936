use anyhow::Result;
use colored::Colorize;
use std::time::Instant;

use crate::cargo::{run_step, OnFailure, Step};

/// Bare-metal target the no_std crates must build for
const FIRMWARE_TARGET: &str = "thumbv7em-none-eabihf";

pub fn run() -> Result<()> {
    println!("{}", "Checking workspace...".bold().cyan());
    println!();

    let start = Instant::now();
    let steps = [
        Step {
            label: "no_std build (platform, rmem-transfer)",
            args: &[
                "check",
                "-p",
                "platform",
                "-p",
                "rmem-transfer",
                "--target",
                FIRMWARE_TARGET,
            ],
            on_failure: OnFailure::Abort,
        },
        Step {
            label: "no_std build with defmt",
            args: &[
                "check",
                "-p",
                "rmem-transfer",
                "--features",
                "defmt",
                "--target",
                FIRMWARE_TARGET,
            ],
            on_failure: OnFailure::Abort,
        },
        Step {
            label: "hosted build with tracing",
            args: &["check", "-p", "rmem-transfer", "--features", "std,tracing"],
            on_failure: OnFailure::Abort,
        },
        Step {
            label: "clippy",
            args: &[
                "clippy",
                "--workspace",
                "--all-targets",
                "--",
                "-D",
                "warnings",
            ],
            on_failure: OnFailure::Warn,
        },
        Step {
            label: "formatting",
            args: &["fmt", "--all", "--", "--check"],
            on_failure: OnFailure::Warn,
        },
    ];

    for step in &steps {
        run_step(step)?;
    }

    println!(
        "{}",
        format!("✓ All checks done in {:.2}s", start.elapsed().as_secs_f64())
            .green()
            .bold()
    );
    Ok(())
}
