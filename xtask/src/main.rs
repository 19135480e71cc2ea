//! Build automation tasks for the sqlmapper workspace.
//!
//! Run with `cargo xtask <command>`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

/// Fuzz targets in `fuzz/fuzz_targets`.
const FUZZ_TARGETS: &[&str] = &["tokenize", "parameter_mapping", "test_expression"];

#[derive(Parser)]
#[command(name = "xtask", about = "Build automation for sqlmapper")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all checks: format, lint, tests, minimal features and fuzz build
    Ci {
        /// Also run every fuzz target for this many seconds (nightly only)
        #[arg(long)]
        fuzz_seconds: Option<u64>,
    },
    /// Run cargo fmt --check
    Fmt,
    /// Run clippy with all features
    Clippy,
    /// Run all tests
    Test,
    /// Generate documentation
    Doc,
    /// Run benchmarks
    Bench,
    /// Run one fuzz target (requires cargo-fuzz and a nightly toolchain)
    Fuzz {
        /// Target name, or `all`
        target: String,
        /// Seconds to run for
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },
    /// Clean build artifacts
    Clean,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    // Change to workspace root
    let workspace_root = workspace_root()?;
    sh.change_dir(&workspace_root);

    match cli.command {
        Command::Ci { fuzz_seconds } => {
            println!("Running CI checks...");
            fmt(&sh)?;
            clippy(&sh)?;
            test(&sh)?;
            test_no_default_features(&sh)?;
            check_fuzz(&sh)?;
            if let Some(seconds) = fuzz_seconds {
                for target in FUZZ_TARGETS {
                    fuzz(&sh, target, seconds)?;
                }
            }
            println!("All CI checks passed!");
        }
        Command::Fmt => fmt(&sh)?,
        Command::Clippy => clippy(&sh)?,
        Command::Test => test(&sh)?,
        Command::Doc => doc(&sh)?,
        Command::Bench => bench(&sh)?,
        Command::Fuzz { target, seconds } if target == "all" => {
            for target in FUZZ_TARGETS {
                fuzz(&sh, target, seconds)?;
            }
        }
        Command::Fuzz { target, seconds } => fuzz(&sh, &target, seconds)?,
        Command::Clean => clean(&sh)?,
    }

    Ok(())
}

fn workspace_root() -> Result<PathBuf> {
    let output = std::process::Command::new("cargo")
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("failed to run cargo locate-project")?;

    let path = String::from_utf8(output.stdout)
        .context("invalid UTF-8 in cargo output")?
        .trim()
        .to_string();

    Ok(PathBuf::from(path)
        .parent()
        .context("failed to get workspace root")?
        .to_path_buf())
}

fn fmt(sh: &Shell) -> Result<()> {
    println!("Checking formatting...");
    cmd!(sh, "cargo fmt --all -- --check").run()?;
    println!("Formatting check passed.");
    Ok(())
}

fn clippy(sh: &Shell) -> Result<()> {
    println!("Running clippy...");
    cmd!(
        sh,
        "cargo clippy --all-features --all-targets -- -D warnings"
    )
    .run()?;
    println!("Clippy check passed.");
    Ok(())
}

fn test(sh: &Shell) -> Result<()> {
    println!("Running tests...");
    cmd!(sh, "cargo test --all-features").run()?;
    println!("All tests passed.");
    Ok(())
}

// chrono, uuid and rust_decimal are optional in both library crates.
fn test_no_default_features(sh: &Shell) -> Result<()> {
    println!("Running tests without optional value types...");
    for package in ["sqlmapper-reflection", "sqlmapper-scripting"] {
        cmd!(sh, "cargo test -p {package} --no-default-features --lib").run()?;
    }
    println!("Minimal feature tests passed.");
    Ok(())
}

// The fuzz crate is its own workspace, so the workspace build skips it.
fn check_fuzz(sh: &Shell) -> Result<()> {
    println!("Checking fuzz targets...");
    cmd!(sh, "cargo check --manifest-path fuzz/Cargo.toml --bins").run()?;
    println!("Fuzz targets build.");
    Ok(())
}

fn doc(sh: &Shell) -> Result<()> {
    println!("Generating documentation...");
    cmd!(sh, "cargo doc --all-features --no-deps").run()?;
    println!("Documentation generated.");
    Ok(())
}

fn bench(sh: &Shell) -> Result<()> {
    println!("Running benchmarks...");
    cmd!(sh, "cargo bench").run()?;
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    println!("Cleaning build artifacts...");
    cmd!(sh, "cargo clean").run()?;
    println!("Clean complete.");
    Ok(())
}

fn fuzz(sh: &Shell, target: &str, seconds: u64) -> Result<()> {
    if !FUZZ_TARGETS.contains(&target) {
        anyhow::bail!("unknown fuzz target {target:?}, expected one of {FUZZ_TARGETS:?}");
    }
    println!("Fuzzing {target} for {seconds}s...");
    let max_time = format!("-max_total_time={seconds}");
    let _dir = sh.push_dir("fuzz");
    cmd!(sh, "cargo +nightly fuzz run {target} -- {max_time}").run()?;
    println!("Fuzzing {target} finished.");
    Ok(())
}
