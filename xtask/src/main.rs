//! Strata xtask - Build automation tasks
//!
//! ## Usage
//!
//! ```bash
//! # Build the library and CLI
//! cargo xtask build
//!
//! # Run all tests
//! cargo xtask test
//!
//! # Run lints
//! cargo xtask lint
//!
//! # Drive the CLI through a short scripted session
//! cargo xtask demo
//!
//! # Run everything CI runs
//! cargo xtask ci
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use xshell::{cmd, Shell};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation for Strata")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the library and the strata binary
    Build {
        /// Build in release mode
        #[arg(long)]
        release: bool,
    },
    /// Run all tests
    Test {
        /// Run tests in release mode
        #[arg(long)]
        release: bool,
        /// Only run tests whose name contains this filter
        filter: Option<String>,
    },
    /// Run lints (clippy and rustfmt check)
    Lint,
    /// Format code
    Fmt {
        /// Check formatting without making changes
        #[arg(long)]
        check: bool,
    },
    /// Clean build artifacts
    Clean,
    /// Install the strata binary locally
    Install,
    /// Generate documentation
    Doc {
        /// Open documentation in browser
        #[arg(long)]
        open: bool,
    },
    /// Run the CLI against a scratch state file
    Demo,
    /// Run CI checks (fmt, lint, test, build)
    Ci,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    let project_root = project_root()?;
    sh.change_dir(&project_root);

    match cli.command {
        Commands::Build { release } => build(&sh, release)?,
        Commands::Test { release, filter } => test(&sh, release, filter.as_deref())?,
        Commands::Lint => lint(&sh)?,
        Commands::Fmt { check } => fmt(&sh, check)?,
        Commands::Clean => clean(&sh)?,
        Commands::Install => install(&sh)?,
        Commands::Doc { open } => doc(&sh, open)?,
        Commands::Demo => demo(&sh)?,
        Commands::Ci => ci(&sh)?,
    }

    Ok(())
}

fn project_root() -> Result<PathBuf> {
    let output = std::process::Command::new("cargo")
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("Failed to run cargo locate-project")?;

    let path = String::from_utf8(output.stdout)?;
    let manifest = PathBuf::from(path.trim());

    manifest
        .parent()
        .map(|p| p.to_path_buf())
        .context("Failed to find project root")
}

fn build(sh: &Shell, release: bool) -> Result<()> {
    println!("🔨 Building Strata...");

    if release {
        cmd!(sh, "cargo build --release -p strata").run()?;
    } else {
        cmd!(sh, "cargo build -p strata").run()?;
    }

    println!("✅ Build complete!");
    Ok(())
}

fn test(sh: &Shell, release: bool, filter: Option<&str>) -> Result<()> {
    println!("🧪 Running tests...");

    let release = release.then_some("--release");
    let filter = filter.map(str::to_string);
    cmd!(sh, "cargo test -p strata {release...} {filter...}").run()?;

    println!("✅ All tests passed!");
    Ok(())
}

fn lint(sh: &Shell) -> Result<()> {
    println!("🔍 Running lints...");

    println!("  Checking formatting...");
    cmd!(sh, "cargo fmt --all -- --check").run()?;

    println!("  Running clippy...");
    cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;

    println!("✅ All lints passed!");
    Ok(())
}

fn fmt(sh: &Shell, check: bool) -> Result<()> {
    println!("🎨 Formatting code...");

    if check {
        cmd!(sh, "cargo fmt --all -- --check").run()?;
    } else {
        cmd!(sh, "cargo fmt --all").run()?;
    }

    println!("✅ Formatting complete!");
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    println!("🧹 Cleaning build artifacts...");
    cmd!(sh, "cargo clean").run()?;
    println!("✅ Clean complete!");
    Ok(())
}

fn install(sh: &Shell) -> Result<()> {
    println!("📥 Installing Strata locally...");
    cmd!(sh, "cargo install --path .").run()?;
    println!("✅ Installation complete!");
    Ok(())
}

fn doc(sh: &Shell, open: bool) -> Result<()> {
    println!("📚 Generating documentation...");

    if open {
        cmd!(sh, "cargo doc --no-deps -p strata --open").run()?;
    } else {
        cmd!(sh, "cargo doc --no-deps -p strata").run()?;
    }

    println!("✅ Documentation generated!");
    Ok(())
}

fn demo(sh: &Shell) -> Result<()> {
    println!("🎬 Running demo session...");

    let dir = sh.create_temp_dir()?;
    let state = dir.path().join("cluster.json");
    let strata = ["cargo", "run", "-q", "-p", "strata", "--"];

    cmd!(sh, "{strata...} --state {state} init --name demo --id 1").run()?;
    cmd!(sh, "{strata...} --state {state} add-service HDFS").run()?;
    cmd!(sh, "{strata...} --state {state} add-config -t core-site --tag v1 -p fs.defaultFS=hdfs://nn:8020 --select").run()?;
    cmd!(sh, "{strata...} --state {state} add-config -t core-site --tag v2 -p fs.defaultFS=hdfs://nn:9000").run()?;
    cmd!(sh, "{strata...} --state {state} select -t core-site --tag v2 -u admin").run()?;
    cmd!(sh, "{strata...} --state {state} report --host h1 -c core-site=v2").run()?;
    cmd!(sh, "{strata...} --state {state} report --host h2 -c core-site=v1").run()?;
    cmd!(sh, "{strata...} --state {state} actual").run()?;
    cmd!(sh, "{strata...} --state {state} drift").run()?;
    cmd!(sh, "{strata...} --state {state} dump").run()?;

    println!("✅ Demo complete!");
    Ok(())
}

fn ci(sh: &Shell) -> Result<()> {
    println!("🔄 Running CI checks...");

    println!("\n📋 Step 1/4: Format check");
    fmt(sh, true)?;

    println!("\n📋 Step 2/4: Lint");
    lint(sh)?;

    println!("\n📋 Step 3/4: Tests");
    test(sh, false, None)?;

    println!("\n📋 Step 4/4: Release build");
    build(sh, true)?;

    println!("\n✅ All CI checks passed!");
    Ok(())
}
