use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use warup::{ApplierConfig, PatchApplier, WarupError};

#[derive(Parser)]
#[command(name = "warup", about = "Apply a patch archive to a directory tree, leaving it untouched on failure")]
struct Cli {
    /// Path to the patch archive (zip with a batch.warup descriptor)
    patch: PathBuf,
    /// Path to the target directory to patch
    #[arg(required_unless_present = "check")]
    target: Option<PathBuf>,
    /// Only check that the archive is a patch package, do not apply it
    #[arg(long)]
    check: bool,
    /// Directory for the working copy and the extracted archive
    #[arg(long, env = "WARUP_TMPDIR")]
    temp_dir: Option<PathBuf>,
    /// Skip comparing tree digests after promotion
    #[arg(long)]
    no_verify: bool,
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

const EXIT_FAILED: u8 = 1;
const EXIT_PROMOTION_FAILED: u8 = 3;

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}

/// Exit code for a failed run: 3 when the target may have been modified, 1 otherwise.
fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<WarupError>() {
        Some(e) if !e.target_untouched() => EXIT_PROMOTION_FAILED,
        _ => EXIT_FAILED,
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = ApplierConfig::default().with_verify_promotion(!cli.no_verify);
    if let Some(dir) = cli.temp_dir {
        config = config.with_temp_root(dir);
    }
    let applier = PatchApplier::new(config);

    if cli.check {
        if applier.accepts(&cli.patch) {
            println!("{} is a valid patch package", cli.patch.display());
            return Ok(ExitCode::SUCCESS);
        }
        println!("{} is not a valid patch package", cli.patch.display());
        return Ok(ExitCode::from(EXIT_FAILED));
    }

    let patch = cli.patch;
    let target = cli.target.context("Missing target directory")?;
    println!("Applying patch...");
    println!("  Patch: {}", patch.display());
    println!("  Target: {}", target.display());

    let start = Instant::now();
    let summary = tokio::task::spawn_blocking(move || applier.apply(&patch, &target))
        .await
        .context("Patch worker panicked")??;
    let elapsed = start.elapsed();

    println!("\nPatch applied successfully!");
    println!("  Target: {}", summary.target.display());
    println!("  Commands executed: {}", summary.commands_executed);
    println!("  Copies: {}", summary.copies);
    println!("  Removals: {}", summary.removals);
    println!("  Entries staged: {}", summary.entries_staged);
    if let Some(digest) = &summary.digest {
        println!("  Tree digest: {digest}");
    }
    println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());

    Ok(ExitCode::SUCCESS)
}
