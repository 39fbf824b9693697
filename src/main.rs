use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use res_patcher::backup::{self, BackupStatus};
use res_patcher::config::{self, PatchProfile, Resolution};
use res_patcher::userconfig::{self, UserConfigRestore, UserConfigStatus};
use res_patcher::{AppliedSummary, ApplyMode, Outcome, PatchEngine, PatchPlan, SkipReason};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use xxhash_rust::xxh3::xxh3_64;

#[derive(Parser)]
#[command(name = "res-patcher")]
#[command(about = "Verified binary patcher for hardcoded resolution limits", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ProfileArgs {
    /// Patch profile TOML (defaults to the built-in profile)
    #[arg(short, long)]
    profile: Option<PathBuf>,
}

#[derive(Args)]
struct TargetArgs {
    /// Target width (defaults to the profile's target)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    width: Option<u32>,

    /// Target height (defaults to the profile's target)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    height: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Patch an executable to the target resolution
    Apply {
        /// Path to the game executable
        exe: PathBuf,

        #[command(flatten)]
        profile: ProfileArgs,

        #[command(flatten)]
        target: TargetArgs,

        /// Dry run - analyze only, don't modify anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Skip creating a backup of the executable
        #[arg(long)]
        no_backup: bool,

        /// Leave the game's settings file alone
        #[arg(long)]
        no_userconfig: bool,
    },

    /// Report whether an executable is unpatched, patched or unknown
    Status {
        /// Path to the game executable
        exe: PathBuf,

        #[command(flatten)]
        profile: ProfileArgs,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Restore the executable (and settings) from backup
    Restore {
        /// Path to the game executable
        exe: PathBuf,

        #[command(flatten)]
        profile: ProfileArgs,

        /// Keep the backup file after restoring
        #[arg(long)]
        keep_backup: bool,

        /// Leave the game's settings file alone
        #[arg(long)]
        no_userconfig: bool,
    },

    /// List the built-in profile and profiles found in a directory
    List {
        /// Directory to search for profile TOML files
        #[arg(short, long, default_value = "profiles")]
        dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Apply {
            exe,
            profile,
            target,
            dry_run,
            no_backup,
            no_userconfig,
        } => cmd_apply(
            &exe,
            &profile,
            &target,
            ApplyMode::from_commit(!dry_run),
            no_backup,
            no_userconfig,
        ),

        Commands::Status {
            exe,
            profile,
            target,
        } => cmd_status(&exe, &profile, &target),

        Commands::Restore {
            exe,
            profile,
            keep_backup,
            no_userconfig,
        } => cmd_restore(&exe, &profile, keep_backup, no_userconfig),

        Commands::List { dir } => cmd_list(&dir),
    }
}

fn init_logging(verbose: u8) -> Result<()> {
    let default_directive = match verbose {
        0 => "res_patcher=warn",
        1 => "res_patcher=info",
        _ => "res_patcher=debug",
    };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

/// Helper: Load the profile given on the command line, or the built-in one
fn load_profile(args: &ProfileArgs) -> Result<PatchProfile> {
    match &args.profile {
        Some(path) => config::load_from_path(path)
            .with_context(|| format!("failed to load profile {}", path.display())),
        None => config::builtin().context("built-in profile is invalid"),
    }
}

/// Helper: Resolve the target resolution, CLI flags over profile defaults
fn resolve_target(profile: &PatchProfile, args: &TargetArgs) -> Resolution {
    let default = profile.resolution.target;
    Resolution::new(
        args.width.unwrap_or(default.width),
        args.height.unwrap_or(default.height),
    )
}

/// Helper: Read the whole executable into memory
fn read_image(exe: &Path) -> Result<Vec<u8>> {
    if !exe.exists() {
        anyhow::bail!("File not found: {}", exe.display());
    }
    fs::read(exe).with_context(|| format!("failed to read {}", exe.display()))
}

/// Helper: Directory holding the executable (and the game's settings file)
fn game_dir(exe: &Path) -> &Path {
    match exe.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn print_rule() {
    println!("{}", "=".repeat(60));
}

/// Helper: Render an apply report, identical for dry-run and commit
fn render_summary(summary: &AppliedSummary) {
    for patch in &summary.applied {
        println!("  {} {}", "✓".green(), patch);
    }
    for skip in &summary.skipped {
        println!("  {} {}", "⊘".yellow(), skip);
    }
    println!();
    println!("Total patches: {}", summary.total_patches());
    if summary.total_skipped() > 0 {
        println!(
            "Skipped: {}",
            format!("{}", summary.total_skipped()).yellow()
        );
    }
}

/// Helper: Explain an empty plan
fn explain_empty(plan: &PatchPlan) {
    for skip in plan.skipped() {
        eprintln!("  {} {}", "✗".red(), skip);
    }
    eprintln!();
    if plan.already_applied_count() == plan.entries().len() {
        eprintln!(
            "{}",
            "No patches could be created: the executable is already patched.".red()
        );
        eprintln!("Run `res-patcher restore` first to patch to a different resolution.");
    } else {
        eprintln!(
            "{}",
            "No patches could be created. The executable may be different from expected.".red()
        );
    }
}

fn cmd_apply(
    exe: &Path,
    profile_args: &ProfileArgs,
    target_args: &TargetArgs,
    mode: ApplyMode,
    no_backup: bool,
    no_userconfig: bool,
) -> Result<()> {
    // 1. Load profile and target
    let profile = load_profile(profile_args)?;
    let target = resolve_target(&profile, target_args);

    println!("{}", format!("Resolution Patch: {}", profile.name()).bold());
    if let Some(description) = &profile.meta.description {
        println!("{}", description.dimmed());
    }
    println!(
        "Target resolution: {} (original {})",
        target, profile.resolution.original
    );
    print_rule();

    // 2. Load the executable
    let mut image = read_image(exe)?;
    println!("File size: {} bytes", image.len());

    // 3. Plan
    let descriptors = profile
        .descriptors(target)
        .context("failed to build patch descriptors")?;
    let engine = PatchEngine::new(descriptors);
    let plan = engine.plan(&image);

    if plan.outcome() == Outcome::Empty {
        println!();
        explain_empty(&plan);
        std::process::exit(1);
    }

    // 4. Apply (or dry-run) and report
    println!();
    print_rule();
    if mode.is_commit() {
        println!("{}", "PATCHES TO APPLY:".bold());
    } else {
        println!("{}", "PATCHES (DRY RUN):".cyan().bold());
    }
    print_rule();

    let summary = PatchEngine::apply(&mut image, plan, mode)?;
    render_summary(&summary);

    if !mode.is_commit() {
        println!();
        println!("{}", "[DRY RUN] No changes made.".cyan());
        return Ok(());
    }

    // 5. Backup, then persist
    if !no_backup {
        match backup::ensure_backup(exe)? {
            BackupStatus::Created(path) => {
                println!("\nCreating backup: {}", path.display());
            }
            BackupStatus::AlreadyExists(path) => {
                println!(
                    "\n{}",
                    format!("Backup already exists: {}", path.display()).yellow()
                );
            }
        }
    }

    backup::atomic_write(exe, &image)
        .with_context(|| format!("failed to write patched {}", exe.display()))?;

    // 6. Game settings
    if !no_userconfig {
        if let Some(spec) = &profile.userconfig {
            match userconfig::update(game_dir(exe), spec, target) {
                Ok(UserConfigStatus::Updated { path, .. }) => {
                    println!("Updated {}", path.display());
                }
                Ok(UserConfigStatus::Missing(path)) => {
                    println!(
                        "{}",
                        format!("Settings file not found, skipped: {}", path.display()).dimmed()
                    );
                }
                Err(e) => {
                    eprintln!(
                        "{}",
                        format!("Warning: failed to update settings: {}", e).yellow()
                    );
                    eprintln!(
                        "  Set {} = {} and {} = {} manually.",
                        spec.width_key, target.width, spec.height_key, target.height
                    );
                }
            }
        }
    }

    println!();
    print_rule();
    if summary.outcome() == Outcome::Partial {
        println!("{}", "DONE (partial, see skipped sites above)".yellow().bold());
    } else {
        println!("{}", "DONE!".green().bold());
    }
    print_rule();
    println!("\nRestore from backup if needed:");
    println!("  res-patcher restore {}", exe.display());

    Ok(())
}

fn cmd_status(exe: &Path, profile_args: &ProfileArgs, target_args: &TargetArgs) -> Result<()> {
    let profile = load_profile(profile_args)?;
    let target = resolve_target(&profile, target_args);
    let image = read_image(exe)?;

    let engine = PatchEngine::new(profile.descriptors(target)?);
    let plan = engine.plan(&image);

    println!("{}", "Patch Status Report".bold());
    println!("Executable: {}", exe.display());
    println!("Profile: {}", profile.name());
    println!("File size: {} bytes (xxh3 {:016x})", image.len(), xxh3_64(&image));
    println!();

    let total = plan.entries().len();
    let pending = plan.accepted_count();
    let applied = plan.already_applied_count();

    if pending == total {
        println!(
            "{} {} ({} sites hold {})",
            "⊙".yellow(),
            "UNPATCHED".yellow().bold(),
            total,
            profile.resolution.original
        );
    } else if applied == total {
        println!(
            "{} {} ({} sites hold {})",
            "✓".green(),
            "PATCHED".green().bold(),
            total,
            target
        );
    } else if pending == 0 && applied == 0 {
        println!(
            "{} {} (no site holds {} or {})",
            "✗".red(),
            "UNKNOWN BUILD".red().bold(),
            profile.resolution.original,
            target
        );
    } else {
        println!(
            "{} {} ({} pending, {} applied, {} mismatched)",
            "⊘".cyan(),
            "PARTIALLY PATCHED".cyan().bold(),
            pending,
            applied,
            total - pending - applied
        );
    }

    for skip in plan.skipped() {
        if !matches!(skip.reason, SkipReason::AlreadyApplied { .. }) {
            println!("  - {}", skip.to_string().dimmed());
        }
    }

    let backup = backup::backup_path(exe)?;
    println!();
    if backup.exists() {
        println!("Backup: {}", backup.display());
    } else {
        println!("Backup: {}", "none".dimmed());
    }

    Ok(())
}

fn cmd_restore(
    exe: &Path,
    profile_args: &ProfileArgs,
    keep_backup: bool,
    no_userconfig: bool,
) -> Result<()> {
    // Resolve the profile before touching anything, so a bad --profile
    // leaves both the executable and its backup in place.
    let profile = if no_userconfig {
        None
    } else {
        Some(load_profile(profile_args)?)
    };

    let status = backup::restore(exe, keep_backup)
        .with_context(|| format!("cannot restore {}", exe.display()))?;

    println!(
        "{} Restored {} ({} bytes) from {}",
        "✓".green(),
        exe.display(),
        status.bytes,
        status.backup.display()
    );
    if status.backup_removed {
        println!("  Removed {}", status.backup.display());
    }

    if let Some(profile) = &profile {
        if let Some(spec) = &profile.userconfig {
            match userconfig::restore(game_dir(exe), spec) {
                Ok(UserConfigRestore::Restored(path)) => {
                    println!("{} Restored {}", "✓".green(), path.display());
                }
                Ok(UserConfigRestore::NoBackup) => {}
                Err(e) => {
                    eprintln!(
                        "{}",
                        format!("Warning: failed to restore settings: {}", e).yellow()
                    );
                }
            }
        }
    }

    Ok(())
}

fn cmd_list(dir: &Path) -> Result<()> {
    let builtin = config::builtin()?;
    println!("{}", "Profiles:".bold());
    print_profile("built-in", &builtin);

    let files = config::discover_profiles(dir)
        .with_context(|| format!("failed to scan {}", dir.display()))?;
    for file in files {
        match config::load_from_path(&file) {
            Ok(profile) => print_profile(&file.display().to_string(), &profile),
            Err(e) => eprintln!("  {} {}: {}", "✗".red(), file.display(), e),
        }
    }

    Ok(())
}

fn print_profile(source: &str, profile: &PatchProfile) {
    println!(
        "  {} {} ({} sites, {} -> {})",
        profile.name().green(),
        format!("[{}]", source).dimmed(),
        profile.sites.len() + profile.raw.len(),
        profile.resolution.original,
        profile.resolution.target
    );
    if let Some(exe) = &profile.meta.executable {
        println!("      executable: {}", exe);
    }
}
