use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chronosort::destination::CollisionPolicy;
use chronosort::metadata::ExifToolStore;
use chronosort::mover::{MediaMover, MoveOptions};
use chronosort::query::{parse_instant, DateWindow};
use chronosort::repair::{RepairOptions, TimestampRepairer};

/// Fix filename-encoded timestamps and organize media into year/month
/// directory trees

#[derive(Parser, Debug)]
#[command(name = "chronosort")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: CommandKind,
}

#[derive(Subcommand, Debug)]
enum CommandKind {
    /// Set mtime and metadata timestamps from numeric filenames
    Repair {
        /// Directory holding the files to repair
        root: PathBuf,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Only touch files modified strictly after this date
        #[arg(long, value_name = "DATE")]
        after: Option<String>,

        /// Only touch files modified strictly before this date
        #[arg(long, value_name = "DATE")]
        before: Option<String>,

        /// Organize each repaired file into this target root afterwards
        #[arg(long, value_name = "DIR")]
        organize_into: Option<PathBuf>,

        /// How to disambiguate an occupied destination name
        #[arg(long, value_enum, default_value_t = CollisionPolicy::Counter)]
        collision: CollisionPolicy,

        /// Propagate the target root's owner onto created directories (Unix)
        #[arg(long)]
        preserve_owner: bool,

        /// Report what would change without touching any file
        #[arg(long)]
        dry_run: bool,
    },

    /// Move media into <target>/<year>/<month>/ by capture date
    Organize {
        /// Source file or directory
        source: PathBuf,

        /// Target root directory
        #[arg(short, long)]
        target: PathBuf,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// How to disambiguate an occupied destination name
        #[arg(long, value_enum, default_value_t = CollisionPolicy::Counter)]
        collision: CollisionPolicy,

        /// Copy instead of moving; sources stay in place
        #[arg(long)]
        copy: bool,

        /// Propagate the target root's owner onto created directories (Unix)
        #[arg(long)]
        preserve_owner: bool,

        /// Report what would change without touching any file
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("✗ {:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    // Preconditions fail here, before any file is touched
    let version = ExifToolStore::ensure_available()?;
    tracing::debug!("using exiftool {}", version);
    let store = ExifToolStore::new();

    match cli.command {
        CommandKind::Repair {
            root,
            recursive,
            after,
            before,
            organize_into,
            collision,
            preserve_owner,
            dry_run,
        } => {
            let window = DateWindow {
                after: after.as_deref().map(parse_instant).transpose()?,
                before: before.as_deref().map(parse_instant).transpose()?,
            };
            let options = RepairOptions {
                root,
                recursive,
                window,
                dry_run,
            };
            let mut repairer = TimestampRepairer::new(&store, options);
            if let Some(target_root) = organize_into {
                let mover = MediaMover::new(
                    &store,
                    MoveOptions {
                        target_root,
                        recursive: false,
                        policy: collision,
                        copy: false,
                        preserve_owner,
                        dry_run,
                    },
                );
                repairer = repairer.with_mover(mover);
            }

            let report = repairer.run()?;
            println!("✓ Repair complete!");
            println!("  Candidates: {}", report.candidates);
            println!("  Repaired: {}", report.repaired);
            println!("  Skipped: {}", report.skipped);
            print_errors(&report.errors);
        }
        CommandKind::Organize {
            source,
            target,
            recursive,
            collision,
            copy,
            preserve_owner,
            dry_run,
        } => {
            let options = MoveOptions {
                target_root: target,
                recursive,
                policy: collision,
                copy,
                preserve_owner,
                dry_run,
            };
            let mover = MediaMover::new(&store, options);

            let report = mover.run(&source)?;
            println!("✓ Organize complete!");
            println!("  Candidates: {}", report.candidates);
            println!("  Moved: {}", report.moved);
            println!("  Skipped: {}", report.skipped);
            print_errors(&report.errors);
        }
    }
    Ok(())
}

fn print_errors(errors: &[String]) {
    if !errors.is_empty() {
        println!("\nErrors:");
        for error in errors {
            println!("  - {}", error);
        }
    }
}
