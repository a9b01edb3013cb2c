use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::{error, info};
use media_dedup_core::audit::EntryStatus;
use media_dedup_core::config::expand_home;
use media_dedup_core::indexer::IndexOutcome;
use media_dedup_core::plan::PlanOutputs;
use media_dedup_core::{Config, DedupEngine, Error};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Exit code for a missing or invalid input
const EXIT_FATAL: u8 = 1;
/// Exit code signalling that the per-run cap stopped indexing early
const EXIT_LIMIT_REACHED: u8 = 2;

#[derive(Parser)]
#[command(name = "media-dedup")]
#[command(about = "Index, plan and checkpoint duplicate media files")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write a rotating log file into this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash new files under a root and append them to an external hash store
    HashRoot {
        /// Directory to index
        #[arg(long)]
        root: PathBuf,

        /// External hash store (defaults to <state>/external_hashes.tsv)
        #[arg(long)]
        external_file: Option<PathBuf>,

        /// Maximum number of files hashed this run (0 = no limit)
        #[arg(long, default_value_t = 0)]
        limit: usize,

        /// Print every hashed file
        #[arg(long)]
        verbose: bool,
    },

    /// Merge hash stores into a KEEP/QUARANTINE plan and a report
    BuildDupePlan {
        #[arg(long)]
        hash_index: PathBuf,

        #[arg(long)]
        external: PathBuf,

        /// Output plan path
        #[arg(long)]
        plan: PathBuf,

        /// Output path for the merged, unlabelled index
        #[arg(long)]
        tmp: PathBuf,

        /// Output report path
        #[arg(long)]
        report: PathBuf,

        /// Fail on malformed rows instead of skipping them
        #[arg(long)]
        strict: bool,
    },

    /// Save a checkpoint of the key artifacts and disk state
    Checkpoint {
        /// Library base path
        #[arg(long)]
        base: Option<PathBuf>,

        /// Override for the state directory
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Short description of this checkpoint
        #[arg(long, default_value = "manual checkpoint")]
        desc: String,
    },

    /// List existing checkpoints
    ListCheckpoints {
        #[arg(long)]
        base: Option<PathBuf>,

        #[arg(long)]
        state_dir: Option<PathBuf>,
    },

    /// Re-hash recorded paths and report (or prune) stale rows
    VerifyStore {
        /// External hash store (defaults to <state>/external_hashes.tsv)
        #[arg(long)]
        external_file: Option<PathBuf>,

        /// Only verify paths under this directory
        #[arg(long)]
        root: Option<PathBuf>,

        /// Remove changed and missing rows so they are re-hashed next run
        #[arg(long)]
        prune: bool,
    },

    /// Generate default configuration file
    GenerateConfig {
        /// Path to save configuration file
        #[arg(default_value = "media-dedup.json")]
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("[ERROR] {}", err);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    init_logging(cli.log_dir.as_deref(), &config);

    match run(cli.command, config) {
        Ok(code) => code,
        Err(err) => {
            error!("{:#}", err);
            eprintln!("[ERROR] {:#}", err);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn load_config(path: Option<&Path>) -> media_dedup_core::Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(&expand_home(path))?,
        None => Config::default(),
    };
    config.validate()?;
    Ok(config)
}

fn init_logging(log_dir: Option<&Path>, config: &Config) {
    let level = config.log_level.to_level_filter();
    if let Some(dir) = log_dir {
        if let Err(e) = media_dedup_core::logging::init_logger(&expand_home(dir), level) {
            eprintln!("[WARN] file logging unavailable: {}", e);
        }
        return;
    }
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn run(command: Commands, mut config: Config) -> anyhow::Result<ExitCode> {
    match command {
        Commands::HashRoot {
            root,
            external_file,
            limit,
            verbose,
        } => {
            let root = expand_home(&root);
            let store_path = external_file
                .map(|p| expand_home(&p))
                .unwrap_or_else(|| config.layout().external_hashes());
            // Per-file lines and the spinner would interleave
            if verbose {
                config.show_progress = false;
            }

            let engine = DedupEngine::new(config);
            let summary = match engine.index_root(&root, &store_path, Some(limit), |entry| {
                if verbose {
                    println!("[HASHED] {}", entry.path);
                }
            }) {
                Ok(summary) => summary,
                Err(Error::InvalidRoot(path)) => {
                    eprintln!("[ERROR] root '{}' is not a directory.", path.display());
                    return Ok(ExitCode::from(EXIT_FATAL));
                }
                Err(e) => return Err(e.into()),
            };

            match summary.outcome {
                IndexOutcome::LimitReached => {
                    println!(
                        "[INFO] Limit reached ({}). Files hashed: {}",
                        limit, summary.hashed
                    );
                    Ok(ExitCode::from(EXIT_LIMIT_REACHED))
                }
                IndexOutcome::NoNewFiles => {
                    println!("[INFO] No new files hashed under '{}'.", summary.root.display());
                    Ok(ExitCode::SUCCESS)
                }
                IndexOutcome::Completed => {
                    println!(
                        "[INFO] Root '{}' hashed {} files.",
                        summary.root.display(),
                        summary.hashed
                    );
                    if summary.skipped > 0 {
                        println!("[WARN] {} files could not be read.", summary.skipped);
                    }
                    Ok(ExitCode::SUCCESS)
                }
            }
        }

        Commands::BuildDupePlan {
            hash_index,
            external,
            plan,
            tmp,
            report,
            strict,
        } => {
            config.strict_rows |= strict;
            let outputs = PlanOutputs {
                plan: expand_home(&plan),
                tmp: expand_home(&tmp),
                report: expand_home(&report),
            };
            let engine = DedupEngine::new(config);
            engine.build_plan(&expand_home(&hash_index), &expand_home(&external), &outputs)?;

            println!("[OK] Plan duplicados: {}", outputs.plan.display());
            println!("[OK] Reporte: {}", outputs.report.display());
            Ok(ExitCode::SUCCESS)
        }

        Commands::Checkpoint {
            base,
            state_dir,
            desc,
        } => {
            apply_location(&mut config, base, state_dir);
            let checkpoint = DedupEngine::new(config).checkpoint(&desc)?;

            for failed in &checkpoint.failed {
                eprintln!("[WARN] could not copy {}: {}", failed.source.display(), failed.error);
            }
            println!("[CHECKPOINT] saved to {}", checkpoint.dir.display());
            Ok(ExitCode::SUCCESS)
        }

        Commands::ListCheckpoints { base, state_dir } => {
            apply_location(&mut config, base, state_dir);
            for dir in DedupEngine::new(config).list_checkpoints()? {
                println!("{}", dir.display());
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::VerifyStore {
            external_file,
            root,
            prune,
        } => {
            let store_path = external_file
                .map(|p| expand_home(&p))
                .unwrap_or_else(|| config.layout().external_hashes());
            let root = root.map(|r| expand_home(&r));

            let engine = DedupEngine::new(config);
            let (report, removed) = engine.verify_store(&store_path, root.as_deref(), prune)?;

            for audited in &report.entries {
                match &audited.status {
                    EntryStatus::Unchanged => {}
                    EntryStatus::Changed { current } => {
                        println!("[CHANGED] {} ({} -> {})", audited.entry.path, audited.entry.digest, current)
                    }
                    EntryStatus::Missing => println!("[MISSING] {}", audited.entry.path),
                    EntryStatus::Unreadable(e) => {
                        println!("[UNREADABLE] {}: {}", audited.entry.path, e)
                    }
                }
            }
            let stale = report.stale().count();
            info!("{} entries verified, {} stale", report.entries.len(), stale);
            if prune {
                println!("[INFO] Removed {} stale rows from {}", removed, store_path.display());
            } else {
                println!("[INFO] {} stale rows found in {}", stale, store_path.display());
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::GenerateConfig { path } => {
            let config = Config::default();
            config.save_to_file(&path)?;
            println!("Configuration file generated at: {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Apply `--base` / `--state-dir` overrides to the configuration
fn apply_location(config: &mut Config, base: Option<PathBuf>, state_dir: Option<PathBuf>) {
    if let Some(base) = base {
        let base = expand_home(&base);
        // Disk usage follows the library unless the config names targets elsewhere
        if config.disk_usage_targets == [config.base.clone()] {
            config.disk_usage_targets = vec![base.clone()];
        }
        config.base = base;
    }
    if let Some(state_dir) = state_dir {
        config.state_dir = Some(expand_home(&state_dir));
    }
}
