use keysweep_core::checkpoint::CheckpointStore;
use keysweep_core::config::{ExhaustiveSettings, GeneratorSettings, KeysweepConfig, WordlistSettings};
use keysweep_core::executor::{CommandExecutor, CommandExecutorConfig, Target};
use keysweep_core::generator::source_from_settings;
use keysweep_core::search::{SearchLoop, SearchReport, SearchState};

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const EXIT_SOLVED: u8 = 0;
const EXIT_EXHAUSTED: u8 = 1;
const EXIT_FATAL: u8 = 2;

/// Resumable password search against an encrypted volume.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Encrypted volume to unlock. Also identifies the checkpoint's target.
    volume_path: String,
    /// Mount point used when a password works.
    mount_path: PathBuf,
    /// Checkpoint file recording every attempted password.
    checkpoint_path: PathBuf,

    #[clap(short, long = "config", value_parser)]
    config_file: Option<PathBuf>,

    /// Read candidates from this wordlist instead of enumerating.
    #[clap(long, conflicts_with_all = ["alphabet", "max_length"])]
    wordlist: Option<PathBuf>,
    /// Only use wordlist lines starting with this prefix.
    #[clap(long, requires = "wordlist")]
    marker: Option<String>,
    /// Appended to each wordlist line; repeat for several variants.
    #[clap(long = "suffix", requires = "wordlist")]
    suffixes: Vec<String>,

    /// Characters to enumerate, in order.
    #[clap(long)]
    alphabet: Option<String>,
    #[clap(long)]
    max_length: Option<usize>,

    /// Unlock command, e.g. "sudo veracrypt".
    #[clap(long)]
    command: Option<String>,
    #[clap(long)]
    timeout_ms: Option<u64>,

    #[clap(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(report) => report_outcome(&report),
        Err(e) => {
            eprintln!("\nerr: {e:#}\n");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<KeysweepConfig, anyhow::Error> {
    let mut config = match &cli.config_file {
        Some(config_path) => {
            info!("Loading configuration from specified path: {config_path:?}");
            KeysweepConfig::load_from_file(config_path)?
        }
        None => {
            let default_config_path = PathBuf::from("keysweep.toml");
            if default_config_path.exists() {
                info!("No config file specified, loading default: {default_config_path:?}");
                KeysweepConfig::load_from_file(&default_config_path)?
            } else {
                debug!("No config file found, using built-in defaults");
                KeysweepConfig::default()
            }
        }
    };

    if let Some(path) = &cli.wordlist {
        config.generator = GeneratorSettings::Wordlist(WordlistSettings {
            path: path.clone(),
            marker: cli.marker.clone(),
            suffixes: cli.suffixes.clone(),
        });
    } else if cli.alphabet.is_some() || cli.max_length.is_some() {
        let base = match &config.generator {
            GeneratorSettings::Exhaustive(exhaustive) => exhaustive.clone(),
            GeneratorSettings::Wordlist(_) => ExhaustiveSettings::default(),
        };
        config.generator = GeneratorSettings::Exhaustive(ExhaustiveSettings {
            alphabet: cli.alphabet.clone().unwrap_or(base.alphabet),
            max_length: cli.max_length.unwrap_or(base.max_length),
        });
    }

    if let Some(command) = &cli.command {
        let parts: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        if parts.is_empty() {
            anyhow::bail!("--command must name a program");
        }
        config.executor.command = parts;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.executor.timeout_ms = Some(timeout_ms);
    }

    Ok(config)
}

fn run(cli: Cli) -> Result<SearchReport, anyhow::Error> {
    let config = load_config(&cli)?;
    debug!("Effective configuration: {config:#?}");

    let source = source_from_settings(&config.generator)?;
    let mut executor = CommandExecutor::new(CommandExecutorConfig::from(&config.executor));
    let store = CheckpointStore::new(cli.checkpoint_path);
    let target = Target::new(cli.volume_path, cli.mount_path);

    let mut search = SearchLoop::new(&store, &target).with_settings(config.search.clone());
    let report = search.run(source.as_ref(), &mut executor)?;
    Ok(report)
}

fn exit_code(state: &SearchState) -> u8 {
    match state {
        SearchState::Solved(_) | SearchState::AlreadySolved(_) => EXIT_SOLVED,
        SearchState::Exhausted => EXIT_EXHAUSTED,
        SearchState::Running | SearchState::FatalError => EXIT_FATAL,
    }
}

fn report_outcome(report: &SearchReport) -> ExitCode {
    let stats = &report.stats;
    match &report.state {
        SearchState::Solved(candidate) => {
            println!("'{candidate}' worked");
            println!(
                "Attempts: {}, Skipped: {}, Elapsed: {:.2?}, Rate: {:.2} guesses/s",
                stats.attempted,
                stats.skipped,
                stats.elapsed,
                stats.rate()
            );
        }
        SearchState::AlreadySolved(known) => {
            let listed: Vec<String> = known.iter().map(|c| format!("'{c}'")).collect();
            println!("Successful passwords already known: {}", listed.join(", "));
            println!("Use a different checkpoint file to search again");
        }
        SearchState::Exhausted => {
            println!(
                "Guesses exhausted. Attempts: {}, Skipped: {}, Elapsed: {:.2?}",
                stats.attempted, stats.skipped, stats.elapsed
            );
        }
        SearchState::Running | SearchState::FatalError => {
            eprintln!("Search ended in unexpected state {:?}", report.state);
        }
    }
    ExitCode::from(exit_code(&report.state))
}
