//! Vox CLI
//!
//! Runs the exercise player and inspects content and progress.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use vox_content::ContentFetcher;
use vox_engine::{
    content_fetcher, create_router, unlock_language, Config, JsonFileStore, PlayerSession, ProgressStore, Stage,
    VoxError,
};

/// Vox - Language Exercise Player
///
/// Serves lessons from a content manifest, judges answers, and keeps track
/// of which stages a learner has unlocked.
#[derive(Parser, Debug)]
#[command(name = "vox")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: vox.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP/WebSocket player
    Serve {
        /// Port for the HTTP API server (overrides the config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the stage menu
    Menu {
        /// Language to show (default: the learner's target language)
        #[arg(short, long)]
        language: Option<String>,

        /// Print the menu as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fetch a stage and report exercises that cannot be played
    Check {
        /// Content identifier of the stage (path, URL, or CID)
        #[arg(value_name = "IDENTIFIER")]
        identifier: String,
    },
    /// Unlock every stage of a language
    Unlock {
        /// Language code
        #[arg(value_name = "LANGUAGE")]
        language: String,
    },
    /// Forget all stored progress
    Reset,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(exit_status(&e))
        }
    }
}

/// Exit status for a failed run: 2 when the configuration is unusable,
/// 1 for anything else.
fn exit_status(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<VoxError>().is_some_and(VoxError::is_fatal) {
        2
    } else {
        1
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let base_dir = base_dir(args.config.as_deref());

    match args.command {
        Command::Serve { port } => serve(config, &base_dir, port).await,
        Command::Menu { language, json } => menu(&config, &base_dir, language.as_deref(), json).await,
        Command::Check { identifier } => check(&config, &base_dir, &identifier).await,
        Command::Unlock { language } => unlock(&config, &base_dir, &language),
        Command::Reset => reset(&config, &base_dir),
    }
}

/// Loads configuration from file or uses defaults.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Ok(Config::load_from_file(path)?)
        }
        None => Ok(Config::load()?),
    }
}

/// Relative paths in the config are resolved against the config file's
/// directory.
fn base_dir(config_path: Option<&str>) -> PathBuf {
    config_path
        .and_then(|p| Path::new(p).parent())
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Manifest: {}", config.manifest);
    match &config.content.local_dir {
        Some(dir) => println!("  Content: local directory {dir}"),
        None => {
            println!("  Content CDN: {}", config.content.cdn_base);
            println!("  Gateways: {}", config.content.gateways.len());
        }
    }
    println!("  Progress file: {}", config.state_file);
    println!("  Translations: {}", config.translations.len());
}

async fn serve(mut config: Config, base_dir: &Path, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.port = port;
    }
    config.validate()?;
    print_config(&config);

    let session = PlayerSession::from_config(&config, base_dir)?;
    let router = create_router(session);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    println!();
    println!("Starting player on {addr}...");
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port")
    })?;

    println!("Player API running on http://{addr}/api");
    println!("Events streaming on ws://{addr}/ws");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            }
        })
        .await?;

    println!();
    println!("Player stopped");
    Ok(())
}

async fn menu(config: &Config, base_dir: &Path, language: Option<&str>, json: bool) -> anyhow::Result<()> {
    let session = PlayerSession::from_config(config, base_dir)?;
    let Some(menu) = session.menu(language).await? else {
        println!("No content available.");
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&menu)?);
    } else {
        print!("{menu}");
    }
    Ok(())
}

async fn check(config: &Config, base_dir: &Path, identifier: &str) -> anyhow::Result<()> {
    let fetcher = content_fetcher(config, base_dir)?;
    tracing::info!(identifier, "Fetching stage");
    let value = fetcher
        .fetch(identifier)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let stage = Stage::from_value(identifier, value)?;

    let title = stage.title.as_deref().unwrap_or(&stage.id);
    println!("Stage {title}: {} exercises", stage.exercises.len());
    if let Some(lock) = stage.lock_config() {
        let languages: Vec<&str> = lock.locked_languages.iter().map(String::as_str).collect();
        println!("  Locked for: {}", languages.join(", "));
    }

    let mut problems = 0usize;
    for (i, exercise) in stage.exercises.iter().enumerate() {
        println!("  {:>2}. [{}] {}: {}", i + 1, exercise.kind.tag(), exercise.id, exercise.question);
        if let Some(problem) = exercise.lint() {
            problems += 1;
            println!("      ! {problem}");
        }
    }

    if problems > 0 {
        anyhow::bail!("{problems} exercise(s) cannot be played as written");
    }
    println!("All exercises look playable");
    Ok(())
}

fn unlock(config: &Config, base_dir: &Path, language: &str) -> anyhow::Result<()> {
    let store = JsonFileStore::new(base_dir.join(&config.state_file));
    let mut progress = store.load();
    if unlock_language(&mut progress, language) {
        store.save(&progress)?;
        println!("Unlocked all stages of '{language}'");
    } else {
        println!("'{language}' was already unlocked");
    }
    Ok(())
}

fn reset(config: &Config, base_dir: &Path) -> anyhow::Result<()> {
    let store = JsonFileStore::new(base_dir.join(&config.state_file));
    store.reset()?;
    println!("Progress cleared ({})", store.path().display());
    Ok(())
}
