use std::{
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use wbgrep::{
    Config, Error, Indexer, OllamaClient, Result,
    cli::{Cli, Command, IndexArgs, SearchArgs},
    search, watcher,
};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

fn check_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("WBGREP_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let root = match cli.root {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let config = Config::load(&root)?;

    match cli.command {
        Command::Index(args) => cmd_index(&root, &config, &args),
        Command::Watch => cmd_watch(&root, &config),
        Command::Search(args) => cmd_search(&root, &config, &args),
        Command::Status(args) => cmd_status(&root, &config, args.json),
        Command::Clear => cmd_clear(&root, &config),
        Command::Completions(_) => Ok(()),
    }
}

/// Fail early with an actionable message when the backend is unusable.
fn preflight(client: &OllamaClient) -> Result<()> {
    if !client.ping() {
        return Err(Error::Config(format!(
            "cannot reach embedding backend at {}; is Ollama running?",
            client.base_url()
        )));
    }
    if !client.has_model() {
        return Err(Error::Config(format!(
            "model '{}' not found on the backend; try `ollama pull {}`",
            client.model(),
            client.model()
        )));
    }
    Ok(())
}

fn cmd_index(root: &Path, config: &Config, args: &IndexArgs) -> Result<()> {
    let client = OllamaClient::new(&config.ollama);
    preflight(&client)?;

    let mut indexer = Indexer::open(root, config, &client)?;
    eprintln!("Indexing {}...", indexer.root().display());

    let report = indexer.index_all(args.clear, args.force, |current, total, path| {
        eprintln!("  [{current}/{total}] {}", path.display());
    })?;

    println!(
        "Indexed {} file(s), skipped {}, failed {} ({} chunks)",
        report.indexed, report.skipped, report.failed, report.total_chunks
    );
    Ok(())
}

fn cmd_watch(root: &Path, config: &Config) -> Result<()> {
    let client = OllamaClient::new(&config.ollama);
    preflight(&client)?;

    let mut indexer = Indexer::open(root, config, &client)?;

    // Bring the index up to date before registering event handlers; edits
    // made during this pass are picked up on their next change.
    eprintln!("Indexing {}...", indexer.root().display());
    let report = indexer.index_all(false, false, |current, total, path| {
        eprintln!("  [{current}/{total}] {}", path.display());
    })?;
    eprintln!(
        "Indexed {} file(s), skipped {}, failed {} ({} chunks)",
        report.indexed, report.skipped, report.failed, report.total_chunks
    );

    ctrlc::set_handler(|| {
        INTERRUPTED.store(true, Ordering::SeqCst);
    })
    .map_err(|e| Error::Config(format!("failed to install interrupt handler: {e}")))?;

    eprintln!("Watching for changes (Ctrl+C to stop)...");
    watcher::run(&mut indexer, check_interrupted)
}

fn cmd_search(root: &Path, config: &Config, args: &SearchArgs) -> Result<()> {
    let client = OllamaClient::new(&config.ollama);
    preflight(&client)?;

    let indexer = Indexer::open(root, config, &client)?;
    let hits = indexer.search(&args.query, args.limit, args.path.as_deref())?;

    let show_content = args.content || config.search.show_content;
    if args.json {
        search::format_json(&hits, &args.query, show_content);
    } else {
        search::format_human(&hits, indexer.root(), show_content);
    }
    Ok(())
}

fn cmd_status(root: &Path, config: &Config, json: bool) -> Result<()> {
    let client = OllamaClient::new(&config.ollama);
    let indexer = Indexer::open(root, config, &client)?;

    let stats = indexer.stats()?;
    let reachable = client.ping();
    let model_available = reachable && client.has_model();

    if json {
        let output = serde_json::json!({
            "root": indexer.root(),
            "chunks": stats.total_chunks,
            "files": stats.unique_files,
            "lastSync": indexer.journal().last_sync(),
            "model": client.model(),
            "backendReachable": reachable,
            "modelAvailable": model_available,
        });
        println!("{output}");
    } else {
        println!("Repository: {}", indexer.root().display());
        println!("Indexed chunks: {}", stats.total_chunks);
        println!("Indexed files: {}", stats.unique_files);
        println!("Last sync: {}", indexer.journal().last_sync());
        println!("Model: {}", client.model());
        println!(
            "Backend: {} ({})",
            client.base_url(),
            if !reachable {
                "unreachable"
            } else if model_available {
                "ready"
            } else {
                "model missing"
            }
        );
    }
    Ok(())
}

fn cmd_clear(root: &Path, config: &Config) -> Result<()> {
    let client = OllamaClient::new(&config.ollama);
    let mut indexer = Indexer::open(root, config, &client)?;
    indexer.clear()?;
    println!("Cleared index for {}", indexer.root().display());
    Ok(())
}
