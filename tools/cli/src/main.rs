//! foldertrail CLI - resolve documents to the folders that contain them.
//!
//! Besides one-shot commands, `bridge` speaks the request/response protocol
//! as newline-delimited JSON on stdin/stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use foldertrail_common::DocumentId;
use foldertrail_resolver::{Dispatcher, ResolutionEngine, ResolverConfig};

#[derive(Parser)]
#[command(name = "foldertrail")]
#[command(about = "foldertrail - Find the folders a Drive document lives in")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (JSON).
    #[arg(short, long, env = "FOLDERTRAIL_CONFIG")]
    config: Option<PathBuf>,

    /// Durable store file, overriding the configuration.
    #[arg(long)]
    store: Option<PathBuf>,

    /// Metadata API base URL, overriding the configuration.
    #[arg(long)]
    api_base_url: Option<String>,

    /// Never open an interactive sign-in.
    #[arg(long)]
    no_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a document to its parent folders.
    Resolve {
        /// Document ID.
        id: String,

        /// Bypass the cache.
        #[arg(short, long)]
        refresh: bool,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Sign in interactively and store the credential.
    Login,

    /// Forget the stored credential.
    Logout,

    /// Show credential and cache status.
    Status,

    /// Drop all cached results.
    ClearCache,

    /// Check that the stored credential can reach the API.
    TestAccess,

    /// Serve newline-delimited JSON requests on stdin.
    Bridge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    // stdout belongs to command output and the bridge protocol.
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&cli)?;
    let engine = Arc::new(
        ResolutionEngine::from_config(&config).context("Failed to initialize resolver")?,
    );

    match cli.command {
        Commands::Resolve { id, refresh, json } => cmd_resolve(&engine, &id, refresh, json).await,
        Commands::Login => cmd_login(&engine).await,
        Commands::Logout => cmd_logout(&engine).await,
        Commands::Status => cmd_status(&engine).await,
        Commands::ClearCache => cmd_clear_cache(&engine).await,
        Commands::TestAccess => cmd_test_access(&engine).await,
        Commands::Bridge => cmd_bridge(engine).await,
    }
}

/// Layer config file, environment and flags.
fn load_config(cli: &Cli) -> Result<ResolverConfig> {
    let mut config =
        ResolverConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.apply_env();

    if let Some(store) = &cli.store {
        config.store_path = Some(store.clone());
    }
    if let Some(url) = &cli.api_base_url {
        config.api_base_url = url.clone();
    }
    if cli.no_interactive {
        config.interactive_auth = false;
    }
    Ok(config)
}

async fn cmd_resolve(engine: &ResolutionEngine, id: &str, refresh: bool, json: bool) -> Result<()> {
    let id = DocumentId::new(id).context("Invalid document ID")?;
    let result = engine
        .resolve(&id, refresh)
        .await
        .with_context(|| format!("Failed to resolve {}", id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}", result.file.name);
    println!("  {}", result.file.url);
    if result.folders.is_empty() {
        println!("\nNo accessible parent folders.");
    } else {
        println!("\nFolders:");
        for folder in &result.folders {
            println!("  {:<30} {}", folder.name, folder.url);
        }
    }

    Ok(())
}

async fn cmd_login(engine: &ResolutionEngine) -> Result<()> {
    engine
        .credentials()
        .reauthenticate()
        .await
        .context("Sign-in failed")?;

    println!("Signed in.");
    Ok(())
}

async fn cmd_logout(engine: &ResolutionEngine) -> Result<()> {
    engine.credentials().invalidate().await;
    println!("Signed out.");
    Ok(())
}

async fn cmd_status(engine: &ResolutionEngine) -> Result<()> {
    let state = engine.credentials().state().await;
    let stored = engine.credentials().has_stored_credential().await;
    let entries = engine
        .cache()
        .len()
        .await
        .context("Failed to read cache")?;

    println!("Credential:");
    println!("  In memory: {}", state.label());
    println!("  Stored: {}", if stored { "yes" } else { "no" });
    println!("Cache:");
    println!("  Entries: {}", entries);

    Ok(())
}

async fn cmd_clear_cache(engine: &ResolutionEngine) -> Result<()> {
    let cleared = engine
        .cache()
        .invalidate_all()
        .await
        .context("Failed to clear cache")?;

    println!("Cleared {} cached entries.", cleared);
    Ok(())
}

async fn cmd_test_access(engine: &ResolutionEngine) -> Result<()> {
    let user = engine
        .check_access()
        .await
        .context("Drive access check failed")?;

    println!("Drive access OK.");
    println!("  User: {} <{}>", user.display_name, user.email_address);
    Ok(())
}

/// Answer one request per input line until stdin closes.
async fn cmd_bridge(engine: Arc<ResolutionEngine>) -> Result<()> {
    info!("Bridge ready; reading requests from stdin");

    let dispatcher = Dispatcher::new(engine);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        let response = dispatcher.handle_json(&line).await;
        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        stdout
            .write_all(&encoded)
            .await
            .context("Failed to write response")?;
        stdout.flush().await?;
    }

    info!("stdin closed; bridge exiting");
    Ok(())
}
