//! Orchard CLI - fruit store and poem generator

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use orchard_core::commands::fruit;
use orchard_core::commands::poem::{DEFAULT_LINES, DEFAULT_TOPIC, PoemService};
use orchard_core::config::Config;
use orchard_core::llm::LlmClient;
use orchard_core::storage::{Database, DatabaseConfig};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "orchard")]
#[command(author, version, about = "Fruit store and poem generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Database file (overrides `database.path` from the config)
    #[arg(long, global = true, env = "ORCHARD_DATABASE")]
    database: Option<PathBuf>,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a poem with the configured language model
    Poem {
        /// The topic.
        #[arg(value_name = "TOPIC", default_value = DEFAULT_TOPIC)]
        topic: String,
        /// The number of lines in the poem (at least 1).
        #[arg(long, default_value_t = DEFAULT_LINES)]
        lines: u32,
    },

    /// Manage fruits
    Fruits {
        #[command(subcommand)]
        action: FruitAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check (exits 1 if any check fails)
    Doctor,
}

#[derive(Subcommand)]
enum FruitAction {
    /// Add a fruit
    Add { name: String },
    /// List all fruits by name
    List,
    /// Show a fruit
    Show { id: i64 },
    /// Rename a fruit
    Rename { id: i64, name: String },
    /// Delete a fruit
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout carries only command output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if let Some(suggestion) = e
                .downcast_ref::<orchard_core::Error>()
                .and_then(|err| err.suggestion())
            {
                eprintln!("  Try: {}", suggestion);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Poem { topic, lines } => cmd_poem(&topic, lines, cli.format).await,

        Commands::Fruits { action } => {
            let db = open_database(cli.database).await?;
            let result = cmd_fruits(&db, action, cli.format, cli.quiet).await;
            db.close().await;
            result
        }

        Commands::Config { action } => cmd_config(action, cli.quiet),

        Commands::Doctor => cmd_doctor(cli.database, cli.quiet).await,
    }
}

/// Resolve the database location: flag/env first, then config, then default
fn database_config(override_path: Option<PathBuf>) -> anyhow::Result<DatabaseConfig> {
    let config = Config::load()?;
    let mut db_config = DatabaseConfig::from_settings(&config.database);
    if let Some(path) = override_path {
        db_config.path = path;
    }
    Ok(db_config)
}

async fn open_database(override_path: Option<PathBuf>) -> anyhow::Result<Database> {
    let db_config = database_config(override_path)?;
    debug!(path = %db_config.path.display(), "Opening database");
    Ok(Database::new(db_config).await?)
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_poem(topic: &str, lines: u32, format: OutputFormat) -> anyhow::Result<()> {
    let config = Config::load()?;
    let client = LlmClient::from_env(config.llm)?;
    let service = PoemService::new(Arc::new(client))?;

    let poem = service.write_a_poem(topic, lines).await?;

    match format {
        OutputFormat::Text => println!("{}", poem),
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "topic": topic, "lines": lines, "poem": poem })
        ),
    }
    Ok(())
}

async fn cmd_fruits(
    db: &Database,
    action: FruitAction,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    match action {
        FruitAction::Add { name } => {
            let created = fruit::create_with_db(db, &name).await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string(&created)?);
            } else if quiet {
                println!("{}", created.id().unwrap_or_default());
            } else {
                println!("Fruit created: {}", created);
            }
        }
        FruitAction::List => {
            let fruits = fruit::list_with_db(db).await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&fruits)?);
            } else if fruits.is_empty() {
                if !quiet {
                    println!("No fruits found.");
                    println!("\nAdd one with: orchard fruits add <name>");
                }
            } else {
                if !quiet {
                    println!("Fruits:");
                }
                for f in fruits {
                    println!("  {}", f);
                }
            }
        }
        FruitAction::Show { id } => {
            let found = fruit::get_with_db(db, id).await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string(&found)?);
            } else {
                println!("Fruit: {}", found.name());
                println!("  ID: {}", id);
            }
        }
        FruitAction::Rename { id, name } => {
            let renamed = fruit::rename_with_db(db, id, &name).await?;
            if !quiet {
                println!("Fruit renamed: {}", renamed);
            }
        }
        FruitAction::Delete { id } => {
            fruit::delete_with_db(db, id).await?;
            if !quiet {
                println!("Fruit {} deleted.", id);
            }
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(database: Option<PathBuf>, quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("Orchard Health Check");
        println!("====================");
        println!();
    }

    let mut all_ok = true;

    match Config::load() {
        Ok(config) => {
            if !quiet {
                println!("[OK] Configuration: Valid");
                println!("     Model: {}", config.llm.default_model);
                println!("     Endpoint: {}", config.llm.base_url);
            }

            match config.llm.resolved_api_key() {
                Ok(Some(_)) => {
                    if !quiet {
                        let redacted = config.llm.redacted_api_key()?.unwrap_or_default();
                        println!("[OK] API Key: Configured ({})", redacted);
                    }
                }
                Ok(None) => {
                    all_ok = false;
                    warn!("API key not configured");
                    if !quiet {
                        println!("[!!] API Key: Not configured");
                        println!("     Set ORCHARD_API_KEY or OPENROUTER_API_KEY environment variable");
                    }
                }
                Err(e) => {
                    all_ok = false;
                    if !quiet {
                        println!("[!!] API Key: Error - {}", e);
                    }
                }
            }
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Configuration: Error - {:#}", e);
            }
        }
    }

    if !quiet {
        match Config::config_path() {
            Ok(path) => {
                if path.exists() {
                    println!("[OK] Config file: {}", path.display());
                } else {
                    println!("[--] Config file: {} (using defaults)", path.display());
                }
            }
            Err(e) => {
                println!("[!!] Config file: Error - {}", e);
            }
        }
    }

    match open_database(database).await {
        Ok(db) => {
            match db.health_check().await {
                Ok(()) => {
                    if !quiet {
                        println!("[OK] Database: Connected");
                        println!("     Path: {}", db.path().display());
                    }

                    match db.migration_status().await {
                        Ok(status) if status.needs_migration => {
                            all_ok = false;
                            if !quiet {
                                println!(
                                    "[!!] Database: Migrations pending (v{} -> v{})",
                                    status.current_version, status.target_version
                                );
                            }
                        }
                        Ok(status) => {
                            if !quiet {
                                println!("[OK] Database: Schema v{}", status.current_version);
                            }
                        }
                        Err(e) => {
                            all_ok = false;
                            if !quiet {
                                println!("[!!] Database: Migration check failed - {:#}", e);
                            }
                        }
                    }

                    match fruit::FruitRepository::new(&db).count().await {
                        Ok(count) => {
                            if !quiet {
                                println!("     Fruits: {}", count);
                            }
                        }
                        Err(e) => {
                            all_ok = false;
                            if !quiet {
                                println!("[!!] Database: Counting fruits failed - {}", e);
                            }
                        }
                    }
                }
                Err(e) => {
                    all_ok = false;
                    if !quiet {
                        println!("[!!] Database: Health check failed - {:#}", e);
                    }
                }
            }
            db.close().await;
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Database: Failed to initialize - {:#}", e);
            }
        }
    }

    if !quiet {
        println!();
        if all_ok {
            println!("All checks passed!");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }

    if !all_ok {
        anyhow::bail!("health check failed");
    }
    Ok(())
}
