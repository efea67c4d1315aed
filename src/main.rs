use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use engram::config::EngramConfig;
use engram::memory::types::Sector;
use engram::{AddOptions, MemoryEngine, QueryOptions};

#[derive(Parser)]
#[command(name = "engram", version, about = "Self-hosted cognitive memory engine for AI agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a new memory
    Add {
        /// The text to remember
        content: String,
        /// Scope the memory to a user
        #[arg(long)]
        user: Option<String>,
        /// Attach tags (repeatable)
        #[arg(long)]
        tag: Vec<String>,
    },
    /// Query memories by similarity
    Query {
        /// Natural language query
        text: String,
        /// Scope the query to a user
        #[arg(long)]
        user: Option<String>,
        /// Restrict the scan to one sector
        #[arg(long)]
        sector: Option<String>,
        /// Maximum results
        #[arg(long, short = 'k')]
        limit: Option<usize>,
        /// Composite score floor
        #[arg(long)]
        min_score: Option<f64>,
    },
    /// Fetch one memory by id
    Get { id: String },
    /// List memories
    List {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        sector: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        cursor: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Bump a memory's salience
    Reinforce {
        id: String,
        /// Salience delta (default from config)
        #[arg(long)]
        delta: Option<f64>,
    },
    /// Permanently delete a memory
    Forget { id: String },
    /// Display store statistics
    Stats {
        #[arg(long)]
        user: Option<String>,
    },
    /// Run one decay cycle now
    Decay,
}

fn parse_sector(s: Option<String>) -> Result<Option<Sector>> {
    s.map(|s| s.parse().map_err(|e: String| anyhow::anyhow!(e)))
        .transpose()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = EngramConfig::load()?;

    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let engine = MemoryEngine::open(config)?;

    match cli.command {
        Command::Add { content, user, tag } => {
            let outcome = engine
                .add(
                    &content,
                    AddOptions {
                        user_id: user,
                        tags: tag,
                        ..AddOptions::default()
                    },
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Query {
            text,
            user,
            sector,
            limit,
            min_score,
        } => {
            let hits = engine
                .query(
                    &text,
                    QueryOptions {
                        user_id: user,
                        sector: parse_sector(sector)?,
                        limit,
                        min_score,
                        ..QueryOptions::default()
                    },
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }
        Command::Get { id } => {
            let memory = engine.get(&id)?;
            println!("{}", serde_json::to_string_pretty(&memory)?);
        }
        Command::List {
            user,
            sector,
            tag,
            cursor,
            limit,
        } => {
            let page = engine.list(
                user.as_deref(),
                parse_sector(sector)?,
                tag.as_deref(),
                cursor.as_deref(),
                limit,
            )?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        Command::Reinforce { id, delta } => {
            let salience = engine.reinforce(&id, delta)?;
            println!("{{\"id\": \"{id}\", \"salience\": {salience}}}");
        }
        Command::Forget { id } => {
            let result = engine.delete(&id)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Stats { user } => {
            let stats = engine.stats(user.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Decay => {
            let outcome = engine.run_decay()?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }

    Ok(())
}
