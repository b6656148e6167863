//! # Groundwork CLI (`gw`)
//!
//! Ingest documents, search them, and ask grounded questions against a
//! local SQLite-backed store.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gw init` | Create the SQLite database and run schema migrations |
//! | `gw add <file>` | Ingest one file (text, markdown, HTML or PDF) |
//! | `gw ingest <dir>` | Ingest every matching file under a directory |
//! | `gw list` | List stored documents |
//! | `gw get <id>` | Show a document and its chunks |
//! | `gw delete <id>` | Delete a document and its chunks |
//! | `gw search "<query>"` | Ranked chunks for a query |
//! | `gw ask "<question>"` | Grounded answer with citations |
//! | `gw embed pending` | Embed chunks stored without a vector |
//! | `gw embed rebuild` | Drop and regenerate all vectors |
//! | `gw stats` | Counts and embedding coverage |
//! | `gw completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! gw init --config ./config/gw.toml
//! gw add ./docs/returns.md --agent support --type faq
//! gw ingest ./docs --glob '**/*.md'
//! gw search "return window" --agent support
//! gw ask "How long do I have to return an item?" --agent support
//! ```

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use groundwork::config::{self, Config};
use groundwork::ingest::AddOptions;
use groundwork::{db, embed_cmd, get, ingest, migrate, search, stats};
use groundwork_core::models::{DocumentType, SearchFilter};

/// Groundwork: retrieval-augmented answers over your own documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/gw.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "gw",
    about = "Groundwork: retrieval-augmented answers over your own documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/gw.toml")]
    config: PathBuf,

    /// Log at debug level regardless of `RUST_LOG` and `[logging] level`.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Ingest a single file.
    ///
    /// Re-adding with the same `--id` replaces the stored document.
    Add {
        /// File to ingest.
        path: PathBuf,

        /// Document id. A random UUID is generated when omitted.
        #[arg(long)]
        id: Option<String>,

        /// Title. Defaults to the file name without extension.
        #[arg(long)]
        title: Option<String>,

        /// Document type: text, pdf, web, faq, knowledge_base, company.
        #[arg(long = "type", value_parser = parse_doc_type)]
        doc_type: Option<DocumentType>,

        /// Source label. Defaults to the file path.
        #[arg(long)]
        source: Option<String>,

        /// Owning agent id.
        #[arg(long)]
        agent: Option<String>,

        /// Industry tag.
        #[arg(long)]
        industry: Option<String>,

        /// Extra metadata as KEY=VALUE (repeatable).
        #[arg(long = "meta", value_parser = parse_key_val)]
        meta: Vec<(String, String)>,
    },

    /// Ingest every matching file under a directory.
    ///
    /// Files are keyed by their path relative to the directory, so
    /// re-running replaces documents instead of duplicating them.
    Ingest {
        /// Directory to scan.
        dir: PathBuf,

        /// Include glob (repeatable). Defaults to `**/*.md`, `**/*.txt`, `**/*.pdf`.
        #[arg(long = "glob")]
        globs: Vec<String>,

        /// Owning agent id for every ingested document.
        #[arg(long)]
        agent: Option<String>,

        /// Industry tag for every ingested document.
        #[arg(long)]
        industry: Option<String>,
    },

    /// Delete a document and its chunks.
    Delete {
        /// Document id.
        id: String,
    },

    /// List stored documents.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show a document and its chunks.
    Get {
        /// Document id.
        id: String,

        /// Print JSON.
        #[arg(long)]
        json: bool,
    },

    /// Ranked chunks for a query.
    Search {
        /// Query text.
        query: String,

        /// Only chunks owned by this agent.
        #[arg(long)]
        agent: Option<String>,

        /// Only chunks with this industry tag.
        #[arg(long)]
        industry: Option<String>,

        /// Only chunks of this document type.
        #[arg(long = "type", value_parser = parse_doc_type)]
        doc_type: Option<DocumentType>,

        /// Maximum number of results. Defaults to `[retrieval] top_k`.
        #[arg(long)]
        limit: Option<usize>,

        /// Print JSON.
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the stored documents, with citations.
    Ask {
        /// Question text.
        query: String,

        /// Only use documents owned by this agent.
        #[arg(long)]
        agent: Option<String>,

        /// Print JSON.
        #[arg(long)]
        json: bool,
    },

    /// Manage embeddings.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Show store statistics.
    Stats,

    /// Print a shell completion script to stdout.
    Completions {
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed chunks stored without a vector.
    Pending {
        /// Maximum number of chunks to embed in this run.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Drop every vector and re-embed all chunks.
    ///
    /// Needed after switching embedding models or dimensions.
    Rebuild,
}

/// Parse a `key=value` pair for `--meta` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn parse_doc_type(s: &str) -> Result<DocumentType, String> {
    s.parse::<DocumentType>().map_err(|e| e.to_string())
}

fn init_logging(level: &str, verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "gw", &mut std::io::stdout());
        return Ok(());
    }

    let loaded = config::load_config(&cli.config);
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "warn".to_string());
    init_logging(&level, cli.verbose);
    let cfg: Config = loaded?;
    for warning in cfg.warnings() {
        tracing::warn!("{}", warning);
    }

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Add {
            path,
            id,
            title,
            doc_type,
            source,
            agent,
            industry,
            meta,
        } => {
            let opts = AddOptions {
                id,
                title,
                doc_type,
                source,
                agent,
                industry,
                metadata: meta,
            };
            ingest::run_add(&cfg, &path, opts).await?;
        }
        Commands::Ingest {
            dir,
            globs,
            agent,
            industry,
        } => {
            ingest::run_ingest(&cfg, &dir, globs, agent, industry).await?;
        }
        Commands::Delete { id } => {
            get::run_delete(&cfg, &id).await?;
        }
        Commands::List { json } => {
            get::run_list(&cfg, json).await?;
        }
        Commands::Get { id, json } => {
            get::run_get(&cfg, &id, json).await?;
        }
        Commands::Search {
            query,
            agent,
            industry,
            doc_type,
            limit,
            json,
        } => {
            let filter = SearchFilter {
                agent_id: agent,
                industry,
                doc_type,
            };
            search::run_search(&cfg, &query, filter, limit, json).await?;
        }
        Commands::Ask { query, agent, json } => {
            search::run_ask(&cfg, &query, agent.as_deref(), json).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending { limit } => {
                embed_cmd::run_embed_pending(&cfg, limit).await?;
            }
            EmbedAction::Rebuild => {
                embed_cmd::run_embed_rebuild(&cfg).await?;
            }
        },
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("lang=en=GB").unwrap(),
            ("lang".to_string(), "en=GB".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
    }

    #[test]
    fn test_parse_search_flags() {
        let cli = Cli::try_parse_from([
            "gw", "search", "refunds", "--agent", "a1", "--type", "faq", "--limit", "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Search {
                agent,
                doc_type,
                limit,
                ..
            } => {
                assert_eq!(agent.as_deref(), Some("a1"));
                assert_eq!(doc_type, Some(DocumentType::Faq));
                assert_eq!(limit, Some(3));
            }
            _ => panic!("expected search"),
        }
        assert!(Cli::try_parse_from(["gw", "add", "x.md", "--type", "spreadsheet"]).is_err());
    }
}
